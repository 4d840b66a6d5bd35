//! CryptoAPI-backed certificate inspection and the CurrentUser `MY` store.

use std::iter::once;
use std::ptr;

use chrono::NaiveDate;
use windows_sys::Win32::Foundation::{FILETIME, SYSTEMTIME};
use windows_sys::Win32::Security::Cryptography::{
    CertAddCertificateContextToStore, CertCloseStore, CertDeleteCertificateFromStore,
    CertDuplicateCertificateContext, CertEnumCertificatesInStore, CertFreeCertificateContext,
    CertGetCertificateContextProperty, CertGetNameStringW, CertNameToStrW, CertOpenSystemStoreW,
    PFXImportCertStore, CERT_CONTEXT, CERT_NAME_ISSUER_FLAG, CERT_NAME_SIMPLE_DISPLAY_TYPE,
    CRYPT_INTEGER_BLOB, HCERTSTORE,
};
use windows_sys::Win32::System::Time::FileTimeToSystemTime;

use super::{CertificateError, CertificateFile, CertificateInspector, CertificateStore};

const CERT_KEY_PROV_INFO_PROP_ID: u32 = 2;
const CERT_SHA1_HASH_PROP_ID: u32 = 3;
const CERT_X500_NAME_STR: u32 = 3;
const CERT_STORE_ADD_REPLACE_EXISTING: u32 = 3;
const X509_AND_PKCS7_ENCODING: u32 = 0x0000_0001 | 0x0001_0000;
const CRYPT_EXPORTABLE: u32 = 0x0000_0001;
const CRYPT_USER_KEYSET: u32 = 0x0000_1000;
const PKCS12_NO_PERSIST_KEY: u32 = 0x0000_8000;

struct Store(HCERTSTORE);

impl Drop for Store {
    fn drop(&mut self) {
        unsafe {
            CertCloseStore(self.0, 0);
        }
    }
}

struct Cert(*const CERT_CONTEXT);

impl Drop for Cert {
    fn drop(&mut self) {
        unsafe {
            CertFreeCertificateContext(self.0);
        }
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(once(0)).collect()
}

fn open_pfx(file: &CertificateFile, flags: u32) -> Result<Store, CertificateError> {
    let blob = CRYPT_INTEGER_BLOB {
        cbData: file.contents.len() as u32,
        pbData: file.contents.as_ptr() as *mut u8,
    };
    let password = wide(&file.password);

    let store = unsafe { PFXImportCertStore(&blob, password.as_ptr(), flags) };
    if store.is_null() {
        return Err(CertificateError::Parse(format!(
            "{} is not a readable PKCS#12 file or the password is wrong",
            file.path.display()
        )));
    }
    Ok(Store(store))
}

fn open_personal_store() -> Result<Store, CertificateError> {
    let name = wide("MY");
    let store = unsafe { CertOpenSystemStoreW(0, name.as_ptr()) };
    if store.is_null() {
        return Err(CertificateError::Platform(
            "could not open the personal certificate store".to_string(),
        ));
    }
    Ok(Store(store))
}

unsafe fn has_private_key(cert: *const CERT_CONTEXT) -> bool {
    let mut size: u32 = 0;
    CertGetCertificateContextProperty(cert, CERT_KEY_PROV_INFO_PROP_ID, ptr::null_mut(), &mut size)
        != 0
}

/// The certificate carrying the private key, else the first one.
fn leaf(store: &Store) -> Result<Cert, CertificateError> {
    let mut first: Option<Cert> = None;
    let mut prev: *const CERT_CONTEXT = ptr::null();
    unsafe {
        loop {
            let cert = CertEnumCertificatesInStore(store.0, prev);
            if cert.is_null() {
                break;
            }
            if has_private_key(cert) {
                return Ok(Cert(cert));
            }
            if first.is_none() {
                first = Some(Cert(CertDuplicateCertificateContext(cert)));
            }
            prev = cert;
        }
    }
    first.ok_or_else(|| CertificateError::Parse("PKCS#12 file holds no certificate".to_string()))
}

fn inspect_leaf<T>(
    file: &CertificateFile,
    read: impl FnOnce(&Cert) -> Result<T, CertificateError>,
) -> Result<T, CertificateError> {
    let store = open_pfx(file, PKCS12_NO_PERSIST_KEY)?;
    let cert = leaf(&store)?;
    read(&cert)
}

unsafe fn x500_subject(cert: *const CERT_CONTEXT) -> String {
    let subject = &(*(*cert).pCertInfo).Subject;
    let len = CertNameToStrW(
        X509_AND_PKCS7_ENCODING,
        subject,
        CERT_X500_NAME_STR,
        ptr::null_mut(),
        0,
    );
    if len <= 1 {
        return String::new();
    }
    let mut buf = vec![0u16; len as usize];
    let written = CertNameToStrW(
        X509_AND_PKCS7_ENCODING,
        subject,
        CERT_X500_NAME_STR,
        buf.as_mut_ptr(),
        len,
    );
    if written <= 1 {
        return String::new();
    }
    String::from_utf16_lossy(&buf[..written as usize - 1])
}

unsafe fn display_name(cert: *const CERT_CONTEXT, flags: u32) -> String {
    let mut buf = vec![0u16; 512];
    let len = CertGetNameStringW(
        cert,
        CERT_NAME_SIMPLE_DISPLAY_TYPE,
        flags,
        ptr::null(),
        buf.as_mut_ptr(),
        buf.len() as u32,
    );
    if len <= 1 {
        return String::new();
    }
    String::from_utf16_lossy(&buf[..len as usize - 1])
}

unsafe fn thumbprint(cert: *const CERT_CONTEXT) -> Option<String> {
    let mut size: u32 = 20;
    let mut hash = vec![0u8; 20];
    let ok = CertGetCertificateContextProperty(
        cert,
        CERT_SHA1_HASH_PROP_ID,
        hash.as_mut_ptr() as *mut _,
        &mut size,
    );
    if ok == 0 {
        return None;
    }
    Some(
        hash[..size as usize]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect(),
    )
}

fn filetime_to_date(ft: FILETIME) -> Option<NaiveDate> {
    let mut st = SYSTEMTIME {
        wYear: 0,
        wMonth: 0,
        wDayOfWeek: 0,
        wDay: 0,
        wHour: 0,
        wMinute: 0,
        wSecond: 0,
        wMilliseconds: 0,
    };
    let ok = unsafe { FileTimeToSystemTime(&ft, &mut st) };
    if ok == 0 {
        return None;
    }
    NaiveDate::from_ymd_opt(i32::from(st.wYear), u32::from(st.wMonth), u32::from(st.wDay))
}

fn normalize_thumbprint(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Windows CryptoAPI certificate support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCertificates;

impl CertificateInspector for NativeCertificates {
    fn read_subject(&self, file: &CertificateFile) -> Result<String, CertificateError> {
        inspect_leaf(file, |cert| Ok(unsafe { x500_subject(cert.0) }))
    }

    fn read_issuer(&self, file: &CertificateFile) -> Result<String, CertificateError> {
        inspect_leaf(file, |cert| {
            Ok(unsafe { display_name(cert.0, CERT_NAME_ISSUER_FLAG) })
        })
    }

    fn read_thumbprint(&self, file: &CertificateFile) -> Result<String, CertificateError> {
        inspect_leaf(file, |cert| {
            unsafe { thumbprint(cert.0) }
                .ok_or_else(|| CertificateError::Parse("no SHA-1 thumbprint".to_string()))
        })
    }

    fn read_expiry(&self, file: &CertificateFile) -> Result<NaiveDate, CertificateError> {
        inspect_leaf(file, |cert| {
            let not_after = unsafe { (*(*cert.0).pCertInfo).NotAfter };
            filetime_to_date(not_after)
                .ok_or_else(|| CertificateError::Parse("invalid NotAfter".to_string()))
        })
    }
}

impl CertificateStore for NativeCertificates {
    fn install(&self, file: &CertificateFile) -> Result<String, CertificateError> {
        let pfx = open_pfx(file, CRYPT_EXPORTABLE | CRYPT_USER_KEYSET)?;
        let cert = leaf(&pfx)?;
        let personal = open_personal_store()?;

        let ok = unsafe {
            CertAddCertificateContextToStore(
                personal.0,
                cert.0,
                CERT_STORE_ADD_REPLACE_EXISTING,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(CertificateError::Platform(format!(
                "could not add {} to the personal store",
                file.path.display()
            )));
        }

        unsafe { thumbprint(cert.0) }
            .ok_or_else(|| CertificateError::Platform("installed without thumbprint".to_string()))
    }

    fn uninstall(&self, wanted: &str) -> Result<bool, CertificateError> {
        let wanted = normalize_thumbprint(wanted);
        let personal = open_personal_store()?;

        let mut prev: *const CERT_CONTEXT = ptr::null();
        unsafe {
            loop {
                let cert = CertEnumCertificatesInStore(personal.0, prev);
                if cert.is_null() {
                    return Ok(false);
                }
                if thumbprint(cert).is_some_and(|t| t == wanted) {
                    let found = Cert(cert);
                    let deleted = CertDeleteCertificateFromStore(CertDuplicateCertificateContext(found.0));
                    if deleted == 0 {
                        return Err(CertificateError::Platform(format!(
                            "could not delete certificate {}",
                            wanted
                        )));
                    }
                    return Ok(true);
                }
                prev = cert;
            }
        }
    }
}
