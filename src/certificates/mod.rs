//! Digital certificate capabilities.
//!
//! Reading a PKCS#12 file and managing the user's certificate store are only
//! available where a native implementation exists (Windows CryptoAPI). Other
//! platforms get [`NativeCertificates`] answering `Unsupported`.

#[cfg(windows)]
mod windows;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate operations are not supported on this platform")]
    Unsupported,

    #[error("failed to read certificate {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse certificate: {0}")]
    Parse(String),

    #[error("certificate store error: {0}")]
    Platform(String),
}

/// A PKCS#12 container and its password.
#[derive(Clone)]
pub struct CertificateFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub password: String,
}

impl CertificateFile {
    pub async fn read(path: &Path, password: &str) -> Result<Self, CertificateError> {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|source| CertificateError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            contents,
            password: password.to_string(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for CertificateFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateFile")
            .field("path", &self.path)
            .field("bytes", &self.contents.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    pub subject: String,
    pub issuer: String,
    pub thumbprint: String,
    pub expiry: NaiveDate,
}

impl CertificateDetails {
    /// `Empresa: X | CNPJ: Y | Expira em: dd/mm/YYYY`
    pub fn summary(&self) -> String {
        certificate_summary(
            common_name(&self.subject).as_deref(),
            cnpj_from_subject(&self.subject).as_deref(),
            Some(self.expiry),
        )
    }
}

/// Reads identity data out of a certificate file.
pub trait CertificateInspector: Send + Sync {
    fn read_subject(&self, file: &CertificateFile) -> Result<String, CertificateError>;
    fn read_issuer(&self, file: &CertificateFile) -> Result<String, CertificateError>;
    fn read_thumbprint(&self, file: &CertificateFile) -> Result<String, CertificateError>;
    fn read_expiry(&self, file: &CertificateFile) -> Result<NaiveDate, CertificateError>;

    fn inspect(&self, file: &CertificateFile) -> Result<CertificateDetails, CertificateError> {
        Ok(CertificateDetails {
            subject: self.read_subject(file)?,
            issuer: self.read_issuer(file)?,
            thumbprint: self.read_thumbprint(file)?,
            expiry: self.read_expiry(file)?,
        })
    }
}

/// The current user's personal certificate store.
pub trait CertificateStore: Send + Sync {
    /// Import the certificate and its key. Returns the thumbprint.
    fn install(&self, file: &CertificateFile) -> Result<String, CertificateError>;

    /// Remove by thumbprint. Returns `false` if nothing matched.
    fn uninstall(&self, thumbprint: &str) -> Result<bool, CertificateError>;
}

pub fn native_store_available() -> bool {
    cfg!(windows)
}

#[cfg(windows)]
pub use self::windows::NativeCertificates;

/// Placeholder where no native store exists.
#[cfg(not(windows))]
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCertificates;

#[cfg(not(windows))]
impl CertificateInspector for NativeCertificates {
    fn read_subject(&self, _file: &CertificateFile) -> Result<String, CertificateError> {
        Err(CertificateError::Unsupported)
    }

    fn read_issuer(&self, _file: &CertificateFile) -> Result<String, CertificateError> {
        Err(CertificateError::Unsupported)
    }

    fn read_thumbprint(&self, _file: &CertificateFile) -> Result<String, CertificateError> {
        Err(CertificateError::Unsupported)
    }

    fn read_expiry(&self, _file: &CertificateFile) -> Result<NaiveDate, CertificateError> {
        Err(CertificateError::Unsupported)
    }
}

#[cfg(not(windows))]
impl CertificateStore for NativeCertificates {
    fn install(&self, _file: &CertificateFile) -> Result<String, CertificateError> {
        Err(CertificateError::Unsupported)
    }

    fn uninstall(&self, _thumbprint: &str) -> Result<bool, CertificateError> {
        Err(CertificateError::Unsupported)
    }
}

static CN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CN=([^,]+)").expect("valid CN regex"));
static SERIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)serialNumber=([0-9]+)").expect("valid serial regex"));
static SUFFIX_CNPJ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([0-9]{14})").expect("valid CNPJ regex"));

/// The `CN=` value of a distinguished name.
pub fn common_name(subject: &str) -> Option<String> {
    CN_RE
        .captures(subject)
        .map(|c| c[1].trim().trim_matches('"').to_string())
        .filter(|cn| !cn.is_empty())
}

/// Tax id from `serialNumber=`, else a 14-digit `:NNN` suffix (ICP-Brasil CN style).
pub fn cnpj_from_subject(subject: &str) -> Option<String> {
    SERIAL_RE
        .captures(subject)
        .or_else(|| SUFFIX_CNPJ_RE.captures(subject))
        .map(|c| c[1].to_string())
}

pub fn certificate_summary(
    company: Option<&str>,
    cnpj: Option<&str>,
    expiry: Option<NaiveDate>,
) -> String {
    let expiry = expiry
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "Empresa: {} | CNPJ: {} | Expira em: {}",
        company.unwrap_or("N/A"),
        cnpj.unwrap_or("N/A"),
        expiry
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ICP_SUBJECT: &str = "CN=EMPRESA EXEMPLO LTDA:12345678000199, OU=AC SOLUTI Multipla v5, O=ICP-Brasil, C=BR";

    #[test]
    fn test_common_name() {
        assert_eq!(
            common_name(ICP_SUBJECT).as_deref(),
            Some("EMPRESA EXEMPLO LTDA:12345678000199")
        );
        assert_eq!(common_name("O=ICP-Brasil, C=BR"), None);
    }

    #[test]
    fn test_cnpj_prefers_serial_number() {
        let subject = "SERIALNUMBER=98765432000110, CN=OUTRA:12345678000199";
        assert_eq!(cnpj_from_subject(subject).as_deref(), Some("98765432000110"));
        assert_eq!(
            cnpj_from_subject(ICP_SUBJECT).as_deref(),
            Some("12345678000199")
        );
        assert_eq!(cnpj_from_subject("CN=Sem Documento"), None);
    }

    #[test]
    fn test_summary_format() {
        let details = CertificateDetails {
            subject: ICP_SUBJECT.to_string(),
            issuer: "CN=AC SOLUTI Multipla v5".to_string(),
            thumbprint: "AB:CD".to_string(),
            expiry: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        };
        assert_eq!(
            details.summary(),
            "Empresa: EMPRESA EXEMPLO LTDA:12345678000199 | CNPJ: 12345678000199 | Expira em: 31/01/2026"
        );
        assert_eq!(
            certificate_summary(None, None, None),
            "Empresa: N/A | CNPJ: N/A | Expira em: N/A"
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_native_store_unsupported_off_windows() {
        let file = CertificateFile {
            path: PathBuf::from("a.pfx"),
            contents: vec![1, 2, 3],
            password: "x".to_string(),
        };
        assert!(!native_store_available());
        assert!(matches!(
            NativeCertificates.inspect(&file),
            Err(CertificateError::Unsupported)
        ));
        assert!(matches!(
            NativeCertificates.uninstall("AB"),
            Err(CertificateError::Unsupported)
        ));
    }
}
