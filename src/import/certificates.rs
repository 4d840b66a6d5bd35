//! Import `*.pfx` / `*.p12` files into the certificates table.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::certificates::{CertificateFile, CertificateInspector};
use crate::repository::processing_log::origin;
use crate::repository::{DieselCertificateRepository, LogLevel, ProcessingLog};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CertificateImportCounters {
    pub inserted: usize,
    pub existing: usize,
    pub errors: usize,
}

impl fmt::Display for CertificateImportCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} existing, {} errors",
            self.inserted, self.existing, self.errors
        )
    }
}

async fn certificate_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pkcs12 = path.extension().is_some_and(|ext| {
            ext.eq_ignore_ascii_case("pfx") || ext.eq_ignore_ascii_case("p12")
        });
        if is_pkcs12 && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Import every certificate file in `dir`.
///
/// Without an inspector the file is stored with its name as the only info.
pub async fn import_certificates(
    dir: &Path,
    password: &str,
    repo: &DieselCertificateRepository,
    inspector: Option<&dyn CertificateInspector>,
    log: Option<&ProcessingLog>,
) -> std::io::Result<CertificateImportCounters> {
    let files = certificate_files(dir).await?;
    let mut counters = CertificateImportCounters::default();
    info!("Found {} certificate files in {}", files.len(), dir.display());

    for path in &files {
        let file = match CertificateFile::read(path, password).await {
            Ok(file) => file,
            Err(e) => {
                warn!("{}", e);
                counters.errors += 1;
                continue;
            }
        };
        let file_name = file.file_name();

        match repo.exists(&file_name).await {
            Ok(true) => {
                info!("Already imported: {}", file_name);
                counters.existing += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Could not check {}: {}", file_name, e);
                counters.errors += 1;
                continue;
            }
        }

        let info = match inspector.map(|i| i.inspect(&file)) {
            Some(Ok(details)) => details.summary(),
            Some(Err(e)) => {
                warn!("Could not inspect {}: {}", file_name, e);
                file_name.clone()
            }
            None => file_name.clone(),
        };

        match repo.insert(&file_name, &info, &file.contents).await {
            Ok(()) => {
                info!("Imported {}: {}", file_name, info);
                counters.inserted += 1;
            }
            Err(e) => {
                warn!("Could not store {}: {}", file_name, e);
                counters.errors += 1;
            }
        }
    }

    if let Some(log) = log {
        log.note(
            LogLevel::Info,
            origin::CERTIFICATES,
            &format!("Certificate import finished: {}", counters),
            None,
        )
        .await;
    }

    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::{CertificateError, CertificateFile};
    use crate::repository::{init_schema, AsyncSqlitePool};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    struct FixedInspector;

    impl CertificateInspector for FixedInspector {
        fn read_subject(&self, _file: &CertificateFile) -> Result<String, CertificateError> {
            Ok("CN=LOJA TESTE LTDA:11222333000144, O=ICP-Brasil".to_string())
        }

        fn read_issuer(&self, _file: &CertificateFile) -> Result<String, CertificateError> {
            Ok("AC Teste".to_string())
        }

        fn read_thumbprint(&self, _file: &CertificateFile) -> Result<String, CertificateError> {
            Ok("00FF".to_string())
        }

        fn read_expiry(&self, _file: &CertificateFile) -> Result<NaiveDate, CertificateError> {
            Ok(NaiveDate::from_ymd_opt(2027, 5, 1).unwrap())
        }
    }

    #[tokio::test]
    async fn test_import_with_and_without_inspector() {
        let db = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&db.path().join("test.db"));
        init_schema(&pool).await.unwrap();
        let repo = DieselCertificateRepository::new(pool);

        let certs = tempdir().unwrap();
        std::fs::write(certs.path().join("loja1.pfx"), b"pfx-bytes").unwrap();
        std::fs::write(certs.path().join("loja2.P12"), b"p12-bytes").unwrap();
        std::fs::write(certs.path().join("notes.txt"), b"x").unwrap();

        let first = import_certificates(certs.path(), "pw", &repo, Some(&FixedInspector), None)
            .await
            .unwrap();
        assert_eq!(first.inserted, 2);

        let rows = repo.get_all().await.unwrap();
        assert_eq!(
            rows[0].info,
            "Empresa: LOJA TESTE LTDA:11222333000144 | CNPJ: 11222333000144 | Expira em: 01/05/2027"
        );

        std::fs::write(certs.path().join("loja3.pfx"), b"more").unwrap();
        let second = import_certificates(certs.path(), "pw", &repo, None, None)
            .await
            .unwrap();
        assert_eq!(second.inserted, 1);
        assert_eq!(second.existing, 2);

        let rows = repo.get_all().await.unwrap();
        assert_eq!(rows[2].info, "loja3.pfx");
    }
}
