//! Import `{key}.xml` / `{key}.pdf` pairs from a directory into the store.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::api::key_from_xml;
use crate::models::{DocumentKey, DocumentOrigin};
use crate::repository::processing_log::origin;
use crate::repository::{DocumentStore, InsertOutcome, LogLevel, ProcessingLog};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounters {
    pub files: usize,
    pub inserted: usize,
    pub existing: usize,
    pub errors: usize,
}

impl fmt::Display for ImportCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} existing, {} errors",
            self.inserted, self.existing, self.errors
        )
    }
}

async fn xml_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if is_xml && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Key from the file stem, or from the XML itself for files named otherwise.
fn resolve_key(path: &Path, xml: &[u8]) -> Option<DocumentKey> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(DocumentKey::parse)
        .or_else(|| key_from_xml(xml))
}

/// Insert every `*.xml` in `dir` (with its sibling `.pdf`, if any).
pub async fn import_directory(
    dir: &Path,
    store: &dyn DocumentStore,
    log: Option<&ProcessingLog>,
) -> std::io::Result<ImportCounters> {
    let files = xml_files(dir).await?;
    let mut counters = ImportCounters {
        files: files.len(),
        ..Default::default()
    };
    info!("Found {} XML files in {}", files.len(), dir.display());

    for (index, xml_path) in files.iter().enumerate() {
        let xml = match tokio::fs::read(xml_path).await {
            Ok(xml) => xml,
            Err(e) => {
                warn!("Could not read {}: {}", xml_path.display(), e);
                counters.errors += 1;
                continue;
            }
        };

        let Some(key) = resolve_key(xml_path, &xml) else {
            warn!("{}: no document key in name or content", xml_path.display());
            counters.errors += 1;
            continue;
        };
        info!("[{}/{}] {}", index + 1, files.len(), key);

        match store.exists(&key).await {
            Ok(true) => {
                counters.existing += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Could not check {}: {}", key, e);
                counters.errors += 1;
                continue;
            }
        }

        let pdf = tokio::fs::read(xml_path.with_extension("pdf")).await.ok();
        match store
            .insert(&key, Some(&xml), pdf.as_deref(), DocumentOrigin::Importer)
            .await
        {
            Ok(InsertOutcome::Inserted) => counters.inserted += 1,
            Ok(InsertOutcome::Duplicate) => counters.existing += 1,
            Err(e) => {
                warn!("Could not store {}: {}", key, e);
                counters.errors += 1;
                if let Some(log) = log {
                    log.note(
                        LogLevel::Error,
                        origin::IMPORTER,
                        &format!("Failed to store: {}", e),
                        Some(key.as_str()),
                    )
                    .await;
                }
            }
        }
    }

    if let Some(log) = log {
        log.note(
            LogLevel::Info,
            origin::IMPORTER,
            &format!("Import finished: {}", counters),
            None,
        )
        .await;
    }

    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{init_schema, AsyncSqlitePool, DieselDocumentStore};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_import_pairs_and_skips_existing() {
        let db_dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&db_dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();
        let store = DieselDocumentStore::new(pool.clone());
        let log = ProcessingLog::new(pool).with_actor("test");

        let files = tempdir().unwrap();
        let k1 = "1".repeat(44);
        let k2 = "2".repeat(50);
        std::fs::write(files.path().join(format!("{}.xml", k1)), b"<a/>").unwrap();
        std::fs::write(files.path().join(format!("{}.pdf", k1)), b"%PDF").unwrap();
        std::fs::write(files.path().join(format!("{}.xml", k2)), b"<b/>").unwrap();
        std::fs::write(files.path().join("notes.xml"), b"<nothing/>").unwrap();
        std::fs::write(files.path().join("readme.txt"), b"x").unwrap();

        let first = import_directory(files.path(), &store, Some(&log)).await.unwrap();
        assert_eq!(first.files, 3);
        assert_eq!(first.inserted, 2);
        assert_eq!(first.errors, 1);

        let stored = store.get(&k1).await.unwrap().unwrap();
        assert!(stored.has_structured && stored.has_rendered);
        assert_eq!(stored.origin, "IMPORTER");

        let second = import_directory(files.path(), &store, None).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.existing, 2);
    }

    #[tokio::test]
    async fn test_key_from_content_for_api_file_names() {
        let db_dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&db_dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();
        let store = DieselDocumentStore::new(pool);

        let files = tempdir().unwrap();
        let key = "7".repeat(50);
        std::fs::write(
            files.path().join("nota_12_99.xml"),
            format!(r#"<NFSe><infNFSe Id="NFS{}"/></NFSe>"#, key),
        )
        .unwrap();

        let counters = import_directory(files.path(), &store, None).await.unwrap();
        assert_eq!(counters.inserted, 1);
        assert!(store.get(&key).await.unwrap().is_some());
    }
}
