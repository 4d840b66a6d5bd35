//! Document store gateway.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::{debug, info};

use super::models::{DocumentRecord, NewDocument};
use super::pool::{AsyncSqlitePool, DbError};
use super::processing_log::{LogLevel, ProcessingLog};
use super::util::{is_unique_violation, now_rfc3339};
use crate::models::{DocumentKey, DocumentOrigin};
use crate::schema::nfse_documents;

/// Result of an insert. A duplicate is a successful no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Existence check and insert against the relational document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn exists(&self, key: &DocumentKey) -> Result<bool, DbError>;

    /// Insert both renditions for a key. Re-checks existence first.
    async fn insert(
        &self,
        key: &DocumentKey,
        structured: Option<&[u8]>,
        rendered: Option<&[u8]>,
        origin: DocumentOrigin,
    ) -> Result<InsertOutcome, DbError>;
}

/// Summary of a stored document without its payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub key: String,
    pub has_structured: bool,
    pub has_rendered: bool,
    pub origin: String,
    pub status: i32,
}

impl From<DocumentRecord> for StoredDocument {
    fn from(record: DocumentRecord) -> Self {
        StoredDocument {
            key: record.document_key,
            has_structured: record.structured.is_some(),
            has_rendered: record.rendered.is_some(),
            origin: record.origin,
            status: record.status,
        }
    }
}

#[derive(Clone)]
pub struct DieselDocumentStore {
    pool: AsyncSqlitePool,
    log: Option<ProcessingLog>,
}

impl DieselDocumentStore {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool, log: None }
    }

    /// Also write an entry to the processing log for each insert.
    pub fn with_log(mut self, log: ProcessingLog) -> Self {
        self.log = Some(log);
        self
    }

    pub async fn get(&self, key: &str) -> Result<Option<StoredDocument>, DbError> {
        let mut conn = self.pool.get().await?;

        nfse_documents::table
            .filter(nfse_documents::document_key.eq(key))
            .select(DocumentRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(StoredDocument::from))
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        nfse_documents::table
            .select(count_star())
            .first(&mut conn)
            .await
    }
}

#[async_trait]
impl DocumentStore for DieselDocumentStore {
    async fn exists(&self, key: &DocumentKey) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = nfse_documents::table
            .filter(nfse_documents::document_key.eq(key.as_str()))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count > 0)
    }

    async fn insert(
        &self,
        key: &DocumentKey,
        structured: Option<&[u8]>,
        rendered: Option<&[u8]>,
        origin: DocumentOrigin,
    ) -> Result<InsertOutcome, DbError> {
        if self.exists(key).await? {
            debug!("Document {} already stored", key);
            return Ok(InsertOutcome::Duplicate);
        }

        let structured_text = structured.map(|bytes| String::from_utf8_lossy(bytes).into_owned());
        let created_at = now_rfc3339();
        let mut conn = self.pool.get().await?;

        let result = diesel::insert_into(nfse_documents::table)
            .values(NewDocument {
                document_key: key.as_str(),
                structured: structured_text.as_deref(),
                rendered,
                origin: origin.as_str(),
                status: 0,
                created_at: &created_at,
            })
            .execute(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!("Stored document {} ({})", key, origin.as_str());
                if let Some(log) = &self.log {
                    log.note(
                        LogLevel::Info,
                        origin.as_str(),
                        "NFSe stored",
                        Some(key.as_str()),
                    )
                    .await;
                }
                Ok(InsertOutcome::Inserted)
            }
            // Lost a race with another writer.
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::init_schema;
    use tempfile::tempdir;

    async fn setup() -> (DieselDocumentStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();
        (DieselDocumentStore::new(pool), dir)
    }

    fn key() -> DocumentKey {
        DocumentKey::parse("35503081234567890123456789012345678901234567890123").unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let (store, _dir) = setup().await;
        let key = key();

        assert!(!store.exists(&key).await.unwrap());

        let first = store
            .insert(&key, Some(b"<NFSe/>"), Some(b"%PDF-1.4"), DocumentOrigin::Portal)
            .await
            .unwrap();
        let second = store
            .insert(&key, Some(b"<NFSe/>"), None, DocumentOrigin::Importer)
            .await
            .unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Duplicate);
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);

        let stored = store.get(key.as_str()).await.unwrap().unwrap();
        assert!(stored.has_structured);
        assert!(stored.has_rendered);
        assert_eq!(stored.origin, "PORTAL");
        assert_eq!(stored.status, 0);
    }

    #[tokio::test]
    async fn test_partial_pair() {
        let (store, _dir) = setup().await;
        let key = key();

        store
            .insert(&key, Some(b"<NFSe/>"), None, DocumentOrigin::Portal)
            .await
            .unwrap();

        let stored = store.get(key.as_str()).await.unwrap().unwrap();
        assert!(stored.has_structured);
        assert!(!stored.has_rendered);
    }

    #[tokio::test]
    async fn test_insert_writes_processing_log() {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();
        let log = ProcessingLog::new(pool.clone()).with_actor("tester");
        let store = DieselDocumentStore::new(pool).with_log(log.clone());

        store
            .insert(&key(), None, Some(b"%PDF"), DocumentOrigin::Api)
            .await
            .unwrap();

        let entries = log.recent(5).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].origin, "API");
        assert_eq!(entries[0].document_key.as_deref(), Some(key().as_str()));
    }
}
