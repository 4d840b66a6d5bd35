//! Store credential repository.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::warn;

use super::models::CredentialRecord;
use super::pool::{AsyncSqlitePool, DbError};
use super::util::now_rfc3339;
use crate::models::{Credential, STATUS_ACTIVE};
use crate::schema::store_credentials;

/// Supplies the credentials a batch run iterates over.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Active credentials ordered by store id. Empty is a valid answer.
    async fn list_active(&self) -> Result<Vec<Credential>, DbError>;
}

/// Whether an upsert created or replaced a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl From<CredentialRecord> for Credential {
    fn from(record: CredentialRecord) -> Self {
        Credential::new(record.store_id, record.login, record.password)
    }
}

#[derive(Clone)]
pub struct DieselCredentialRepository {
    pool: AsyncSqlitePool,
}

impl DieselCredentialRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a store's credential, marking it active.
    pub async fn upsert(&self, credential: &Credential) -> Result<UpsertOutcome, DbError> {
        let existed = self.exists(credential.store_id).await?;
        let mut conn = self.pool.get().await?;
        let updated_at = now_rfc3339();

        diesel::replace_into(store_credentials::table)
            .values((
                store_credentials::store_id.eq(credential.store_id),
                store_credentials::login.eq(&credential.login),
                store_credentials::password.eq(&credential.password),
                store_credentials::status.eq(STATUS_ACTIVE),
                store_credentials::updated_at.eq(&updated_at),
            ))
            .execute(&mut conn)
            .await?;

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    pub async fn exists(&self, store_id: i64) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = store_credentials::table
            .filter(store_credentials::store_id.eq(store_id))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count > 0)
    }

    pub async fn set_status(&self, store_id: i64, status: &str) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;
        let updated_at = now_rfc3339();

        let rows = diesel::update(store_credentials::table.find(store_id))
            .set((
                store_credentials::status.eq(status),
                store_credentials::updated_at.eq(&updated_at),
            ))
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }

    /// All rows regardless of status, ordered by store id.
    pub async fn get_all(&self) -> Result<Vec<CredentialRecord>, DbError> {
        let mut conn = self.pool.get().await?;

        store_credentials::table
            .order(store_credentials::store_id.asc())
            .select(CredentialRecord::as_select())
            .load(&mut conn)
            .await
    }
}

#[async_trait]
impl CredentialSource for DieselCredentialRepository {
    async fn list_active(&self) -> Result<Vec<Credential>, DbError> {
        let mut conn = self.pool.get().await?;

        let records: Vec<CredentialRecord> = store_credentials::table
            .filter(store_credentials::status.eq(STATUS_ACTIVE))
            .order(store_credentials::store_id.asc())
            .select(CredentialRecord::as_select())
            .load(&mut conn)
            .await?;

        Ok(records
            .into_iter()
            .map(Credential::from)
            .filter(|cred| {
                if !cred.is_complete() {
                    warn!("Store {} has no login or password, skipping", cred.store_id);
                }
                cred.is_complete()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::init_schema;
    use tempfile::tempdir;

    async fn setup() -> (DieselCredentialRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();
        (DieselCredentialRepository::new(pool), dir)
    }

    #[tokio::test]
    async fn test_list_active_is_ordered_and_filtered() {
        let (repo, _dir) = setup().await;

        repo.upsert(&Credential::new(30, "c", "pc")).await.unwrap();
        repo.upsert(&Credential::new(10, "a", "pa")).await.unwrap();
        repo.upsert(&Credential::new(20, "b", "pb")).await.unwrap();
        repo.upsert(&Credential::new(40, "d", "")).await.unwrap();
        repo.set_status(20, "INACTIVE").await.unwrap();

        let active = repo.list_active().await.unwrap();
        let ids: Vec<i64> = active.iter().map(|c| c.store_id).collect();
        assert_eq!(ids, vec![10, 30]);
        assert_eq!(active[0].login, "a");
    }

    #[tokio::test]
    async fn test_upsert_reports_update() {
        let (repo, _dir) = setup().await;

        let first = repo.upsert(&Credential::new(5, "old", "x")).await.unwrap();
        let second = repo.upsert(&Credential::new(5, "new", "y")).await.unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Updated);
        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].login, "new");
    }

    #[tokio::test]
    async fn test_empty_source() {
        let (repo, _dir) = setup().await;
        assert!(repo.list_active().await.unwrap().is_empty());
    }
}
