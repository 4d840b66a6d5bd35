//! Certificate file repository.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{CertificateRecord, NewCertificate};
use super::pool::{AsyncSqlitePool, DbError};
use super::util::now_rfc3339;
use crate::models::STATUS_ACTIVE;
use crate::schema::certificates;

#[derive(Clone)]
pub struct DieselCertificateRepository {
    pool: AsyncSqlitePool,
}

impl DieselCertificateRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, file_name: &str) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = certificates::table
            .filter(certificates::file_name.eq(file_name))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count > 0)
    }

    /// Store a certificate file as active.
    pub async fn insert(&self, file_name: &str, info: &str, content: &[u8]) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let created_at = now_rfc3339();

        diesel::insert_into(certificates::table)
            .values(NewCertificate {
                file_name,
                info,
                status: STATUS_ACTIVE,
                content,
                created_at: &created_at,
            })
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<CertificateRecord>, DbError> {
        let mut conn = self.pool.get().await?;

        certificates::table
            .order(certificates::file_name.asc())
            .select(CertificateRecord::as_select())
            .load(&mut conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::init_schema;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_insert_and_exists() {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();
        let repo = DieselCertificateRepository::new(pool);

        assert!(!repo.exists("loja1.pfx").await.unwrap());
        repo.insert("loja1.pfx", "Empresa: LOJA 1", b"\x30\x82").await.unwrap();
        assert!(repo.exists("loja1.pfx").await.unwrap());

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, "ACTIVE");
        assert_eq!(all[0].info, "Empresa: LOJA 1");
    }
}
