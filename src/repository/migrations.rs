//! Schema creation. Idempotent; safe to run on every start.

use diesel_async::SimpleAsyncConnection;
use tracing::debug;

use super::pool::{AsyncSqlitePool, DbError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nfse_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_key TEXT NOT NULL UNIQUE,
    structured TEXT,
    rendered BLOB,
    origin TEXT NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS store_credentials (
    store_id INTEGER PRIMARY KEY,
    login TEXT NOT NULL,
    password TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_store_credentials_status ON store_credentials(status);

CREATE TABLE IF NOT EXISTS certificates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name TEXT NOT NULL UNIQUE,
    info TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    content BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS processing_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    origin TEXT NOT NULL,
    message TEXT NOT NULL,
    document_key TEXT,
    actor TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_processing_log_created ON processing_log(created_at);
"#;

/// Create all tables and indexes if they do not exist.
pub async fn init_schema(pool: &AsyncSqlitePool) -> Result<(), DbError> {
    let mut conn = pool.get().await?;
    conn.batch_execute(SCHEMA).await?;
    debug!("Schema ready at {}", pool.database_url());
    Ok(())
}
