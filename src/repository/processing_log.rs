//! Persistent processing log.
//!
//! Every origin (portal harvest, file import, certificate import, API
//! collection) leaves an audit trail here, tagged with the machine that ran it.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::warn;

use super::models::{LogRecord, NewLogEntry};
use super::pool::{AsyncSqlitePool, DbError};
use super::util::{now_rfc3339, truncate_chars};
use crate::schema::processing_log;

const MAX_MESSAGE_CHARS: usize = 4000;
const MAX_ACTOR_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origins written to the log.
pub mod origin {
    pub const PORTAL: &str = "PORTAL";
    pub const IMPORTER: &str = "IMPORTER";
    pub const CERTIFICATES: &str = "CERTIFICATES";
    pub const STORES: &str = "STORES";
    pub const API: &str = "API";
}

#[derive(Clone, Debug)]
pub struct ProcessingLog {
    pool: AsyncSqlitePool,
    actor: String,
}

impl ProcessingLog {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self {
            pool,
            actor: local_actor(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = truncate_chars(&actor.into(), MAX_ACTOR_CHARS).to_string();
        self
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub async fn record(
        &self,
        level: LogLevel,
        origin: &str,
        message: &str,
        document_key: Option<&str>,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let created_at = now_rfc3339();

        diesel::insert_into(processing_log::table)
            .values(NewLogEntry {
                level: level.as_str(),
                origin,
                message: truncate_chars(message, MAX_MESSAGE_CHARS),
                document_key,
                actor: &self.actor,
                created_at: &created_at,
            })
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Record an entry; a failure to write is traced and otherwise ignored.
    pub async fn note(&self, level: LogLevel, origin: &str, message: &str, document_key: Option<&str>) {
        if let Err(e) = self.record(level, origin, message, document_key).await {
            warn!("Could not write processing log entry: {}", e);
        }
    }

    /// Most recent entries first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LogRecord>, DbError> {
        let mut conn = self.pool.get().await?;

        processing_log::table
            .order(processing_log::id.desc())
            .limit(limit)
            .select(LogRecord::as_select())
            .load(&mut conn)
            .await
    }
}

/// `"{hostname} ({ip})"`, capped to the actor column width.
pub fn local_actor() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let actor = format!("{} ({})", host, local_ip());
    truncate_chars(&actor, MAX_ACTOR_CHARS).to_string()
}

// Connecting a UDP socket sends nothing; it only selects the outbound interface.
fn local_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::init_schema;
    use tempfile::tempdir;

    async fn setup() -> (ProcessingLog, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();
        (ProcessingLog::new(pool).with_actor("test-host (127.0.0.1)"), dir)
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let (log, _dir) = setup().await;

        log.record(LogLevel::Info, origin::PORTAL, "first", None).await.unwrap();
        log.record(LogLevel::Error, origin::IMPORTER, "second", Some("123"))
            .await
            .unwrap();

        let entries = log.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[0].level, "ERROR");
        assert_eq!(entries[0].document_key.as_deref(), Some("123"));
        assert_eq!(entries[1].actor, "test-host (127.0.0.1)");
    }

    #[tokio::test]
    async fn test_long_messages_are_truncated() {
        let (log, _dir) = setup().await;
        let message = "x".repeat(MAX_MESSAGE_CHARS + 10);

        log.record(LogLevel::Warning, origin::API, &message, None).await.unwrap();

        let entries = log.recent(1).await.unwrap();
        assert_eq!(entries[0].message.len(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn test_local_actor_fits_column() {
        let actor = local_actor();
        assert!(!actor.is_empty());
        assert!(actor.chars().count() <= MAX_ACTOR_CHARS);
    }
}
