//! SQLite persistence: documents, store credentials, certificates and the
//! processing log.

mod certificate;
mod credential;
mod document;
mod migrations;
pub mod models;
mod pool;
pub mod processing_log;
pub mod util;

pub use certificate::DieselCertificateRepository;
pub use credential::{CredentialSource, DieselCredentialRepository, UpsertOutcome};
pub use document::{DieselDocumentStore, DocumentStore, InsertOutcome, StoredDocument};
pub use migrations::init_schema;
pub use pool::{AsyncSqlitePool, DbError, SqliteConn};
pub use processing_log::{LogLevel, ProcessingLog};
