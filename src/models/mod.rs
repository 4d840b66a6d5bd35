//! Domain models shared across the portal, store and import paths.

mod credential;
mod document;

pub use credential::{Credential, STATUS_ACTIVE};
pub use document::{DocumentKey, DocumentOrigin, DownloadResult, FileType};
