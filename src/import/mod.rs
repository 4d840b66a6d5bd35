//! Bulk imports: downloaded documents, store credentials and certificates.

mod certificates;
mod documents;
mod stores;

pub use certificates::{import_certificates, CertificateImportCounters};
pub use documents::{import_directory, ImportCounters};
pub use stores::{
    import_stores, parse_rows, ParsedRows, SkipReason, StoreImportCounters, StoreImportError,
};
