//! Vendor REST API for received NFSe documents.
//!
//! A query is created per city and period, processed asynchronously by the
//! vendor, polled until it settles, then its notes are downloaded page by page.

mod client;
mod error;
mod types;
mod workflow;

pub use client::{ApiClient, ApiCredentials};
pub use error::ApiError;
pub use types::{
    Authentication, City, NoteRef, NotesPage, Party, Period, QueryRequest, QueryStatus,
    RegisteredCertificate,
};
pub use workflow::{
    collect, find_city, key_from_xml, poll_until_terminal, validate_query, CollectCounters,
    ProtocolNotes,
};
