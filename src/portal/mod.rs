//! NFSe portal: listing parsing, key extraction, session seam and downloads.

mod error;
pub mod extract;
pub mod listing;
pub mod login;
mod session;
pub mod transport;

pub use error::{SessionError, TransportError};
pub use extract::extract_key;
pub use listing::{parse_listing, ListingPage, ListingRow, NextControl};
pub use login::{assess_login, LoginAssessment};
pub use session::{DateRange, PortalSession, SessionCookie, SessionFactory};
pub use transport::{
    download_url, portal_base_url, DocumentTransport, FetchOutcome, HttpTransport,
    SessionSnapshot,
};
