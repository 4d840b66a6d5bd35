//! Portal error types.

use thiserror::Error;

/// Failures driving the interactive portal session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start browser session: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    ElementMissing(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("{0}")]
    Unsupported(String),
}

/// Failures of a direct document download.
///
/// A 404 is not an error; see [`super::FetchOutcome::NotFound`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unexpected HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("empty response body for {url}")]
    EmptyBody { url: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid download URL: {0}")]
    InvalidUrl(String),

    #[error("session unavailable: {0}")]
    Session(#[from] SessionError),
}
