use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Envelope(String),

    #[error("protocol {protocol} still processing after {attempts} checks")]
    Timeout { protocol: String, attempts: u32 },

    #[error("protocol {0} finished with an error")]
    Failed(String),

    #[error("{0}")]
    MissingRequirement(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
