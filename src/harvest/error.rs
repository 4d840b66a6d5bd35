//! Harvest error taxonomy.
//!
//! Row-level problems (extraction misses, failed fetches, row timeouts) are
//! never errors here; they are counted and logged. A 404 is expected absence.

use thiserror::Error;

use crate::portal::SessionError;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The portal refused the credential. The batch moves on.
    #[error("login rejected for store {store_id}: {reason}")]
    LoginRejected { store_id: i64, reason: String },

    /// The session broke while working for one credential. The batch moves on.
    #[error("session failed for store {store_id}: {source}")]
    Session {
        store_id: i64,
        #[source]
        source: SessionError,
    },

    /// No browser session could be established. The whole batch stops.
    #[error("cannot establish browser session: {0}")]
    SessionUnavailable(#[source] SessionError),
}
