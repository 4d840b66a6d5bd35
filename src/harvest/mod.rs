//! Portal harvesting: the per-credential download loop and batch runs.

mod batch;
mod counters;
mod error;
mod harvester;

pub use batch::{BatchReport, BatchRunner, CredentialOutcome, CredentialReport};
pub use counters::RunCounters;
pub use error::HarvestError;
pub use harvester::{AbortReason, HarvestOptions, HarvestOutcome, HarvestState, Harvester};
