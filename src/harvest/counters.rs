//! Per-credential run counters.

use std::fmt;
use std::ops::AddAssign;

use crate::models::DownloadResult;

/// Row and file tallies for one credential's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Rows with a document key.
    pub attempted: usize,
    /// Rows where at least one file was newly fetched.
    pub fetched: usize,
    /// Rows where every available file was already on disk.
    pub already_present: usize,
    /// Rows with a failed file or an exhausted time budget.
    pub failed: usize,
    /// Rows where the portal had no file of either type.
    pub unavailable: usize,
    /// Documents newly inserted into the store.
    pub persisted: usize,
    /// Store inserts that found the key already present.
    pub duplicates: usize,
    /// Store inserts that errored.
    pub store_errors: usize,
    /// Listing pages enumerated.
    pub pages: usize,
}

impl RunCounters {
    /// Classify a row from its per-file results.
    pub fn record_row(&mut self, results: &[DownloadResult]) {
        if results.contains(&DownloadResult::Fetched) {
            self.fetched += 1;
        } else if results.contains(&DownloadResult::Failed) {
            self.failed += 1;
        } else if results.contains(&DownloadResult::AlreadyPresent) {
            self.already_present += 1;
        } else {
            self.unavailable += 1;
        }
    }
}

impl AddAssign for RunCounters {
    fn add_assign(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.fetched += other.fetched;
        self.already_present += other.already_present;
        self.failed += other.failed;
        self.unavailable += other.unavailable;
        self.persisted += other.persisted;
        self.duplicates += other.duplicates;
        self.store_errors += other.store_errors;
        self.pages += other.pages;
    }
}

impl fmt::Display for RunCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted={} fetched={} already-present={} failed={} unavailable={} persisted={} pages={}",
            self.attempted,
            self.fetched,
            self.already_present,
            self.failed,
            self.unavailable,
            self.persisted,
            self.pages
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DownloadResult::*;

    #[test]
    fn test_row_classification() {
        let mut counters = RunCounters::default();
        counters.record_row(&[Fetched, NotFound]);
        counters.record_row(&[AlreadyPresent, Failed]);
        counters.record_row(&[AlreadyPresent, NotFound]);
        counters.record_row(&[NotFound, NotFound]);
        counters.record_row(&[AlreadyPresent, Fetched]);

        assert_eq!(counters.fetched, 2);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.already_present, 1);
        assert_eq!(counters.unavailable, 1);
    }
}
