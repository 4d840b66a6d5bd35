//! Per-credential download loop.
//!
//! Drives one authenticated session through
//! `Authenticating → Filtering → EnumeratingPage → ProcessingRow → Paginating`
//! until `Done` or `Aborted`.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, info, warn};

use super::counters::RunCounters;
use super::error::HarvestError;
use crate::capabilities::Capabilities;
use crate::models::{Credential, DocumentKey, DocumentOrigin, DownloadResult, FileType};
use crate::portal::{
    extract_key, parse_listing, portal_base_url, DateRange, DocumentTransport, FetchOutcome,
    ListingPage, ListingRow, LoginAssessment, PortalSession, SessionError, SessionSnapshot,
    TransportError,
};
use crate::repository::{DocumentStore, InsertOutcome};
use crate::storage::LocalArchive;

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Days back from today when no explicit range is given.
    pub lookback_days: u32,
    pub date_range: Option<DateRange>,
    /// Wall-clock budget per row, measured from the start of key extraction.
    pub row_budget: Duration,
    /// Pause after each processed row.
    pub row_delay: Duration,
    /// Stop after this many rows with a key.
    pub limit: Option<usize>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            lookback_days: 10,
            date_range: None,
            row_budget: Duration::from_secs(30),
            row_delay: Duration::from_millis(500),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestState {
    Authenticating,
    Filtering,
    EnumeratingPage,
    ProcessingRow,
    Paginating,
    Done,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The same non-empty key set came back on consecutive pages.
    LoopDetected { page: usize, keys: usize },
    /// The browser stopped responding mid-run.
    SessionLost(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::LoopDetected { page, keys } => write!(
                f,
                "loop detected: page {} repeated the previous page's {} keys",
                page, keys
            ),
            AbortReason::SessionLost(msg) => write!(f, "session lost: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    Done(RunCounters),
    Aborted {
        counters: RunCounters,
        reason: AbortReason,
    },
}

impl HarvestOutcome {
    pub fn counters(&self) -> &RunCounters {
        match self {
            HarvestOutcome::Done(counters) => counters,
            HarvestOutcome::Aborted { counters, .. } => counters,
        }
    }

    pub fn state(&self) -> HarvestState {
        match self {
            HarvestOutcome::Done(_) => HarvestState::Done,
            HarvestOutcome::Aborted { .. } => HarvestState::Aborted,
        }
    }
}

enum FileFetch {
    Bytes(Vec<u8>),
    NotFound,
    Failed,
}

enum PersistOutcome {
    Stored(InsertOutcome),
    Failed,
}

struct PairReport {
    results: [DownloadResult; 2],
    persisted: Option<PersistOutcome>,
}

/// Runs the download loop for one credential at a time.
pub struct Harvester<'a> {
    transport: &'a dyn DocumentTransport,
    archive: &'a LocalArchive,
    store: Option<&'a dyn DocumentStore>,
    capabilities: Capabilities,
    options: HarvestOptions,
}

impl<'a> Harvester<'a> {
    pub fn new(
        transport: &'a dyn DocumentTransport,
        archive: &'a LocalArchive,
        capabilities: Capabilities,
        options: HarvestOptions,
    ) -> Self {
        Self {
            transport,
            archive,
            store: None,
            capabilities,
            options,
        }
    }

    /// Persist newly fetched documents to this store.
    pub fn with_store(mut self, store: &'a dyn DocumentStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    /// Process one credential on an already-open session.
    ///
    /// Errors are fatal for this credential only; row-level problems are
    /// counted in the returned outcome.
    pub async fn run(
        &self,
        session: &mut dyn PortalSession,
        credential: &Credential,
    ) -> Result<HarvestOutcome, HarvestError> {
        let store_id = credential.store_id;
        let mut counters = RunCounters::default();
        let mut listing = ListingPage::default();
        let mut page_keys: BTreeSet<DocumentKey> = BTreeSet::new();
        let mut previous_keys: Option<BTreeSet<DocumentKey>> = None;
        let mut abort: Option<AbortReason> = None;
        let mut state = HarvestState::Authenticating;

        loop {
            debug!("Store {}: {:?}", store_id, state);
            state = match state {
                HarvestState::Authenticating => {
                    self.authenticate(session, credential).await?;
                    HarvestState::Filtering
                }
                HarvestState::Filtering => {
                    session
                        .open_listing()
                        .await
                        .map_err(|source| HarvestError::Session { store_id, source })?;
                    self.apply_filter(session, store_id).await;
                    HarvestState::EnumeratingPage
                }
                HarvestState::EnumeratingPage => match session.listing_html().await {
                    Ok(html) => {
                        listing = parse_listing(&html);
                        counters.pages += 1;
                        info!(
                            "Store {}: page {} has {} rows (selector: {})",
                            store_id,
                            counters.pages,
                            listing.rows.len(),
                            listing.row_selector.unwrap_or("none")
                        );
                        if listing.rows.is_empty() {
                            // An empty page ends the listing, whatever pagination it shows.
                            HarvestState::Done
                        } else {
                            HarvestState::ProcessingRow
                        }
                    }
                    Err(e) => {
                        abort = Some(AbortReason::SessionLost(e.to_string()));
                        HarvestState::Aborted
                    }
                },
                HarvestState::ProcessingRow => {
                    for row in &listing.rows {
                        if self.limit_reached(&counters) {
                            break;
                        }
                        if self.process_row(session, row, &mut counters, &mut page_keys).await
                            && !self.options.row_delay.is_zero()
                        {
                            tokio::time::sleep(self.options.row_delay).await;
                        }
                    }
                    if self.limit_reached(&counters) {
                        info!("Store {}: row limit reached", store_id);
                        HarvestState::Done
                    } else {
                        HarvestState::Paginating
                    }
                }
                HarvestState::Paginating => {
                    // Only the immediately preceding page is compared.
                    if !page_keys.is_empty() && previous_keys.as_ref() == Some(&page_keys) {
                        abort = Some(AbortReason::LoopDetected {
                            page: counters.pages,
                            keys: page_keys.len(),
                        });
                        HarvestState::Aborted
                    } else {
                        previous_keys = Some(std::mem::take(&mut page_keys));
                        match listing.next.take() {
                            Some(control) => match session.follow_next(&control).await {
                                Ok(true) => HarvestState::EnumeratingPage,
                                Ok(false) => {
                                    debug!("Store {}: next control vanished", store_id);
                                    HarvestState::Done
                                }
                                Err(e) => {
                                    abort = Some(AbortReason::SessionLost(e.to_string()));
                                    HarvestState::Aborted
                                }
                            },
                            None => HarvestState::Done,
                        }
                    }
                }
                HarvestState::Done => {
                    info!("Store {}: done ({})", store_id, counters);
                    return Ok(HarvestOutcome::Done(counters));
                }
                HarvestState::Aborted => {
                    let reason = abort.take().unwrap_or_else(|| {
                        AbortReason::SessionLost("aborted without a recorded reason".to_string())
                    });
                    warn!("Store {}: aborted, {} ({})", store_id, reason, counters);
                    return Ok(HarvestOutcome::Aborted { counters, reason });
                }
            };
        }
    }

    async fn authenticate(
        &self,
        session: &mut dyn PortalSession,
        credential: &Credential,
    ) -> Result<(), HarvestError> {
        let store_id = credential.store_id;
        match session.login(credential).await {
            Ok(LoginAssessment::Authenticated) => {
                info!("Store {}: logged in", store_id);
                Ok(())
            }
            Ok(LoginAssessment::Rejected(reason)) => Err(HarvestError::LoginRejected {
                store_id,
                reason: reason.unwrap_or_else(|| "no post-login marker found".to_string()),
            }),
            Err(e) => Err(HarvestError::LoginRejected {
                store_id,
                reason: e.to_string(),
            }),
        }
    }

    // Best effort: a missing filter only widens the listing.
    async fn apply_filter(&self, session: &mut dyn PortalSession, store_id: i64) {
        let range = self.options.date_range.unwrap_or_else(|| {
            DateRange::last_days(self.options.lookback_days, Local::now().date_naive())
        });
        let (start, end) = range.portal_format();

        match session.apply_date_filter(&range).await {
            Ok(true) => info!("Store {}: filtering {} to {}", store_id, start, end),
            Ok(false) => warn!(
                "Store {}: date filter fields not found, using the portal's default listing",
                store_id
            ),
            Err(e) => warn!("Store {}: could not apply date filter: {}", store_id, e),
        }
    }

    fn limit_reached(&self, counters: &RunCounters) -> bool {
        self.options
            .limit
            .is_some_and(|limit| counters.attempted >= limit)
    }

    /// Returns whether the row carried a key.
    async fn process_row(
        &self,
        session: &mut dyn PortalSession,
        row: &ListingRow,
        counters: &mut RunCounters,
        page_keys: &mut BTreeSet<DocumentKey>,
    ) -> bool {
        let started = Instant::now();
        let Some(key) = extract_key(row) else {
            debug!("Row without document key skipped");
            return false;
        };

        page_keys.insert(key.clone());
        counters.attempted += 1;

        // The budget is checked once extraction is done; extraction itself is not bounded.
        let elapsed = started.elapsed();
        let remaining = self.options.row_budget.saturating_sub(elapsed);
        if remaining.is_zero() {
            warn!("Row {} exceeded its budget during extraction ({:?})", key, elapsed);
            counters.failed += 1;
            return true;
        }

        match tokio::time::timeout(remaining, self.retrieve_pair(session, &key)).await {
            Ok(report) => {
                counters.record_row(&report.results);
                match report.persisted {
                    Some(PersistOutcome::Stored(InsertOutcome::Inserted)) => counters.persisted += 1,
                    Some(PersistOutcome::Stored(InsertOutcome::Duplicate)) => {
                        counters.duplicates += 1
                    }
                    Some(PersistOutcome::Failed) => counters.store_errors += 1,
                    None => {}
                }
            }
            Err(_) => {
                warn!(
                    "Row {} abandoned after {:?} (budget {:?})",
                    key,
                    started.elapsed(),
                    self.options.row_budget
                );
                counters.failed += 1;
            }
        }

        true
    }

    async fn retrieve_pair(&self, session: &mut dyn PortalSession, key: &DocumentKey) -> PairReport {
        let mut results = [DownloadResult::NotFound; 2];

        for (slot, file_type) in FileType::ALL.into_iter().enumerate() {
            if self.archive.contains(key, file_type) {
                debug!("{} {} already on disk", key, file_type);
                results[slot] = DownloadResult::AlreadyPresent;
                continue;
            }

            results[slot] = match self.fetch_file(session, key, file_type).await {
                FileFetch::Bytes(bytes) => match self.archive.write(key, file_type, &bytes).await {
                    Ok(path) => {
                        info!("Saved {} ({} bytes)", path.display(), bytes.len());
                        DownloadResult::Fetched
                    }
                    Err(e) => {
                        warn!("Could not save {} {}: {}", key, file_type, e);
                        DownloadResult::Failed
                    }
                },
                FileFetch::NotFound => DownloadResult::NotFound,
                FileFetch::Failed => DownloadResult::Failed,
            };
        }

        let persisted = if results.contains(&DownloadResult::Fetched) {
            self.persist(key).await
        } else {
            None
        };

        PairReport { results, persisted }
    }

    async fn fetch_file(
        &self,
        session: &mut dyn PortalSession,
        key: &DocumentKey,
        file_type: FileType,
    ) -> FileFetch {
        let started = Instant::now();
        let direct = match snapshot(session).await {
            Ok(snapshot) => self.transport.fetch(&snapshot, key, file_type).await,
            Err(e) => Err(TransportError::Session(e)),
        };

        let error = match direct {
            Ok(FetchOutcome::Fetched(bytes)) => return FileFetch::Bytes(bytes),
            Ok(FetchOutcome::NotFound) => {
                info!("{} {} not available on the portal", key, file_type);
                return FileFetch::NotFound;
            }
            Err(e) => e,
        };

        warn!(
            "Direct download of {} {} failed after {:?}: {}",
            key,
            file_type,
            started.elapsed(),
            error
        );

        if !self.capabilities.ui_download_fallback {
            return FileFetch::Failed;
        }

        match session.capture_download(key, file_type).await {
            Ok(Some(bytes)) if !bytes.is_empty() => {
                info!("Captured {} {} through the page", key, file_type);
                FileFetch::Bytes(bytes)
            }
            Ok(_) => {
                warn!(
                    "UI download of {} {} produced no file after {:?}",
                    key,
                    file_type,
                    started.elapsed()
                );
                FileFetch::Failed
            }
            Err(e) => {
                warn!("UI download of {} {} failed: {}", key, file_type, e);
                FileFetch::Failed
            }
        }
    }

    /// Send whatever renditions are on disk now; the store dedups by key.
    async fn persist(&self, key: &DocumentKey) -> Option<PersistOutcome> {
        let store = self.store?;

        let structured = self.read_local(key, FileType::Structured).await;
        let rendered = self.read_local(key, FileType::Rendered).await;

        match store
            .insert(key, structured.as_deref(), rendered.as_deref(), DocumentOrigin::Portal)
            .await
        {
            Ok(outcome) => Some(PersistOutcome::Stored(outcome)),
            Err(e) => {
                warn!("Could not store {}: {}", key, e);
                Some(PersistOutcome::Failed)
            }
        }
    }

    async fn read_local(&self, key: &DocumentKey, file_type: FileType) -> Option<Vec<u8>> {
        match self.archive.read(key, file_type).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not read {} {} back: {}", key, file_type, e);
                None
            }
        }
    }
}

/// Cookies are read from the browser for every request; they can rotate.
async fn snapshot(session: &mut dyn PortalSession) -> Result<SessionSnapshot, SessionError> {
    let current_url = session.current_url().await?;
    let cookies = session.cookies().await?;
    Ok(SessionSnapshot {
        base_url: portal_base_url(&current_url),
        cookies,
    })
}
