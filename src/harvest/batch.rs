//! Multi-store batch runs.

use std::time::Duration;

use tracing::{error, info, warn};

use super::counters::RunCounters;
use super::error::HarvestError;
use super::harvester::{AbortReason, HarvestOutcome, Harvester};
use crate::models::Credential;
use crate::portal::SessionFactory;
use crate::repository::processing_log::origin;
use crate::repository::{LogLevel, ProcessingLog};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOutcome {
    Completed(RunCounters),
    Aborted {
        counters: RunCounters,
        reason: AbortReason,
    },
    /// Login rejected or the session broke before any page was processed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialReport {
    pub store_id: i64,
    pub outcome: CredentialOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub credentials: Vec<CredentialReport>,
    /// Set when the batch stopped early because no session could be opened.
    pub halted: Option<String>,
}

impl BatchReport {
    /// Counters summed over every credential that processed pages.
    pub fn totals(&self) -> RunCounters {
        let mut totals = RunCounters::default();
        for report in &self.credentials {
            match &report.outcome {
                CredentialOutcome::Completed(counters)
                | CredentialOutcome::Aborted { counters, .. } => totals += *counters,
                CredentialOutcome::Failed(_) => {}
            }
        }
        totals
    }
}

/// Runs the harvester over credentials, one fresh session each.
pub struct BatchRunner<'a> {
    factory: &'a dyn SessionFactory,
    harvester: &'a Harvester<'a>,
    credential_delay: Duration,
    log: Option<&'a ProcessingLog>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(factory: &'a dyn SessionFactory, harvester: &'a Harvester<'a>) -> Self {
        Self {
            factory,
            harvester,
            credential_delay: Duration::from_secs(5),
            log: None,
        }
    }

    /// Pause between consecutive credentials.
    pub fn with_credential_delay(mut self, delay: Duration) -> Self {
        self.credential_delay = delay;
        self
    }

    pub fn with_log(mut self, log: &'a ProcessingLog) -> Self {
        self.log = Some(log);
        self
    }

    pub async fn run(&self, credentials: &[Credential]) -> BatchReport {
        let mut report = BatchReport::default();

        if credentials.is_empty() {
            info!("No active credentials, nothing to do");
            return report;
        }

        for (index, credential) in credentials.iter().enumerate() {
            if index > 0 && !self.credential_delay.is_zero() {
                tokio::time::sleep(self.credential_delay).await;
            }

            info!(
                "Processing store {} ({}/{})",
                credential.store_id,
                index + 1,
                credentials.len()
            );

            let mut session = match self.factory.open().await {
                Ok(session) => session,
                Err(e) => {
                    let err = HarvestError::SessionUnavailable(e);
                    error!("{}", err);
                    self.note(LogLevel::Error, &err.to_string()).await;
                    report.halted = Some(err.to_string());
                    return report;
                }
            };

            let result = self.harvester.run(session.as_mut(), credential).await;
            session.close().await;

            let outcome = match result {
                Ok(HarvestOutcome::Done(counters)) => {
                    self.note(
                        LogLevel::Info,
                        &format!("Store {} finished: {}", credential.store_id, counters),
                    )
                    .await;
                    CredentialOutcome::Completed(counters)
                }
                Ok(HarvestOutcome::Aborted { counters, reason }) => {
                    self.note(
                        LogLevel::Warning,
                        &format!(
                            "Store {} aborted: {} ({})",
                            credential.store_id, reason, counters
                        ),
                    )
                    .await;
                    CredentialOutcome::Aborted { counters, reason }
                }
                Err(e) => {
                    warn!("{}", e);
                    self.note(LogLevel::Error, &e.to_string()).await;
                    CredentialOutcome::Failed(e.to_string())
                }
            };

            report.credentials.push(CredentialReport {
                store_id: credential.store_id,
                outcome,
            });
        }

        report
    }

    async fn note(&self, level: LogLevel, message: &str) {
        if let Some(log) = self.log {
            log.note(level, origin::PORTAL, message, None).await;
        }
    }
}
