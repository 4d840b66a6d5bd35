//! Query lifecycle: requirement checks, status polling and note collection.

use std::future::Future;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use super::error::ApiError;
use super::types::{City, NotesPage, QueryRequest, QueryStatus, RegisteredCertificate};
use crate::models::{DocumentKey, DocumentOrigin};
use crate::repository::{DocumentStore, InsertOutcome};

/// Paged access to the notes of a finished protocol.
#[async_trait]
pub trait ProtocolNotes: Send + Sync {
    async fn list_notes(&self, protocol: &str, page: u32) -> Result<NotesPage, ApiError>;
    async fn download_note_xml(&self, protocol: &str, note_id: &str) -> Result<Vec<u8>, ApiError>;
}

pub fn find_city<'a>(cities: &'a [City], ibge_code: &str) -> Option<&'a City> {
    cities.iter().find(|c| c.ibge_code == ibge_code)
}

/// Check a request against what its city demands.
pub fn validate_query(
    city: &City,
    request: &QueryRequest,
    certificates: &[RegisteredCertificate],
) -> Result<(), ApiError> {
    if city.requires_issuer && request.issuer.is_none() {
        return Err(ApiError::MissingRequirement(format!(
            "{} requires the issuer CNPJ (--issuer)",
            city.name
        )));
    }
    if city.requires_certificate && certificates.is_empty() {
        return Err(ApiError::MissingRequirement(format!(
            "{} requires a registered certificate (nfse api register-cert)",
            city.name
        )));
    }
    if (city.requires_login || city.requires_password) && request.recipient.authentication.is_none()
    {
        return Err(ApiError::MissingRequirement(format!(
            "{} requires the city portal login and password",
            city.name
        )));
    }
    Ok(())
}

/// Sleep, then check, up to `max_attempts` times.
///
/// Failed checks are logged and count as an attempt. `ERRO` ends the wait
/// with [`ApiError::Failed`].
pub async fn poll_until_terminal<F, Fut>(
    protocol: &str,
    interval: Duration,
    max_attempts: u32,
    mut check: F,
) -> Result<QueryStatus, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<QueryStatus, ApiError>>,
{
    for attempt in 1..=max_attempts {
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }

        match check().await {
            Ok(status) if status.is_completed() => {
                info!("Protocol {} completed with {} notes", protocol, status.total);
                return Ok(status);
            }
            Ok(status) if status.is_failed() => {
                return Err(ApiError::Failed(protocol.to_string()));
            }
            Ok(status) => info!(
                "[{}/{}] protocol {} still {}",
                attempt, max_attempts, protocol, status.situation
            ),
            Err(e) => warn!("Status check {} for {} failed: {}", attempt, protocol, e),
        }
    }

    Err(ApiError::Timeout {
        protocol: protocol.to_string(),
        attempts: max_attempts,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectCounters {
    pub pages: u32,
    pub notes: usize,
    pub saved: usize,
    pub existing: usize,
    pub failed: usize,
    pub stored: usize,
}

impl std::fmt::Display for CollectCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} notes on {} pages: {} saved, {} existing, {} failed, {} stored",
            self.notes, self.pages, self.saved, self.existing, self.failed, self.stored
        )
    }
}

static XML_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:Id="[A-Za-z]*|<chNFSe>|<ChaveAcesso>|<chaveAcesso>)([0-9]{44,50})"#)
        .expect("valid key regex")
});

/// Access key embedded in an NFSe XML, if any.
pub fn key_from_xml(xml: &[u8]) -> Option<DocumentKey> {
    let text = String::from_utf8_lossy(xml);
    XML_KEY_RE
        .captures(&text)
        .and_then(|c| DocumentKey::parse(&c[1]))
}

/// Walk every page of a finished protocol and save each note's XML.
///
/// Existing files are left alone. With a store, saved notes whose XML carries
/// an access key are also inserted with origin `API`.
pub async fn collect(
    source: &dyn ProtocolNotes,
    protocol: &str,
    dir: &Path,
    store: Option<&dyn DocumentStore>,
) -> Result<CollectCounters, ApiError> {
    tokio::fs::create_dir_all(dir).await?;
    let mut counters = CollectCounters::default();
    let mut page = 1;

    loop {
        let listing = source.list_notes(protocol, page).await?;
        if listing.notes.is_empty() {
            break;
        }
        counters.pages += 1;
        counters.notes += listing.notes.len();

        for note in &listing.notes {
            let path = dir.join(note.file_name());
            if path.exists() {
                counters.existing += 1;
                continue;
            }

            let xml = match source.download_note_xml(protocol, &note.id).await {
                Ok(xml) => xml,
                Err(e) => {
                    warn!("Could not download note {}: {}", note.id, e);
                    counters.failed += 1;
                    continue;
                }
            };

            if let Err(e) = tokio::fs::write(&path, &xml).await {
                warn!("Could not save {}: {}", path.display(), e);
                counters.failed += 1;
                continue;
            }
            counters.saved += 1;

            if let Some(store) = store {
                match key_from_xml(&xml) {
                    Some(key) => match store.insert(&key, Some(&xml), None, DocumentOrigin::Api).await {
                        Ok(InsertOutcome::Inserted) => counters.stored += 1,
                        Ok(InsertOutcome::Duplicate) => {}
                        Err(e) => warn!("Could not store note {}: {}", note.id, e),
                    },
                    None => warn!("Note {} has no access key, not stored", note.id),
                }
            }
        }

        if !listing.has_next {
            break;
        }
        page += 1;
    }

    Ok(counters)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;
    use crate::api::types::{NoteRef, Period};

    fn city(requires_issuer: bool, requires_certificate: bool, requires_login: bool) -> City {
        City {
            name: "Curitiba".to_string(),
            ibge_code: "4106902".to_string(),
            standard: None,
            requires_certificate,
            requires_login,
            requires_password: false,
            requires_issuer,
            communication: None,
        }
    }

    fn request() -> QueryRequest {
        let period = Period::last_days(30, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        QueryRequest::new("4106902", "12345678000199", period)
    }

    #[test]
    fn test_validate_query_requirements() {
        let certs = vec![RegisteredCertificate {
            id: "1".to_string(),
            name: None,
            expiry: None,
        }];

        assert!(validate_query(&city(false, false, false), &request(), &[]).is_ok());
        assert!(matches!(
            validate_query(&city(true, false, false), &request(), &certs),
            Err(ApiError::MissingRequirement(_))
        ));
        assert!(validate_query(
            &city(true, false, false),
            &request().with_issuer(Some("98765432000110".to_string()), None),
            &[]
        )
        .is_ok());
        assert!(validate_query(&city(false, true, false), &request(), &[]).is_err());
        assert!(validate_query(&city(false, true, false), &request(), &certs).is_ok());
        assert!(validate_query(&city(false, false, true), &request(), &certs).is_err());
        assert!(validate_query(
            &city(false, false, true),
            &request().with_authentication(Some("u".to_string()), Some("p".to_string())),
            &certs
        )
        .is_ok());
    }

    fn status(situation: &str) -> QueryStatus {
        QueryStatus {
            situation: situation.to_string(),
            total: 3,
        }
    }

    #[tokio::test]
    async fn test_poll_stops_on_completion() {
        let calls = AtomicU32::new(0);
        let result = poll_until_terminal("P1", Duration::ZERO, 10, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => Err(ApiError::Envelope("flaky".to_string())),
                    1 => Ok(status("PROCESSANDO")),
                    _ => Ok(status("Concluido")),
                }
            }
        })
        .await
        .unwrap();

        assert!(result.is_completed());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_error_and_timeout() {
        let failed = poll_until_terminal("P2", Duration::ZERO, 5, || async { Ok(status("ERRO")) }).await;
        assert!(matches!(failed, Err(ApiError::Failed(p)) if p == "P2"));

        let timed_out =
            poll_until_terminal("P3", Duration::ZERO, 4, || async { Ok(status("PROCESSANDO")) })
                .await;
        assert!(matches!(timed_out, Err(ApiError::Timeout { attempts: 4, .. })));
    }

    struct FakeNotes {
        pages: HashMap<u32, NotesPage>,
        listed: AtomicU32,
    }

    #[async_trait]
    impl ProtocolNotes for FakeNotes {
        async fn list_notes(&self, _protocol: &str, page: u32) -> Result<NotesPage, ApiError> {
            self.listed.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.get(&page).cloned().unwrap_or_default())
        }

        async fn download_note_xml(&self, _protocol: &str, note_id: &str) -> Result<Vec<u8>, ApiError> {
            if note_id == "bad" {
                return Err(ApiError::Status {
                    status: 500,
                    body: String::new(),
                });
            }
            Ok(format!("<NFSe><infNFSe Id=\"NFS{}\"/></NFSe>", "1".repeat(50)).into_bytes())
        }
    }

    fn note(id: &str, number: &str) -> NoteRef {
        NoteRef {
            id: id.to_string(),
            number: Some(number.to_string()),
        }
    }

    #[tokio::test]
    async fn test_collect_walks_pages_and_skips_existing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("nota_2_b.xml"), b"old").unwrap();

        let source = FakeNotes {
            pages: HashMap::from([
                (
                    1,
                    NotesPage {
                        notes: vec![note("a", "1"), note("b", "2")],
                        has_next: true,
                    },
                ),
                (
                    2,
                    NotesPage {
                        notes: vec![note("bad", "3")],
                        has_next: false,
                    },
                ),
            ]),
            listed: AtomicU32::new(0),
        };

        let counters = collect(&source, "P", dir.path(), None).await.unwrap();

        assert_eq!(counters.pages, 2);
        assert_eq!(counters.notes, 3);
        assert_eq!(counters.saved, 1);
        assert_eq!(counters.existing, 1);
        assert_eq!(counters.failed, 1);
        assert_eq!(source.listed.load(Ordering::SeqCst), 2);
        assert!(dir.path().join("nota_1_a.xml").exists());
        assert_eq!(std::fs::read(dir.path().join("nota_2_b.xml")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_collect_stops_on_empty_page() {
        let dir = tempdir().unwrap();
        let source = FakeNotes {
            pages: HashMap::new(),
            listed: AtomicU32::new(0),
        };

        let counters = collect(&source, "P", dir.path(), None).await.unwrap();
        assert_eq!(counters, CollectCounters::default());
        assert_eq!(source.listed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_key_from_xml() {
        let key = "3".repeat(50);
        let xml = format!(r#"<NFSe><infNFSe Id="NFS{}">"#, key);
        assert_eq!(key_from_xml(xml.as_bytes()).unwrap().as_str(), key);
        assert!(key_from_xml(b"<NFSe><numero>12</numero></NFSe>").is_none());
    }
}
