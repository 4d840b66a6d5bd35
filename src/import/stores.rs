//! Store credential import from a spreadsheet export (CSV).
//!
//! The first three columns are `store_id, login, password`. A header row is
//! recognized when its first cell is not numeric. Both `,` and `;` separated
//! files are accepted.

use std::fmt;
use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::Credential;
use crate::repository::{DbError, DieselCredentialRepository, UpsertOutcome};

#[derive(Debug, Error)]
pub enum StoreImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] DbError),
}

/// Why a row was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    InvalidStoreId(String),
    MissingLogin,
    MissingPassword,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Empty => write!(f, "empty row"),
            SkipReason::InvalidStoreId(v) => write!(f, "invalid store id '{}'", v),
            SkipReason::MissingLogin => write!(f, "missing login"),
            SkipReason::MissingPassword => write!(f, "missing password"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRows {
    pub credentials: Vec<Credential>,
    /// 1-based line numbers with the reason each was skipped.
    pub skipped: Vec<(usize, SkipReason)>,
    pub had_header: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreImportCounters {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl fmt::Display for StoreImportCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} skipped",
            self.inserted, self.updated, self.skipped
        )
    }
}

/// Store ids may come out of a spreadsheet as `12` or `12.0`.
fn parse_store_id(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    let id = cell.parse::<i64>().ok().or_else(|| {
        cell.replace(',', ".")
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })?;
    (id > 0).then_some(id)
}

fn is_blank(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell.eq_ignore_ascii_case("nan")
}

fn detect_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.contains(';') && !first_line.contains(',') {
        b';'
    } else {
        b','
    }
}

pub fn parse_rows(reader: impl Read, delimiter: u8) -> Result<ParsedRows, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut parsed = ParsedRows::default();

    for (index, record) in rdr.records().enumerate() {
        let record = record?;
        let line = index + 1;
        let cell = |i: usize| record.get(i).unwrap_or_default().to_string();
        let (id_cell, login, password) = (cell(0), cell(1), cell(2));

        if index == 0 && !id_cell.is_empty() && id_cell.replace(',', ".").parse::<f64>().is_err() {
            debug!("Header row detected: {:?}", record);
            parsed.had_header = true;
            continue;
        }

        let store_id = parse_store_id(&id_cell);
        let reason = if record.iter().all(is_blank) {
            SkipReason::Empty
        } else if is_blank(&login) && store_id.is_some() {
            SkipReason::MissingLogin
        } else if is_blank(&password) && store_id.is_some() {
            SkipReason::MissingPassword
        } else if let Some(store_id) = store_id {
            parsed
                .credentials
                .push(Credential::new(store_id, login.trim(), password.trim()));
            continue;
        } else {
            SkipReason::InvalidStoreId(id_cell)
        };
        parsed.skipped.push((line, reason));
    }

    Ok(parsed)
}

/// Read a CSV file and upsert every valid row as an active store.
pub async fn import_stores(
    path: &Path,
    repo: &DieselCredentialRepository,
) -> Result<StoreImportCounters, StoreImportError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StoreImportError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let text = text.trim_start_matches('\u{feff}');

    let parsed = parse_rows(text.as_bytes(), detect_delimiter(text))?;
    for (line, reason) in &parsed.skipped {
        warn!("Line {} skipped: {}", line, reason);
    }
    info!(
        "{} valid rows in {}{}",
        parsed.credentials.len(),
        path.display(),
        if parsed.had_header { " (header skipped)" } else { "" }
    );

    let mut counters = StoreImportCounters {
        skipped: parsed.skipped.len(),
        ..Default::default()
    };
    for credential in &parsed.credentials {
        match repo.upsert(credential).await? {
            UpsertOutcome::Inserted => counters.inserted += 1,
            UpsertOutcome::Updated => counters.updated += 1,
        }
    }

    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{init_schema, AsyncSqlitePool, CredentialSource};
    use tempfile::tempdir;

    #[test]
    fn test_header_and_skip_rules() {
        let csv = "codloja,usuario,senha\n\
                   12,user12,pw12\n\
                   ,,\n\
                   abc,user,pw\n\
                   0,user0,pw0\n\
                   13.0,user13,pw13\n\
                   14,nan,pw14\n\
                   15,user15,\n";
        let parsed = parse_rows(csv.as_bytes(), b',').unwrap();

        assert!(parsed.had_header);
        let ids: Vec<i64> = parsed.credentials.iter().map(|c| c.store_id).collect();
        assert_eq!(ids, vec![12, 13]);
        assert_eq!(
            parsed.skipped,
            vec![
                (3, SkipReason::Empty),
                (4, SkipReason::InvalidStoreId("abc".to_string())),
                (5, SkipReason::InvalidStoreId("0".to_string())),
                (7, SkipReason::MissingLogin),
                (8, SkipReason::MissingPassword),
            ]
        );
    }

    #[test]
    fn test_headerless_semicolon_file() {
        let csv = "7;loja7;segredo;extra\n8;loja8;outro\n";
        assert_eq!(detect_delimiter(csv), b';');

        let parsed = parse_rows(csv.as_bytes(), b';').unwrap();
        assert!(!parsed.had_header);
        assert_eq!(parsed.credentials.len(), 2);
        assert_eq!(parsed.credentials[0].password, "segredo");
    }

    #[tokio::test]
    async fn test_import_then_reimport_updates() {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();
        let repo = DieselCredentialRepository::new(pool);

        let path = dir.path().join("lojas.csv");
        std::fs::write(&path, "1,a,b\n2,c,d\nx,y,z\n").unwrap();

        let first = import_stores(&path, &repo).await.unwrap();
        assert_eq!(
            first,
            StoreImportCounters {
                inserted: 2,
                updated: 0,
                skipped: 1
            }
        );

        std::fs::write(&path, "\u{feff}loja;login;senha\n2;c;new\n3;e;f\n").unwrap();
        let second = import_stores(&path, &repo).await.unwrap();
        assert_eq!(second.inserted, 1);
        assert_eq!(second.updated, 1);

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 3);
        assert_eq!(active[1].password, "new");
    }
}
