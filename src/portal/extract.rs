//! Document key extraction from listing rows.
//!
//! Extraction is an ordered list of pure strategies; the first one that
//! yields a key wins.

use std::sync::LazyLock;

use regex::Regex;

use super::listing::ListingRow;
use crate::models::DocumentKey;

/// A single extraction strategy.
pub type KeyStrategy = fn(&ListingRow) -> Option<DocumentKey>;

/// Strategies in the order they are tried.
pub const KEY_STRATEGIES: &[(&str, KeyStrategy)] = &[
    ("download-link", from_download_link),
    ("exact-run", from_exact_run),
    ("relaxed-run", from_relaxed_run),
];

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("valid digit pattern"));

static EMBEDDED_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{44,50}").expect("valid key pattern"));

/// Extract the document key for a row, or `None` if no strategy finds one.
pub fn extract_key(row: &ListingRow) -> Option<DocumentKey> {
    extract_key_with(row).map(|(key, _)| key)
}

/// Like [`extract_key`], also naming the strategy that matched.
pub fn extract_key_with(row: &ListingRow) -> Option<(DocumentKey, &'static str)> {
    KEY_STRATEGIES
        .iter()
        .find_map(|&(name, strategy)| strategy(row).map(|key| (key, name)))
}

/// Trailing path segment of the first download link.
pub fn from_download_link(row: &ListingRow) -> Option<DocumentKey> {
    let href = row.download_links.first()?;
    let path = href.split(['?', '#']).next().unwrap_or_default();
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    normalize_candidate(segment)
}

/// First maximal digit run of exactly the full key length.
pub fn from_exact_run(row: &ListingRow) -> Option<DocumentKey> {
    digit_runs(&row.text)
        .find(|run| run.len() == DocumentKey::MAX_LEN)
        .and_then(DocumentKey::parse)
}

/// First maximal digit run anywhere in the key length range.
pub fn from_relaxed_run(row: &ListingRow) -> Option<DocumentKey> {
    digit_runs(&row.text)
        .find(|run| (DocumentKey::MIN_LEN..=DocumentKey::MAX_LEN).contains(&run.len()))
        .and_then(DocumentKey::parse)
}

/// Validate a raw candidate, recovering an embedded key from overlong ones.
pub fn normalize_candidate(candidate: &str) -> Option<DocumentKey> {
    let candidate = candidate.trim();
    if candidate.len() > DocumentKey::MAX_LEN {
        return EMBEDDED_KEY
            .find(candidate)
            .and_then(|m| DocumentKey::parse(m.as_str()));
    }
    DocumentKey::parse(candidate)
}

// Maximal runs: a run longer than a key never yields a key from the text tiers.
fn digit_runs(text: &str) -> impl Iterator<Item = &str> {
    DIGIT_RUN.find_iter(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_50: &str = "35503081234567890123456789012345678901234567890123";
    const KEY_44: &str = "35230612345678000199550010000000011000000010";

    fn text_row(text: &str) -> ListingRow {
        ListingRow {
            text: text.to_string(),
            download_links: Vec::new(),
        }
    }

    fn link_row(href: &str, text: &str) -> ListingRow {
        ListingRow {
            text: text.to_string(),
            download_links: vec![href.to_string()],
        }
    }

    #[test]
    fn test_link_segment_wins() {
        let row = link_row(
            &format!("/EmissorNacional/Notas/Download/NFSe/{KEY_50}"),
            &format!("other key {KEY_44}"),
        );
        let (key, strategy) = extract_key_with(&row).unwrap();
        assert_eq!(key.as_str(), KEY_50);
        assert_eq!(strategy, "download-link");
    }

    #[test]
    fn test_link_query_is_ignored() {
        let row = link_row(&format!("/Notas/Download/DANFSe/{KEY_44}?inline=1"), "");
        assert_eq!(extract_key(&row).unwrap().as_str(), KEY_44);
    }

    #[test]
    fn test_overlong_link_segment_is_rescanned() {
        let row = link_row(&format!("/Notas/Download/NFSe/NFS{KEY_50}9"), "");
        assert_eq!(extract_key(&row).unwrap().as_str(), KEY_50);
    }

    #[test]
    fn test_unusable_link_falls_back_to_text() {
        let row = link_row("/Notas/Download/Lote", &format!("Chave: {KEY_44} emitida"));
        let (key, strategy) = extract_key_with(&row).unwrap();
        assert_eq!(key.as_str(), KEY_44);
        assert_eq!(strategy, "relaxed-run");
    }

    #[test]
    fn test_exact_run_preferred_over_shorter_run() {
        let row = text_row(&format!("{KEY_44} | {KEY_50}"));
        let (key, strategy) = extract_key_with(&row).unwrap();
        assert_eq!(key.as_str(), KEY_50);
        assert_eq!(strategy, "exact-run");
    }

    #[test]
    fn test_embedded_keys_returned_unchanged() {
        for len in DocumentKey::MIN_LEN..=DocumentKey::MAX_LEN {
            let key = &KEY_50[..len];
            for text in [
                format!("NFS-e{key}R$ 100,00"),
                format!("Emitida em 01/02/2024 - chave {key} - Tomador 12.345.678/0001-99"),
                key.to_string(),
            ] {
                assert_eq!(
                    extract_key(&text_row(&text)).map(String::from).as_deref(),
                    Some(key),
                    "text: {text}"
                );
            }
        }
    }

    #[test]
    fn test_51_digit_run_without_link_yields_nothing() {
        let row = text_row(&format!("Chave {KEY_50}7 valor 10,00"));
        assert!(extract_key(&row).is_none());
    }

    #[test]
    fn test_short_runs_yield_nothing() {
        assert!(extract_key(&text_row("CNPJ 12345678000199 data 01/02/2024")).is_none());
    }
}
