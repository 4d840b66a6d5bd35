//! Fiscal document identity and per-file outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identifier naming one fiscal document (44 to 50 ASCII digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentKey(String);

impl DocumentKey {
    pub const MIN_LEN: usize = 44;
    pub const MAX_LEN: usize = 50;

    /// Accept a candidate only if it is entirely digits and within the key length range.
    pub fn parse(candidate: &str) -> Option<Self> {
        let len = candidate.len();
        if (Self::MIN_LEN..=Self::MAX_LEN).contains(&len)
            && candidate.bytes().all(|b| b.is_ascii_digit())
        {
            Some(Self(candidate.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not a document key: {}", value))
    }
}

impl From<DocumentKey> for String {
    fn from(key: DocumentKey) -> Self {
        key.0
    }
}

/// The two renditions kept for every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Machine-readable XML.
    Structured,
    /// Printable PDF.
    Rendered,
}

impl FileType {
    /// Processing order within a row.
    pub const ALL: [FileType; 2] = [FileType::Structured, FileType::Rendered];

    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Structured => "xml",
            FileType::Rendered => "pdf",
        }
    }

    /// Path segment used by the portal download endpoint.
    pub fn download_segment(&self) -> &'static str {
        match self {
            FileType::Structured => "NFSe",
            FileType::Rendered => "DANFSe",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileType::Structured => "XML",
            FileType::Rendered => "PDF",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of retrieving one file type for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadResult {
    AlreadyPresent,
    Fetched,
    NotFound,
    Failed,
}

/// Where a persisted document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrigin {
    Portal,
    Importer,
    Api,
}

impl DocumentOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentOrigin::Portal => "PORTAL",
            DocumentOrigin::Importer => "IMPORTER",
            DocumentOrigin::Api => "API",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_key_lengths() {
        assert!(DocumentKey::parse(&"1".repeat(44)).is_some());
        assert!(DocumentKey::parse(&"9".repeat(50)).is_some());
        assert!(DocumentKey::parse(&"1".repeat(43)).is_none());
        assert!(DocumentKey::parse(&"1".repeat(51)).is_none());
    }

    #[test]
    fn test_parse_rejects_non_digits() {
        let mut candidate = "1".repeat(45);
        candidate.push('a');
        assert!(DocumentKey::parse(&candidate).is_none());
    }

    #[test]
    fn test_file_type_paths() {
        assert_eq!(FileType::Structured.extension(), "xml");
        assert_eq!(FileType::Rendered.download_segment(), "DANFSe");
        assert_eq!(FileType::ALL[0], FileType::Structured);
    }
}
