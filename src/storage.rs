//! Local download directory.
//!
//! Files are named `{key}.xml` / `{key}.pdf`. A file's presence is the local
//! dedup check, independent of the document store.

use std::io;
use std::path::{Path, PathBuf};

use crate::models::{DocumentKey, FileType};

#[derive(Debug, Clone)]
pub struct LocalArchive {
    root: PathBuf,
}

impl LocalArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn path_for(&self, key: &DocumentKey, file_type: FileType) -> PathBuf {
        self.root.join(format!("{}.{}", key, file_type.extension()))
    }

    pub fn contains(&self, key: &DocumentKey, file_type: FileType) -> bool {
        self.path_for(key, file_type).is_file()
    }

    /// Write through a temporary name so a partial file never looks present.
    pub async fn write(
        &self,
        key: &DocumentKey,
        file_type: FileType,
        content: &[u8],
    ) -> io::Result<PathBuf> {
        let target = self.path_for(key, file_type);
        let partial = target.with_extension(format!("{}.part", file_type.extension()));

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&partial, content).await?;
        tokio::fs::rename(&partial, &target).await?;
        Ok(target)
    }

    pub async fn read(&self, key: &DocumentKey, file_type: FileType) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key, file_type)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key() -> DocumentKey {
        DocumentKey::parse(&"4".repeat(50)).unwrap()
    }

    #[tokio::test]
    async fn test_write_then_contains() {
        let dir = tempdir().unwrap();
        let archive = LocalArchive::new(dir.path().join("downloads"));
        let key = key();

        assert!(!archive.contains(&key, FileType::Structured));
        let path = archive
            .write(&key, FileType::Structured, b"<NFSe/>")
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap().to_str().unwrap(), format!("{key}.xml"));
        assert!(archive.contains(&key, FileType::Structured));
        assert!(!archive.contains(&key, FileType::Rendered));
        assert!(!path.with_extension("xml.part").exists());
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempdir().unwrap();
        let archive = LocalArchive::new(dir.path());
        assert!(archive.read(&key(), FileType::Rendered).await.unwrap().is_none());
    }
}
