//! Local directory backend: `<dir>/<user_id>.json`

use super::{RecordBackend, StorageError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Records stored as files in one directory
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) the history directory
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        info!("File history backend at {}", dir.display());
        Ok(Self { dir })
    }

    /// Absolute location of a record
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl RecordBackend for FileBackend {
    fn key_for(&self, user_id: i64) -> String {
        format!("{user_id}.json")
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = self.path_for(&format!("{key}.tmp"));
        tokio::fs::write(&tmp, body).await?;
        // rename is atomic on the same filesystem; readers see old or new, never half
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn check_connection(&self) -> Result<(), String> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(format!("{} is not a directory", self.dir.display())),
            Err(e) => Err(format!("History directory unavailable: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_missing_is_none() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let backend = FileBackend::new(dir.path()).await?;
        assert!(backend.read("1.json").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_write_replaces_and_leaves_no_temp() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let backend = FileBackend::new(dir.path()).await?;

        backend.write("7.json", b"first".to_vec()).await?;
        backend.write("7.json", b"second".to_vec()).await?;

        assert_eq!(backend.read("7.json").await?, Some(b"second".to_vec()));
        assert!(!dir.path().join("7.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let backend = FileBackend::new(dir.path()).await?;
        backend.delete("nope.json").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_creates_nested_directory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a").join("b");
        let backend = FileBackend::new(&nested).await?;
        assert!(nested.is_dir());
        assert!(backend.check_connection().await.is_ok());
        Ok(())
    }
}
