//! Upload staging.
//!
//! Uploaded media is streamed into a uniquely named `upload-*.mp4` file in the
//! upload directory. The file is removed again unless the upload is persisted,
//! so a failed or aborted upload leaves nothing behind.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const STAGED_PREFIX: &str = "upload-";
const STAGED_SUFFIX: &str = ".mp4";

/// A fully written, persisted upload.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub path: PathBuf,
    pub bytes: u64,
}

/// An upload being written. Dropping it deletes the partial file.
pub struct StagingFile {
    file: File,
    path: TempPath,
    written: u64,
}

impl StagingFile {
    /// Create a fresh staging file in `dir`, creating the directory if needed.
    pub async fn create(dir: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let named = tempfile::Builder::new()
            .prefix(STAGED_PREFIX)
            .suffix(STAGED_SUFFIX)
            .tempfile_in(dir)?;
        let (file, path) = named.into_parts();

        Ok(Self {
            file: File::from_std(file),
            path,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush the file and keep it on disk.
    pub async fn persist(mut self) -> io::Result<StagedUpload> {
        self.file.flush().await?;
        let path = self.path.keep().map_err(|e| e.error)?;
        Ok(StagedUpload {
            path,
            bytes: self.written,
        })
    }
}

/// Remove a staged upload whose job could not be created.
pub async fn discard(upload: &StagedUpload) {
    if let Err(e) = tokio::fs::remove_file(&upload.path).await {
        tracing::warn!(path = %upload.path.display(), "Failed to remove staged upload: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persisted_upload_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = StagingFile::create(dir.path()).await.unwrap();
        staging.write_chunk(b"abc").await.unwrap();
        staging.write_chunk(b"def").await.unwrap();

        let upload = staging.persist().await.unwrap();
        assert_eq!(upload.bytes, 6);
        assert_eq!(tokio::fs::read(&upload.path).await.unwrap(), b"abcdef");

        let name = upload.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("upload-"));
        assert!(name.ends_with(".mp4"));
    }

    #[tokio::test]
    async fn test_dropped_upload_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = StagingFile::create(dir.path()).await.unwrap();
        staging.write_chunk(b"partial").await.unwrap();
        let path = staging.path().to_path_buf();
        assert!(path.exists());

        drop(staging);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_create_makes_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let staging = StagingFile::create(&nested).await.unwrap();
        assert!(staging.path().starts_with(&nested));
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let upload = StagingFile::create(dir.path()).await.unwrap().persist().await.unwrap();
        discard(&upload).await;
        assert!(!upload.path.exists());
    }
}
