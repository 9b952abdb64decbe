//! Upload collaborator: stores cat photos under the uploads directory.
//!
//! Enforces a content-type allowlist and a size cap before anything touches
//! the disk. Stored files get a generated `<uuid>.<ext>` name; controllers
//! only ever see that name.

use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("file exceeds maximum upload size of {0} bytes")]
    TooLarge(usize),

    #[error("uploaded file is empty")]
    Empty,

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Map an accepted image content type to the stored file extension.
fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(dir: PathBuf, max_bytes: usize) -> Self {
        Self { dir, max_bytes }
    }

    /// Validate and persist an uploaded image, returning the stored filename.
    pub async fn store(&self, content_type: &str, data: &[u8]) -> Result<String, UploadError> {
        let ext = extension_for(content_type)
            .ok_or_else(|| UploadError::UnsupportedType(content_type.to_string()))?;

        if data.is_empty() {
            return Err(UploadError::Empty);
        }
        if data.len() > self.max_bytes {
            return Err(UploadError::TooLarge(self.max_bytes));
        }

        fs::create_dir_all(&self.dir).await?;

        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        let path = self.dir.join(&filename);
        fs::write(&path, data).await?;

        debug!(filename, bytes = data.len(), "Stored upload");
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> UploadStore {
        UploadStore::new(dir.path().to_path_buf(), 1024)
    }

    #[tokio::test]
    async fn stores_accepted_image_with_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let name = store.store("image/png", b"fake png bytes").await.unwrap();
        assert!(name.ends_with(".png"));

        let written = tokio::fs::read(dir.path().join(&name)).await.unwrap();
        assert_eq!(written, b"fake png bytes");
    }

    #[tokio::test]
    async fn rejects_disallowed_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let err = store.store("application/pdf", b"%PDF").await.unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn rejects_oversized_and_empty_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let big = vec![0u8; 2048];
        assert!(matches!(
            store.store("image/jpeg", &big).await.unwrap_err(),
            UploadError::TooLarge(1024)
        ));
        assert!(matches!(
            store.store("image/jpeg", b"").await.unwrap_err(),
            UploadError::Empty
        ));
    }
}
