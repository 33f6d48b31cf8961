//! Filesystem-backed content service.
//!
//! Stores files under a root directory, addressed by the same
//! `/`-separated relative paths the rest of the crate uses. Base64
//! content is decoded to raw bytes on disk; text content is written
//! as-is.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};

use super::{ContentService, FileModel, HostError, SavePayload};

/// `ContentService` rooted at a local directory.
pub struct LocalContents {
    root: PathBuf,
}

impl LocalContents {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, HostError> {
        // Relative paths only; nothing may escape the root.
        if path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
            return Err(HostError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("path escapes the content root: {path}"),
            )));
        }
        Ok(self.root.join(path))
    }

    fn model_for(&self, path: &str, modified: Option<DateTime<Utc>>) -> FileModel {
        let mut model = FileModel::stub(path);
        model.mimetype = mime_guess::from_path(path).first().map(|m| m.to_string());
        model.last_modified = modified;
        model
    }
}

fn map_io(path: &str, error: std::io::Error) -> HostError {
    if error.kind() == std::io::ErrorKind::NotFound {
        HostError::NotFound(path.to_string())
    } else {
        HostError::Io(error)
    }
}

#[async_trait]
impl ContentService for LocalContents {
    async fn create_untitled(
        &self,
        cwd: &str,
        _content_type: &str,
        ext: &str,
    ) -> Result<FileModel, HostError> {
        let dir = self.resolve(cwd)?;
        tokio::fs::create_dir_all(&dir).await.map_err(HostError::Io)?;

        let mut counter = 0u32;
        loop {
            let file_name = if counter == 0 {
                format!("untitled{ext}")
            } else {
                format!("untitled{counter}{ext}")
            };
            let rel = super::join(cwd, &file_name);
            let abs = self.resolve(&rel)?;
            if !tokio::fs::try_exists(&abs).await.map_err(HostError::Io)? {
                tokio::fs::write(&abs, b"").await.map_err(HostError::Io)?;
                tracing::debug!(path = %rel, "untitled file created");
                return Ok(self.model_for(&rel, Some(Utc::now())));
            }
            counter += 1;
        }
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<FileModel, HostError> {
        let from = self.resolve(old_path)?;
        let to = self.resolve(new_path)?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| map_io(old_path, e))?;
        Ok(self.model_for(new_path, Some(Utc::now())))
    }

    async fn save(&self, path: &str, payload: SavePayload) -> Result<FileModel, HostError> {
        let abs = self.resolve(path)?;
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(HostError::Io)?;
        }

        let bytes = if payload.format == "base64" {
            BASE64.decode(payload.content.as_bytes()).map_err(|e| {
                HostError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid base64 content for {path}: {e}"),
                ))
            })?
        } else {
            payload.content.into_bytes()
        };

        tokio::fs::write(&abs, &bytes)
            .await
            .map_err(|e| map_io(path, e))?;

        let mut model = self.model_for(path, Some(Utc::now()));
        model.content_type = payload.content_type;
        model.format = Some(payload.format);
        model.mimetype = Some(payload.mimetype);
        Ok(model)
    }

    async fn get_metadata(&self, path: &str) -> Result<FileModel, HostError> {
        let abs = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&abs)
            .await
            .map_err(|e| map_io(path, e))?;

        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        Ok(self.model_for(path, modified))
    }
}
