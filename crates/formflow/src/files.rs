//! File storage seam for file-typed fields.
//!
//! The engine only needs `store` and a best-effort `remove` for files whose
//! submission rolled back. [`LocalFileStorage`] keeps uploads on local disk.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use formflow_schema::FileHandle;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// File storage failures. Inside a submission these abort the whole write.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid stored reference '{0}'")]
    InvalidReference(String),

    #[error("{0}")]
    Backend(String),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result of a successful `store`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Opaque handle persisted on the attachment row
    pub reference: String,
    pub size_bytes: u64,
}

/// Where uploaded file bytes go.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Persist the file's bytes and return a handle to them.
    async fn store(&self, file: &FileHandle) -> Result<StoredFile, StorageError>;

    /// Delete a previously stored file. Missing files are not an error.
    async fn remove(&self, reference: &str) -> Result<(), StorageError>;
}

/// Uploads under `<root>/<yyyy>/<mm>/<uuid>-<filename>`.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a stored reference; rejects anything escaping the root.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(reference);
        let safe = !reference.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn store(&self, file: &FileHandle) -> Result<StoredFile, StorageError> {
        let now = Utc::now();
        let reference = format!(
            "{:04}/{:02}/{}-{}",
            now.year(),
            now.month(),
            Uuid::new_v4(),
            sanitize_filename(&file.filename)
        );
        let path = self.resolve(&reference)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        tokio::fs::write(&path, &file.data)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        Ok(StoredFile {
            reference,
            size_bytes: file.data.len() as u64,
        })
    }

    async fn remove(&self, reference: &str) -> Result<(), StorageError> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }
}

/// Keep the last path segment, replacing anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.chars().take(128).collect()
    }
}
