// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blob storage for definitions, rundefs, console logs, and artifacts.
//!
//! Keys follow `<project>/<build>/<run>/<path>`. The backend is treated as
//! synchronous; transient failures are retried with a short bounded backoff
//! before surfacing as [`BlobError::Unavailable`].

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Retry ladder for transient backend failures. The final `None` means
/// "give up and surface the error".
const RETRY_BACKOFF: [Option<Duration>; 4] = [
    Some(Duration::from_millis(100)),
    Some(Duration::from_millis(500)),
    Some(Duration::from_secs(1)),
    None,
];

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("blob storage unavailable: {0}")]
    Unavailable(std::io::Error),
    #[error("blob io: {0}")]
    Io(#[from] std::io::Error),
}

/// One artifact row in a listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub size_bytes: u64,
}

/// Narrow contract over the artifact backend (object store or filesystem).
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, contents: &[u8]) -> Result<(), BlobError>;
    fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;
    /// Append to a console log; creates the blob when absent.
    fn append(&self, key: &str, contents: &[u8]) -> Result<(), BlobError>;
    /// Artifacts under `<prefix>/`, excluding the internal `.rundef.json`.
    fn list(&self, prefix: &str) -> Result<Vec<ArtifactEntry>, BlobError>;
    fn delete_prefix(&self, prefix: &str) -> Result<(), BlobError>;
}

/// Filesystem-rooted blob store.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn with_retry<T>(
        &self,
        mut op: impl FnMut() -> Result<T, std::io::Error>,
    ) -> Result<T, BlobError> {
        for backoff in RETRY_BACKOFF {
            match op() {
                Ok(v) => return Ok(v),
                // Interrupted is the transient class a filesystem backend
                // can hit; anything else fails fast.
                Err(e) if e.kind() == ErrorKind::Interrupted => match backoff {
                    Some(delay) => {
                        tracing::info!(?delay, "blob backend unavailable, retrying");
                        std::thread::sleep(delay);
                    }
                    None => return Err(BlobError::Unavailable(e)),
                },
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("retry ladder always terminates with None")
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, key: &str, contents: &[u8]) -> Result<(), BlobError> {
        let path = self.path_for(key);
        self.with_retry(|| {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, contents)
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn append(&self, key: &str, contents: &[u8]) -> Result<(), BlobError> {
        let path = self.path_for(key);
        self.with_retry(|| {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut f = fs::OpenOptions::new().create(true).append(true).open(&path)?;
            f.write_all(contents)
        })
    }

    fn list(&self, prefix: &str) -> Result<Vec<ArtifactEntry>, BlobError> {
        let dir = self.path_for(prefix);
        let mut entries = Vec::new();
        let read = match fs::read_dir(&dir) {
            Ok(r) => r,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        let mut stack: Vec<(PathBuf, String)> = Vec::new();
        for entry in read {
            let entry = entry?;
            stack.push((entry.path(), entry.file_name().to_string_lossy().to_string()));
        }
        while let Some((path, name)) = stack.pop() {
            if path.is_dir() {
                for entry in fs::read_dir(&path)? {
                    let entry = entry?;
                    let child = format!("{name}/{}", entry.file_name().to_string_lossy());
                    stack.push((entry.path(), child));
                }
            } else {
                if name.ends_with(".rundef.json") {
                    continue;
                }
                let size_bytes = fs::metadata(&path)?.len();
                entries.push(ArtifactEntry { name, size_bytes });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<(), BlobError> {
        let dir = self.path_for(prefix);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "blob_tests.rs"]
mod tests;
