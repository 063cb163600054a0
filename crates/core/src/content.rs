//! On-disk content store.
//!
//! A single flat directory holding one file per cached URL, named by
//! [`file_name_for`]. Missing files are never an error here: callers treat
//! them as cache misses and deletions of absent files as done.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::Error;
use crate::cache::hash::file_name_for;

/// Directory of materialized image files.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Use `root` as the content directory, creating it if absent.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path for a URL. Pure function of the URL and the root.
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.root.join(file_name_for(url))
    }

    /// Whether a regular file exists at `path`.
    pub async fn exists(&self, path: &Path) -> bool {
        matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file())
    }

    /// Size of the file at `path`, 0 when it is missing or unreadable.
    pub async fn size_of(&self, path: &Path) -> u64 {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        }
    }

    /// Delete the file at `path`. Already-absent counts as success.
    pub async fn remove(&self, path: &Path) -> Result<(), Error> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove the whole directory and recreate it empty.
    pub async fn reset(&self) -> Result<(), Error> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}
