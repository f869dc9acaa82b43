//! The on-disk cache artifact and its staleness policy
//!
//! A [`CacheFile`] pairs the canonical cache path with a uniquely named
//! staging sibling. All writes land in the staging file first and reach
//! the canonical path only through [`CacheFile::promote`], a single rename.
//! The canonical file therefore always holds a complete, previously-valid
//! document: it is never observed partially written and never deleted by a
//! failed update, so the machine never loses its last-known-good
//! configuration.

use crate::error::CacheError;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// The cached configuration document on disk
///
/// The staging path is generated once at construction from a randomized
/// suffix. Collisions between concurrent invocations are negligible but
/// not eliminated, which is acceptable for single-run use; contention
/// exists only on the final promotion, where the last writer wins.
#[derive(Debug)]
pub struct CacheFile {
    path: PathBuf,
    ttl: Duration,
    temp_path: PathBuf,
}

impl CacheFile {
    /// Create the artifact for `path` with the given time-to-live
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let path = path.into();
        let suffix: u32 = rand::random();
        let temp_path = {
            let mut os = path.clone().into_os_string();
            os.push(format!(".{suffix:08x}"));
            PathBuf::from(os)
        };
        tracing::debug!(
            path = %path.display(),
            staging = %temp_path.display(),
            "Created cache artifact"
        );
        Self {
            path,
            ttl,
            temp_path,
        }
    }

    /// The canonical cache path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The staging sibling path; stable for the lifetime of this object
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// The configured time-to-live
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether the canonical cache file exists on disk
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// The canonical file's last-modified timestamp
    ///
    /// # Errors
    ///
    /// [`CacheError::Metadata`] when the file is absent or its metadata
    /// cannot be read.
    pub fn last_modified(&self) -> Result<SystemTime, CacheError> {
        std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|source| CacheError::Metadata {
                path: self.path.clone(),
                source,
            })
    }

    /// Whether a refresh should be attempted
    ///
    /// Returns `false` (serve the cached copy) only when the canonical
    /// file exists and its age is within the TTL. A file whose metadata
    /// cannot be read counts as stale; a modification time in the future
    /// counts as fresh.
    #[must_use]
    pub fn should_update(&self) -> bool {
        let modified = match self.last_modified() {
            Ok(modified) => modified,
            Err(err) => {
                tracing::info!(
                    path = %self.path.display(),
                    error = %err,
                    "Cache file absent or unreadable, update needed"
                );
                return true;
            }
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) if age < self.ttl => {
                tracing::info!(
                    path = %self.path.display(),
                    age_secs = age.as_secs(),
                    ttl_secs = self.ttl.as_secs(),
                    "Cache file within TTL, reusable"
                );
                false
            }
            Ok(age) => {
                tracing::info!(
                    path = %self.path.display(),
                    age_secs = age.as_secs(),
                    ttl_secs = self.ttl.as_secs(),
                    "Cache file expired, update needed"
                );
                true
            }
            // Clock skew put the mtime in the future; treat as fresh.
            Err(_) => false,
        }
    }

    /// Read the canonical cache file
    ///
    /// # Errors
    ///
    /// [`CacheError::Read`] when the file is absent or unreadable.
    pub fn read(&self) -> Result<String, CacheError> {
        std::fs::read_to_string(&self.path).map_err(|source| CacheError::Read {
            path: self.path.clone(),
            source,
        })
    }

    /// Write `contents` to the staging sibling, replacing any prior staging
    ///
    /// # Errors
    ///
    /// [`CacheError::Write`] when the staging file cannot be written.
    pub fn write_staging(&self, contents: &str) -> Result<(), CacheError> {
        std::fs::write(&self.temp_path, contents).map_err(|source| CacheError::Write {
            path: self.temp_path.clone(),
            source,
        })
    }

    /// Atomically promote the staged content over the canonical path
    ///
    /// The canonical file is only ever replaced by a completed staging
    /// file, never edited in place. Promotion also restarts the TTL
    /// window, since the canonical file's modification time is renewed.
    ///
    /// # Errors
    ///
    /// [`CacheError::Promote`] when the rename fails (for example nothing
    /// was staged).
    pub fn promote(&self) -> Result<(), CacheError> {
        std::fs::rename(&self.temp_path, &self.path).map_err(|source| CacheError::Promote {
            from: self.temp_path.clone(),
            to: self.path.clone(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), "Promoted staged configuration");
        Ok(())
    }
}

impl Drop for CacheFile {
    /// Clean up an abandoned partial write
    fn drop(&mut self) {
        if self.temp_path.is_file() {
            if let Err(err) = std::fs::remove_file(&self.temp_path) {
                tracing::warn!(
                    staging = %self.temp_path.display(),
                    error = %err,
                    "Failed to remove staging file on drop"
                );
            }
        }
    }
}
