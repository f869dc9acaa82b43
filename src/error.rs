//! Error types for confcache
//!
//! The top-level [`Error`] wraps the domain-specific enums used by the
//! individual components. Failures on non-final sources are recovered by
//! advancing to the next source; failure on the final source is recovered
//! by the cache fallback. Only [`Error::Arguments`] is ever fatal, and only
//! before the fetch algorithm has started.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for confcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for confcache
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid command-line arguments, rejected before any side effects
    #[error("invalid arguments: {0}")]
    Arguments(String),

    /// Directory-lock acquisition or release failed
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// A configuration source could not be fetched
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The cache artifact could not be read, staged, or promoted
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Directory-lock errors
///
/// A timeout is fatal to the caller only when force-acquire is disabled;
/// the orchestrator downgrades acquisition failures to warnings and
/// proceeds unlocked.
#[derive(Debug, Error)]
pub enum LockError {
    /// The caller asked for a zero-length acquisition window
    #[error("invalid lock timeout of {timeout:?} for '{dir}'")]
    InvalidTimeout {
        /// The lock directory the acquisition targeted
        dir: PathBuf,
        /// The rejected timeout value
        timeout: Duration,
    },

    /// `acquire()` was called while this instance already holds the lock
    #[error("lock directory '{dir}' is already held by this process")]
    AlreadyHeld {
        /// The lock directory
        dir: PathBuf,
    },

    /// The acquisition window elapsed and force-acquire was disabled
    #[error("timed out acquiring lock directory '{dir}' after {timeout:?}")]
    Timeout {
        /// The lock directory another process appears to hold
        dir: PathBuf,
        /// How long acquisition was attempted
        timeout: Duration,
    },

    /// `release()` was called without a matching acquire
    #[error("lock directory '{dir}' is not held")]
    NotHeld {
        /// The lock directory
        dir: PathBuf,
    },

    /// The lock directory could not be removed on release
    #[error("failed to remove lock directory '{dir}': {source}")]
    Release {
        /// The lock directory that resisted removal
        dir: PathBuf,
        /// The underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// Unexpected I/O failure creating the lock directory (missing parent,
    /// permissions) — contention is not an error, this is
    #[error("failed to create lock directory '{dir}': {source}")]
    Io {
        /// The lock directory that could not be created
        dir: PathBuf,
        /// The underlying filesystem error
        #[source]
        source: std::io::Error,
    },
}

/// Source-fetch errors
///
/// The Display output of these variants is what lands in the
/// `CONFIG_FILE_ERROR` annotation line, one message per failed source.
/// Authentication failures are not treated specially; they surface as
/// [`FetchError::Status`] like any other non-success reply.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request exceeded the per-request timeout
    #[error("timeout fetching '{url}' (exceeded {timeout:?})")]
    Timeout {
        /// The source URL
        url: String,
        /// The configured per-request timeout
        timeout: Duration,
    },

    /// The TCP/TLS connection to the source failed
    #[error("connection failed for '{url}': {source}")]
    Connect {
        /// The source URL
        url: String,
        /// The underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Any other transport-level failure
    #[error("network error fetching '{url}': {source}")]
    Network {
        /// The source URL
        url: String,
        /// The underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// The source answered with a non-success, non-304 status
    #[error("HTTP status {status} fetching '{url}'")]
    Status {
        /// The reply status code
        status: u16,
        /// The source URL
        url: String,
    },

    /// A local-file source could not be read
    #[error("failed to read local source '{path}': {source}")]
    LocalFile {
        /// The local path the source referred to
        path: PathBuf,
        /// The underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// Building the HTTP client failed (for example a malformed proxy
    /// endpoint)
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Cache-side failure during the conditional or fallback steps
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Cache-artifact errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// The canonical cache file could not be read
    #[error("failed to read cache file '{path}': {source}")]
    Read {
        /// The canonical cache path
        path: PathBuf,
        /// The underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// The staging sibling could not be written
    #[error("failed to write staging file '{path}': {source}")]
    Write {
        /// The staging path
        path: PathBuf,
        /// The underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// Staged content could not be promoted over the canonical path
    #[error("failed to promote '{from}' to '{to}': {source}")]
    Promote {
        /// The staging path holding the complete replacement
        from: PathBuf,
        /// The canonical cache path
        to: PathBuf,
        /// The underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// Cache file metadata (last-modified time) was unavailable
    #[error("failed to read metadata for cache file '{path}': {source}")]
    Metadata {
        /// The canonical cache path
        path: PathBuf,
        /// The underlying filesystem error
        #[source]
        source: std::io::Error,
    },
}
