//! # confcache
//!
//! TTL-cached configuration fetching with ordered source fallback.
//!
//! confcache pulls a configuration document from the first reachable entry
//! of an ordered source list, caches it on disk with a time-to-live, and
//! guarantees that a previously valid configuration remains available even
//! when every source is unreachable. It runs as a single invocation — no
//! daemon, no polling loop — on machines whose configuration must refresh
//! periodically without ever going config-less.
//!
//! ## Design Philosophy
//!
//! - **Never config-less** - the canonical cache file is only ever replaced
//!   by a complete, successful update, so the last-known-good document
//!   always survives
//! - **Liveness over strict exclusion** - the cross-process lock polls with
//!   jitter and force-acquires after a bounded wait rather than blocking
//!   forever
//! - **One marker line** - every failed update collapses into a single
//!   reserved `CONFIG_FILE_ERROR` annotation ahead of the usable content
//! - **Library-first** - the CLI is a thin wrapper; all behavior is
//!   embeddable
//!
//! ## Quick Start
//!
//! ```no_run
//! use confcache::{RunConfig, Source};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sources: Vec<Source> = vec![
//!         "https://config.example.com/machine.conf".parse()?,
//!         "file:///etc/machine.conf.dist".parse()?,
//!     ];
//!     let config = RunConfig::new(
//!         "/var/cache/machine.conf",
//!         Duration::from_secs(300),
//!         Duration::from_secs(30),
//!         sources,
//!     );
//!
//!     let output = confcache::run(&config).await;
//!     print!("{output}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Cache artifact and staleness policy
pub mod cache;
/// Run configuration and environment plumbing
pub mod config;
/// Error types
pub mod error;
/// Conditional fetching and annotation handling
pub mod fetch;
/// Directory-based cross-process locking
pub mod lock;
/// Fetch orchestration
pub mod orchestrator;
/// Configuration sources
pub mod source;

// Re-export commonly used types
pub use cache::CacheFile;
pub use config::RunConfig;
pub use error::{CacheError, Error, FetchError, LockError, Result};
pub use fetch::{ANNOTATION_KEY, FetchOrigin, FetchResult, Fetcher, error_annotation, scrub_annotations};
pub use lock::{Acquisition, DirectoryLock};
pub use orchestrator::run;
pub use source::{Source, SourceKind};
