//! Run configuration for confcache
//!
//! Everything the orchestrator needs is passed in explicitly through
//! [`RunConfig`]; the environment lookups (debug verbosity, proxy
//! endpoint) are pure mapping functions plus thin readers invoked once at
//! startup, never ambient state consulted mid-run.

use crate::source::Source;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Environment variable selecting the debug-logging verbosity
///
/// Recognized values are `"1"` (most verbose) through `"5"` (least);
/// anything else leaves the tool quiet.
pub const DEBUG_ENV_VAR: &str = "CONFCACHE_DEBUG";

/// Proxy environment variables, probed in order; the first set one wins
pub const PROXY_ENV_VARS: [&str; 2] = ["http_proxy", "HTTP_PROXY"];

/// Default per-request timeout for source fetches
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default connect timeout for source fetches
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for one fetch/cache/fallback run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Canonical cache file path
    pub cache_path: PathBuf,

    /// Cache time-to-live; within this window the cached copy is served
    /// without contacting any source
    pub cache_ttl: Duration,

    /// Lock acquisition window before the run proceeds by force
    pub lock_ttl: Duration,

    /// Ordered source list; the first entry is primary, the rest are
    /// fallbacks tried strictly in order
    pub sources: Vec<Source>,

    /// Per-request timeout (default: 15 s)
    pub request_timeout: Duration,

    /// Connect timeout (default: 2 s)
    pub connect_timeout: Duration,

    /// Proxy endpoint for network sources, already scheme-normalized
    pub proxy: Option<String>,
}

impl RunConfig {
    /// Build a config with default timeouts and no proxy
    pub fn new(
        cache_path: impl Into<PathBuf>,
        cache_ttl: Duration,
        lock_ttl: Duration,
        sources: Vec<Source>,
    ) -> Self {
        Self {
            cache_path: cache_path.into(),
            cache_ttl,
            lock_ttl,
            sources,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            proxy: None,
        }
    }
}

/// Map a debug-verbosity value to a tracing level
///
/// Five discrete levels, `"1"` being the most verbose. Absent or
/// unrecognized values return `None`, which callers treat as the quiet
/// default (errors only).
#[must_use]
pub fn debug_level(value: Option<&str>) -> Option<Level> {
    match value? {
        "1" => Some(Level::TRACE),
        "2" => Some(Level::DEBUG),
        "3" => Some(Level::INFO),
        "4" => Some(Level::WARN),
        "5" => Some(Level::ERROR),
        _ => None,
    }
}

/// Read the debug-verbosity level from [`DEBUG_ENV_VAR`]
#[must_use]
pub fn debug_level_from_env() -> Option<Level> {
    debug_level(std::env::var(DEBUG_ENV_VAR).ok().as_deref())
}

/// Prepend a scheme to a proxy endpoint that lacks one
///
/// Endpoints that already carry any scheme pass through unchanged.
#[must_use]
pub fn normalize_proxy(value: &str) -> String {
    if value.contains("://") {
        value.to_string()
    } else {
        format!("http://{value}")
    }
}

/// Read and normalize the proxy endpoint from [`PROXY_ENV_VARS`]
#[must_use]
pub fn proxy_from_env() -> Option<String> {
    PROXY_ENV_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .map(|value| normalize_proxy(&value))
}
