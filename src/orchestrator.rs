//! Drives one fetch/cache/fallback run
//!
//! The orchestrator wires the components together: it serializes against
//! concurrent invocations with the directory lock (best effort only — a
//! lock failure is logged and the run proceeds unlocked), applies the TTL
//! policy, walks the ordered source list, promotes staged content, and
//! composes the final output text. Nothing past argument validation is
//! fatal: every failure collapses into the reserved annotation line, and
//! the canonical cache file survives every failed update untouched.

use crate::cache::CacheFile;
use crate::config::RunConfig;
use crate::fetch::{FetchOrigin, FetchResult, Fetcher, error_annotation, scrub_annotations};
use crate::lock::DirectoryLock;
use std::path::{Path, PathBuf};

/// Execute one run and produce the output text
///
/// The returned text is the configuration document to emit: the freshly
/// fetched body, the TTL-fresh cached copy served verbatim, or the best
/// available fallback carrying a single `CONFIG_FILE_ERROR` line ahead of
/// any usable content.
pub async fn run(config: &RunConfig) -> String {
    let cache = CacheFile::new(&config.cache_path, config.cache_ttl);

    let mut lock = DirectoryLock::new(lock_dir_for(&config.cache_path));
    if let Err(err) = lock.acquire(true, config.lock_ttl).await {
        // Serialization is an aid, not a precondition; proceed unlocked.
        tracing::error!(error = %err, "Proceeding without the directory lock");
    }

    let output = if cache.should_update() {
        update(config, &cache).await
    } else {
        serve_cached(&cache, &[])
    };

    if lock.is_held() {
        if let Err(err) = lock.release(true) {
            tracing::warn!(error = %err, "Failed to release the directory lock");
        }
    }
    output
}

/// The lock directory derived from the cache path: a sibling named
/// `<cachePath>_`
fn lock_dir_for(cache_path: &Path) -> PathBuf {
    let mut os = cache_path.to_path_buf().into_os_string();
    os.push("_");
    PathBuf::from(os)
}

async fn update(config: &RunConfig, cache: &CacheFile) -> String {
    let fetcher = match Fetcher::new(config) {
        Ok(fetcher) => fetcher,
        Err(err) => {
            tracing::error!(error = %err, "Cannot fetch from any source");
            return serve_cached(cache, &[err.to_string()]);
        }
    };

    let mut failures: Vec<String> = Vec::new();
    let total = config.sources.len();
    for (index, source) in config.sources.iter().enumerate() {
        let last_attempt = index + 1 == total;
        tracing::info!(
            source = %source,
            attempt = index + 1,
            total,
            "Fetching configuration"
        );
        match fetcher.fetch(source, cache, last_attempt, &failures).await {
            Ok(result) => {
                if result.staged() {
                    if let Err(err) = cache.promote() {
                        tracing::error!(
                            source = %source,
                            error = %err,
                            "Failed to promote the staged configuration"
                        );
                        failures.push(err.to_string());
                        continue;
                    }
                }
                return compose_output(&failures, result);
            }
            Err(err) => {
                tracing::error!(source = %source, error = %err, "Source failed");
                failures.push(err.to_string());
            }
        }
    }

    // Every source failed and the final fallback was itself unusable:
    // serve whatever cache survives, or the bare annotation.
    serve_cached(cache, &failures)
}

/// Compose the output for a usable fetch result
///
/// Keeps the "exactly one marker line" rule: a fresh or not-modified
/// result after earlier failures gets the accumulated annotation prepended
/// at print time only (the cache holds the clean document), while the
/// fallback origins already carry their merged annotation.
fn compose_output(failures: &[String], result: FetchResult) -> String {
    match result.origin {
        FetchOrigin::Fresh | FetchOrigin::NotModified => {
            if failures.is_empty() {
                result.text
            } else {
                format!("{}\n\n{}", error_annotation(failures), result.text)
            }
        }
        FetchOrigin::StaleCache | FetchOrigin::ErrorOnly => result.text,
    }
}

/// Serve the canonical cache file, degrading to the annotation alone when
/// even that is unavailable
fn serve_cached(cache: &CacheFile, failures: &[String]) -> String {
    if failures.is_empty() {
        // TTL-fresh path: the cached copy is emitted verbatim.
        tracing::info!(path = %cache.path().display(), "Reusing the cached configuration");
        match cache.read() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "Cache file could not be read");
                format!("{}\n", error_annotation(&[err.to_string()]))
            }
        }
    } else if cache.exists() {
        match cache.read() {
            Ok(text) => {
                format!(
                    "{}\n\n{}",
                    error_annotation(failures),
                    scrub_annotations(&text)
                )
            }
            Err(err) => {
                tracing::error!(error = %err, "Cache fallback could not be read");
                let mut all = failures.to_vec();
                all.push(err.to_string());
                format!("{}\n", error_annotation(&all))
            }
        }
    } else {
        format!("{}\n", error_annotation(failures))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);
    const LOCK_TTL: Duration = Duration::from_secs(2);

    fn config_with(
        temp: &TempDir,
        cache_ttl: Duration,
        sources: &[&str],
    ) -> (RunConfig, PathBuf) {
        let cache_path = temp.path().join("machine.conf");
        let sources: Vec<Source> = sources.iter().map(|s| s.parse().unwrap()).collect();
        (
            RunConfig::new(&cache_path, cache_ttl, LOCK_TTL, sources),
            cache_path,
        )
    }

    #[test]
    fn lock_directory_is_the_cache_path_with_a_trailing_underscore() {
        assert_eq!(
            lock_dir_for(Path::new("/var/cache/machine.conf")),
            PathBuf::from("/var/cache/machine.conf_")
        );
    }

    #[tokio::test]
    async fn local_primary_source_populates_the_cache() {
        let temp = TempDir::new().unwrap();
        let primary = temp.path().join("primary.conf");
        fs::write(&primary, "KEY = primary\n").unwrap();
        let (config, cache_path) = config_with(&temp, HOUR, &[primary.to_str().unwrap()]);

        let output = run(&config).await;

        assert_eq!(output, "KEY = primary\n");
        assert_eq!(fs::read_to_string(&cache_path).unwrap(), "KEY = primary\n");
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_sources_entirely() {
        let temp = TempDir::new().unwrap();
        let (config, cache_path) =
            config_with(&temp, HOUR, &[temp.path().join("absent.conf").to_str().unwrap()]);
        fs::write(&cache_path, "KEY = cached\n").unwrap();

        let output = run(&config).await;

        // The only source is unreadable, but within the TTL it is never
        // consulted.
        assert_eq!(output, "KEY = cached\n");
    }

    #[tokio::test]
    async fn failing_primary_with_working_fallback_prepends_one_annotation() {
        let temp = TempDir::new().unwrap();
        let fallback = temp.path().join("fallback.conf");
        fs::write(&fallback, "KEY = fallback\n").unwrap();
        let missing = temp.path().join("missing.conf");
        let (config, cache_path) = config_with(
            &temp,
            Duration::ZERO,
            &[missing.to_str().unwrap(), fallback.to_str().unwrap()],
        );

        let output = run(&config).await;

        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("CONFIG_FILE_ERROR=\"Exception updating config: "));
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "KEY = fallback");
        // The cache holds the clean document, not the annotation.
        assert_eq!(fs::read_to_string(&cache_path).unwrap(), "KEY = fallback\n");
    }

    #[tokio::test]
    async fn all_sources_failing_with_no_cache_emits_the_annotation_only() {
        let temp = TempDir::new().unwrap();
        let missing_a = temp.path().join("a.conf");
        let missing_b = temp.path().join("b.conf");
        let (config, cache_path) = config_with(
            &temp,
            Duration::ZERO,
            &[missing_a.to_str().unwrap(), missing_b.to_str().unwrap()],
        );

        let output = run(&config).await;

        assert!(output.starts_with("CONFIG_FILE_ERROR=\"Exception updating config: "));
        assert!(output.contains("a.conf"));
        assert!(output.contains("; "), "both failures, semicolon-joined");
        assert!(output.contains("b.conf"));
        assert_eq!(output.lines().count(), 1);
        assert!(!cache_path.exists(), "no cache file may be created");
    }

    #[tokio::test]
    async fn all_sources_failing_with_a_cache_serves_the_stale_copy() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.conf");
        let (config, cache_path) = config_with(&temp, Duration::ZERO, &[missing.to_str().unwrap()]);
        fs::write(&cache_path, "KEY = stale\n").unwrap();

        let output = run(&config).await;

        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("CONFIG_FILE_ERROR=\""));
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "KEY = stale");
        // The merged result was promoted, so the cache now embeds the
        // annotation as well.
        assert_eq!(fs::read_to_string(&cache_path).unwrap(), output);
    }

    #[tokio::test]
    async fn lock_directory_is_removed_after_the_run() {
        let temp = TempDir::new().unwrap();
        let primary = temp.path().join("primary.conf");
        fs::write(&primary, "KEY = primary\n").unwrap();
        let (config, cache_path) = config_with(&temp, HOUR, &[primary.to_str().unwrap()]);

        let _ = run(&config).await;

        assert!(!lock_dir_for(&cache_path).exists());
    }

    #[test]
    fn compose_output_with_failures_prepends_the_annotation_once() {
        let result = FetchResult {
            text: "KEY = value\n".to_string(),
            origin: FetchOrigin::Fresh,
        };
        let failures = vec!["first failed".to_string()];

        let output = compose_output(&failures, result);

        assert_eq!(
            output,
            "CONFIG_FILE_ERROR=\"Exception updating config: first failed\"\n\nKEY = value\n"
        );
    }

    #[test]
    fn compose_output_without_failures_is_the_document_alone() {
        let result = FetchResult {
            text: "KEY = value\n".to_string(),
            origin: FetchOrigin::NotModified,
        };
        assert_eq!(compose_output(&[], result), "KEY = value\n");
    }
}
