//! confcache command-line entry point
//!
//! `confcache <cacheFilePath> <cacheTtlSeconds> <lockTtlSeconds> <source1>
//! [source2 ...]`
//!
//! Misuse with too few arguments prints the usage block as valid
//! configuration-attribute lines and exits 0, so a downstream configuration
//! parser consuming stdout is never corrupted by it. Malformed arguments
//! exit 1 before any side effects. Every run that reaches the fetch
//! algorithm exits 0, including soft-failure runs served from the stale
//! cache.

use confcache::config::{self, RunConfig};
use confcache::error::Error;
use confcache::source::Source;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Pause before emitting the final text when a debug level is active, so
/// an operator can read the log stream first
const INSPECTION_DELAY: Duration = Duration::from_secs(5);

fn print_usage() {
    println!("APPLICATION = \"confcache v{}\"", env!("CARGO_PKG_VERSION"));
    println!("ARGUMENTS = \"confcache CACHE CACHE_TTL LOCK_TTL URL1 [URL2 ...]\"");
}

fn parse_seconds(value: &str, what: &str) -> Result<Duration, Error> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| Error::Arguments(format!("invalid {what} '{value}': expected whole seconds")))
}

fn parse_args(args: &[String]) -> Result<RunConfig, Error> {
    let cache_path = PathBuf::from(&args[0]);
    let cache_ttl = parse_seconds(&args[1], "cache TTL")?;
    let lock_ttl = parse_seconds(&args[2], "lock TTL")?;
    let sources = args[3..]
        .iter()
        .map(|raw| raw.parse::<Source>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut run_config = RunConfig::new(cache_path, cache_ttl, lock_ttl, sources);
    run_config.proxy = config::proxy_from_env();
    Ok(run_config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let debug_level = config::debug_level_from_env();
    tracing_subscriber::fmt()
        .with_max_level(debug_level.unwrap_or(tracing::Level::ERROR))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let run_config = match parse_args(&args) {
        Ok(run_config) => run_config,
        Err(err) => {
            tracing::error!(error = %err, "Error parsing arguments");
            return ExitCode::FAILURE;
        }
    };

    let output = confcache::run(&run_config).await;

    if debug_level.is_some() {
        tokio::time::sleep(INSPECTION_DELAY).await;
    }
    print!("{output}");
    ExitCode::SUCCESS
}
