//! Conditional source fetching and error-annotation handling
//!
//! A [`Fetcher`] performs one fetch attempt against one [`Source`]. When
//! the canonical cache file exists, network requests carry an
//! `If-Modified-Since` header built from its modification time so the
//! endpoint may reply "not modified" instead of resending the body.
//!
//! Failed updates are surfaced to the document's consumer through a single
//! reserved annotation line ahead of the usable content:
//!
//! ```text
//! CONFIG_FILE_ERROR="Exception updating config: <one message per failed source>"
//! ```
//!
//! Any annotation already embedded in a document is scrubbed before a
//! fresh body is accepted or a new annotation is prepended, so repeated
//! failures never accumulate duplicate error text.

use crate::cache::CacheFile;
use crate::config::RunConfig;
use crate::error::FetchError;
use crate::source::{Source, SourceKind};
use std::path::Path;
use std::time::{Duration, SystemTime};
use url::Url;

/// Marker carried by the reserved error-annotation line
pub const ANNOTATION_KEY: &str = "CONFIG_FILE_ERROR";

/// RFC-1123 date format used for the `If-Modified-Since` header
const RFC_1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// User agent presented to network sources
const USER_AGENT: &str = concat!("confcache/", env!("CARGO_PKG_VERSION"));

/// Build the single-line error annotation for the given failure messages
///
/// One message per failed source, semicolon-joined, in source order.
#[must_use]
pub fn error_annotation(messages: &[String]) -> String {
    format!(
        "{ANNOTATION_KEY}=\"Exception updating config: {}\"",
        messages.join("; ")
    )
}

/// Drop any embedded annotation line, and the line immediately after it,
/// from a document
///
/// All other bytes pass through unchanged, so scrubbing then re-prepending
/// an identical annotation reproduces the input exactly.
#[must_use]
pub fn scrub_annotations(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut skip_next = false;
    for line in input.split_inclusive('\n') {
        if skip_next {
            skip_next = false;
        } else if line.contains(ANNOTATION_KEY) {
            skip_next = true;
        } else {
            out.push_str(line);
        }
    }
    out
}

/// Where the text of a [`FetchResult`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// Body downloaded from the source
    Fresh,
    /// Source replied 304; the cached copy was reused unchanged
    NotModified,
    /// Every source failed; the stale cache was merged with an annotation
    StaleCache,
    /// Every source failed and no cache existed; the text is the
    /// annotation line alone
    ErrorOnly,
}

/// Outcome of one fetch attempt
#[derive(Debug)]
pub struct FetchResult {
    /// The final document text
    pub text: String,
    /// How the text was obtained
    pub origin: FetchOrigin,
}

impl FetchResult {
    /// Whether the staging file holds this content, ready for promotion
    #[must_use]
    pub fn staged(&self) -> bool {
        !matches!(self.origin, FetchOrigin::ErrorOnly)
    }
}

/// Performs one conditional fetch attempt against one source
#[derive(Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl Fetcher {
    /// Build a fetcher from the run configuration
    ///
    /// The proxy endpoint, when configured, is applied here explicitly;
    /// the fetcher never consults the environment itself.
    ///
    /// # Errors
    ///
    /// [`FetchError::Client`] when the HTTP client cannot be built, for
    /// example from a malformed proxy endpoint.
    pub fn new(config: &RunConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::http(proxy).map_err(FetchError::Client)?);
        }
        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self {
            client,
            request_timeout: config.request_timeout,
        })
    }

    /// Fetch one source, staging usable content for promotion
    ///
    /// On failure of a non-final source the error propagates so the caller
    /// can advance down the list. On failure of the final source
    /// (`last_attempt`), the existing cache is merged with one annotation
    /// line covering `prior_failures` plus this failure and returned as
    /// [`FetchOrigin::StaleCache`]; with no cache present the result is
    /// the annotation alone ([`FetchOrigin::ErrorOnly`]).
    ///
    /// # Errors
    ///
    /// Any [`FetchError`] for non-final sources; for the final source only
    /// when the fallback itself fails (cache unreadable, staging
    /// unwritable).
    pub async fn fetch(
        &self,
        source: &Source,
        cache: &CacheFile,
        last_attempt: bool,
        prior_failures: &[String],
    ) -> Result<FetchResult, FetchError> {
        let attempt = match source.kind() {
            SourceKind::Http(url) => self.fetch_http(url, cache).await,
            SourceKind::File(path) => fetch_file(path, cache),
        };
        match attempt {
            Ok(result) => Ok(result),
            Err(err) if last_attempt => {
                tracing::warn!(
                    source = %source,
                    error = %err,
                    "Final source failed, falling back to the cached copy"
                );
                fall_back(cache, prior_failures, &err)
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_http(&self, url: &Url, cache: &CacheFile) -> Result<FetchResult, FetchError> {
        let mut request = self.client.get(url.clone());
        if cache.exists() {
            // Tell the endpoint when we last got the file; it may elect to
            // reply 304 and save moving the body over the wire.
            if let Ok(modified) = cache.last_modified() {
                request = request.header(reqwest::header::IF_MODIFIED_SINCE, http_date(modified));
            }
        }

        let response = request
            .send()
            .await
            .map_err(|err| self.classify(err, url))?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_MODIFIED {
            tracing::info!(url = %url, "Source reports the cached copy is current");
            let text = cache.read()?;
            cache.write_staging(&text)?;
            return Ok(FetchResult {
                text,
                origin: FetchOrigin::NotModified,
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| self.classify(err, url))?;
        let text = scrub_annotations(&body);
        cache.write_staging(&text)?;
        tracing::info!(url = %url, bytes = text.len(), "Fetched configuration");
        Ok(FetchResult {
            text,
            origin: FetchOrigin::Fresh,
        })
    }

    fn classify(&self, err: reqwest::Error, url: &Url) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.request_timeout,
            }
        } else if err.is_connect() {
            FetchError::Connect {
                url: url.to_string(),
                source: err,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

fn fetch_file(path: &Path, cache: &CacheFile) -> Result<FetchResult, FetchError> {
    let body = std::fs::read_to_string(path).map_err(|source| FetchError::LocalFile {
        path: path.to_path_buf(),
        source,
    })?;
    let text = scrub_annotations(&body);
    cache.write_staging(&text)?;
    tracing::info!(path = %path.display(), bytes = text.len(), "Read local configuration");
    Ok(FetchResult {
        text,
        origin: FetchOrigin::Fresh,
    })
}

fn fall_back(
    cache: &CacheFile,
    prior_failures: &[String],
    err: &FetchError,
) -> Result<FetchResult, FetchError> {
    let mut messages = prior_failures.to_vec();
    messages.push(err.to_string());
    let annotation = error_annotation(&messages);

    if cache.exists() {
        let cached = cache.read()?;
        let text = format!("{annotation}\n\n{}", scrub_annotations(&cached));
        cache.write_staging(&text)?;
        Ok(FetchResult {
            text,
            origin: FetchOrigin::StaleCache,
        })
    } else {
        Ok(FetchResult {
            text: format!("{annotation}\n"),
            origin: FetchOrigin::ErrorOnly,
        })
    }
}

fn http_date(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time)
        .format(RFC_1123_FORMAT)
        .to_string()
}
