//! Configuration sources
//!
//! A source is one entry of the ordered fallback list: either a network
//! endpoint fetched over HTTP(S) or a local file reference. List order
//! defines fallback priority and is immutable for the duration of a run.

use crate::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// One ordered-list entry identifying a location to fetch from
#[derive(Debug, Clone)]
pub struct Source {
    raw: String,
    kind: SourceKind,
}

/// What kind of location a [`Source`] refers to
#[derive(Debug, Clone)]
pub enum SourceKind {
    /// HTTP(S) endpoint fetched over the network
    Http(Url),
    /// Local file reference (`file://` URL or a bare path)
    File(PathBuf),
}

impl Source {
    /// The parsed location
    #[must_use]
    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    /// The source string exactly as given on the command line
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let kind = match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => SourceKind::Http(url),
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|()| {
                    Error::Arguments(format!("invalid file URL in source '{raw}'"))
                })?;
                SourceKind::File(path)
            }
            Ok(url) => {
                return Err(Error::Arguments(format!(
                    "unsupported scheme '{}' in source '{raw}'",
                    url.scheme()
                )));
            }
            // No scheme at all: treat the string as a local path.
            Err(url::ParseError::RelativeUrlWithoutBase) => SourceKind::File(PathBuf::from(raw)),
            Err(err) => {
                return Err(Error::Arguments(format!("invalid source '{raw}': {err}")));
            }
        };
        Ok(Self {
            raw: raw.to_string(),
            kind,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_and_https_sources_parse_as_network_endpoints() {
        for raw in [
            "http://config.example.com/machine.conf",
            "https://config.example.com/machine.conf?pool=a",
        ] {
            let source: Source = raw.parse().unwrap();
            assert!(
                matches!(source.kind(), SourceKind::Http(_)),
                "{raw} should be a network source"
            );
            assert_eq!(source.as_str(), raw);
        }
    }

    #[test]
    fn file_url_parses_as_local_reference() {
        let source: Source = "file:///etc/machine.conf".parse().unwrap();
        match source.kind() {
            SourceKind::File(path) => assert_eq!(path, &PathBuf::from("/etc/machine.conf")),
            other => panic!("expected a file source, got {other:?}"),
        }
    }

    #[test]
    fn bare_path_parses_as_local_reference() {
        let source: Source = "/etc/machine.conf".parse().unwrap();
        assert!(matches!(source.kind(), SourceKind::File(_)));

        let relative: Source = "configs/machine.conf".parse().unwrap();
        assert!(matches!(relative.kind(), SourceKind::File(_)));
    }

    #[test]
    fn unsupported_scheme_is_an_argument_error() {
        let result = "ftp://config.example.com/machine.conf".parse::<Source>();
        match result {
            Err(Error::Arguments(msg)) => assert!(msg.contains("ftp"), "got: {msg}"),
            other => panic!("expected an argument error, got {other:?}"),
        }
    }

    #[test]
    fn display_round_trips_the_original_string() {
        let raw = "https://config.example.com/machine.conf";
        let source: Source = raw.parse().unwrap();
        assert_eq!(source.to_string(), raw);
    }
}
