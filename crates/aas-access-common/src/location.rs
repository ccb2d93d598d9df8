//! Location normalization.
//!
//! Every location a caller passes in (`https://API.example.com/v1`,
//! `api.example.com/v1`, `localhost:8080`) is reduced to a [`LocationKey`]:
//! the lower-cased scheme and host plus an explicit non-default port, as in
//! `https://api.example.com` or `http://localhost:8080`. Credentials are
//! cached per key, so all paths below one server share a header, while the
//! same host reached over `http` and `https` does not.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Scheme assumed when a location is given without one.
const DEFAULT_SCHEME: &str = "https";

/// Normalized cache key for a server location.
///
/// # Examples
///
/// ```
/// use aas_access_common::LocationKey;
///
/// let a = LocationKey::normalize("HTTPS://API.Example.com:443/v1").unwrap();
/// let b = LocationKey::normalize("api.example.com/v2").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "https://api.example.com");
///
/// let plain = LocationKey::normalize("http://api.example.com/v1").unwrap();
/// assert_ne!(a, plain);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationKey(String);

impl LocationKey {
    /// Normalizes a location string into a key.
    ///
    /// Returns `None` for empty or whitespace-only input.
    #[must_use]
    pub fn normalize(location: &str) -> Option<Self> {
        ParsedLocation::parse(location).map(|parsed| parsed.key())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host and optional port, without the scheme.
    #[must_use]
    pub fn authority(&self) -> &str {
        self.0.split_once("://").map_or(&self.0, |(_, rest)| rest)
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LocationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A location split into the parts used for keying and catalog matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLocation {
    /// Lower-cased scheme, `https` when the input had none.
    pub scheme: String,
    /// Lower-cased host.
    pub host: String,
    /// Explicit port, `None` when absent or the scheme default.
    pub port: Option<u16>,
    /// Path without a trailing slash; empty for the root.
    pub path: String,
}

impl ParsedLocation {
    /// Splits a location string.
    ///
    /// Input without `scheme://` is parsed as if it were `https://`. Input
    /// that is not a URL at all falls back to everything before the first `/`
    /// as the host, which lets callers use plain keys such as `my-server`.
    #[must_use]
    pub fn parse(location: &str) -> Option<Self> {
        let trimmed = location.trim();
        if trimmed.is_empty() {
            return None;
        }

        let candidate = if trimmed.contains("://") {
            Cow::Borrowed(trimmed)
        } else {
            Cow::Owned(format!("{DEFAULT_SCHEME}://{trimmed}"))
        };

        if let Ok(url) = Url::parse(&candidate)
            && let Some(host) = url.host_str()
            && !host.is_empty()
        {
            return Some(Self {
                scheme: url.scheme().to_ascii_lowercase(),
                host: host.to_ascii_lowercase(),
                port: url.port(),
                path: normalize_path(url.path()),
            });
        }

        Self::parse_fallback(trimmed)
    }

    fn parse_fallback(trimmed: &str) -> Option<Self> {
        let (scheme, without_scheme) = match trimmed.split_once("://") {
            Some((scheme, rest)) if !scheme.trim().is_empty() => {
                (scheme.trim().to_ascii_lowercase(), rest)
            }
            Some((_, rest)) => (DEFAULT_SCHEME.to_string(), rest),
            None => (DEFAULT_SCHEME.to_string(), trimmed),
        };
        let (host, path) = without_scheme
            .split_once('/')
            .unwrap_or((without_scheme, ""));

        let host = host.trim().to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }

        Some(Self {
            scheme,
            host,
            port: None,
            path: normalize_path(path),
        })
    }

    /// The cache key for this location.
    #[must_use]
    pub fn key(&self) -> LocationKey {
        match self.port {
            Some(port) => LocationKey(format!("{}://{}:{port}", self.scheme, self.host)),
            None => LocationKey(format!("{}://{}", self.scheme, self.host)),
        }
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
