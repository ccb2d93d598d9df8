//! Known endpoint descriptions and location matching.
//!
//! The host application supplies an [`EndpointCatalog`] listing the AAS
//! servers it knows about together with the kind of credential each one
//! expects. The catalog is read-only; replacing it means building a new one.
//!
//! ## Pattern syntax
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `api.example.com` | any port and path on that host |
//! | `api.example.com:8443` | only that port |
//! | `api.example.com/v2` | paths `/v2` and `/v2/...` |
//! | `*.example.com` | any strict subdomain of `example.com` |
//!
//! When several patterns match, the most specific one wins: an exact host
//! beats a wildcard, then a longer host, then an explicit port, then a longer
//! path prefix. Equally specific patterns are resolved by catalog order.
//!
//! ## Example TOML
//!
//! ```toml
//! [[endpoints]]
//! location = "api.example.com"
//! credential_hint = "bearer"
//! name = "Example repository"
//! token_env = "EXAMPLE_TOKEN"
//!
//! [[endpoints]]
//! location = "*.factory.local"
//! credential_hint = "basic"
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::header::CredentialHint;
use crate::location::ParsedLocation;

/// Describes one known server and the credential it expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct EndpointDescription {
    /// Location pattern (see the module docs for the syntax).
    #[builder(setter(into))]
    pub location: String,
    /// Kind of credential the server expects.
    #[serde(default)]
    #[builder(default)]
    pub credential_hint: CredentialHint,
    /// Human-readable name shown when prompting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub name: Option<String>,
    /// Overrides the header name implied by `credential_hint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub header_name: Option<String>,
    /// Environment variable holding the credential, for environment-based resolvers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub token_env: Option<String>,
}

impl EndpointDescription {
    /// The header name credentials for this endpoint are sent in.
    #[must_use]
    pub fn header_name(&self) -> &str {
        self.header_name
            .as_deref()
            .unwrap_or_else(|| self.credential_hint.default_header_name())
    }

    /// The name to show a user, falling back to the location pattern.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    /// Suffix including the leading dot, e.g. `.example.com`.
    Subdomain(String),
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    host: HostPattern,
    port: Option<u16>,
    path_prefix: String,
}

/// Ordering key for "most specific pattern wins".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Specificity {
    exact_host: bool,
    host_len: usize,
    has_port: bool,
    path_len: usize,
}

impl CompiledPattern {
    fn compile(pattern: &str) -> Option<Self> {
        let trimmed = pattern.trim();
        let (wildcard, rest) = trimmed
            .strip_prefix("*.")
            .map_or((false, trimmed), |rest| (true, rest));

        let parsed = ParsedLocation::parse(rest)?;
        let host = if wildcard {
            HostPattern::Subdomain(format!(".{}", parsed.host))
        } else {
            HostPattern::Exact(parsed.host)
        };

        Some(Self {
            host,
            port: parsed.port,
            path_prefix: parsed.path,
        })
    }

    fn matches(&self, location: &ParsedLocation) -> bool {
        let host_ok = match &self.host {
            HostPattern::Exact(host) => *host == location.host,
            HostPattern::Subdomain(suffix) => {
                location.host.len() > suffix.len() && location.host.ends_with(suffix.as_str())
            }
        };
        if !host_ok {
            return false;
        }

        if self.port.is_some() && self.port != location.port {
            return false;
        }

        path_has_prefix(&location.path, &self.path_prefix)
    }

    /// Whether some location matches both patterns through different path
    /// prefixes, so that both resolve into the same cache entry.
    fn shares_key_with(&self, other: &Self) -> bool {
        let ports_overlap = self.port.is_none() || other.port.is_none() || self.port == other.port;
        self.host == other.host && ports_overlap && self.path_prefix != other.path_prefix
    }

    fn specificity(&self) -> Specificity {
        let (exact_host, host_len) = match &self.host {
            HostPattern::Exact(host) => (true, host.len()),
            HostPattern::Subdomain(suffix) => (false, suffix.len()),
        };
        Specificity {
            exact_host,
            host_len,
            has_port: self.port.is_some(),
            path_len: self.path_prefix.len(),
        }
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Ordered, read-only collection of known endpoints.
#[derive(Debug, Clone, Default)]
pub struct EndpointCatalog {
    entries: Vec<(Option<CompiledPattern>, EndpointDescription)>,
}

impl EndpointCatalog {
    /// Builds a catalog; entry order is the tie-break order for matching.
    ///
    /// Descriptions whose pattern cannot be parsed are kept for listing but
    /// never match.
    #[must_use]
    pub fn new(endpoints: Vec<EndpointDescription>) -> Self {
        let entries = endpoints
            .into_iter()
            .map(|endpoint| (CompiledPattern::compile(&endpoint.location), endpoint))
            .collect();
        Self { entries }
    }

    /// Finds the most specific endpoint for a location.
    ///
    /// # Examples
    ///
    /// ```
    /// use aas_access_common::{CredentialHint, EndpointCatalog, EndpointDescription};
    ///
    /// let catalog = EndpointCatalog::new(vec![
    ///     EndpointDescription::builder()
    ///         .location("api.example.com")
    ///         .credential_hint(CredentialHint::Bearer)
    ///         .build(),
    /// ]);
    ///
    /// let found = catalog.match_location("https://api.example.com/v1").unwrap();
    /// assert_eq!(found.credential_hint, CredentialHint::Bearer);
    /// assert!(catalog.match_location("other.example.com").is_none());
    /// ```
    #[must_use]
    pub fn match_location(&self, location: &str) -> Option<&EndpointDescription> {
        let parsed = ParsedLocation::parse(location)?;

        let mut best: Option<(Specificity, &EndpointDescription)> = None;
        for (pattern, endpoint) in &self.entries {
            let Some(pattern) = pattern else { continue };
            if !pattern.matches(&parsed) {
                continue;
            }
            let specificity = pattern.specificity();
            // Strictly greater: earlier entries win ties.
            if best.is_none_or(|(current, _)| specificity > current) {
                best = Some((specificity, endpoint));
            }
        }

        best.map(|(_, endpoint)| endpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointDescription> {
        self.entries.iter().map(|(_, endpoint)| endpoint)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<EndpointDescription> for EndpointCatalog {
    fn from_iter<T: IntoIterator<Item = EndpointDescription>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// On-disk form of a catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    /// Known endpoints in priority order.
    #[serde(default)]
    pub endpoints: Vec<EndpointDescription>,
}

impl CatalogFile {
    /// Load a catalog from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: Self = serde_yaml::from_str(&contents)?;
        file.validate()?;
        Ok(file)
    }

    /// Load a catalog from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&contents)?;
        file.validate()?;
        Ok(file)
    }

    /// Load a catalog from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: Self = toml::from_str(&contents)?;
        file.validate()?;
        Ok(file)
    }

    /// Load from file based on extension
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or has an unsupported extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            Some("toml") => Self::from_toml_file(path),
            _ => Err(anyhow::anyhow!(
                "Unsupported catalog file format. Use .yaml, .yml, .json, or .toml"
            )),
        }
    }

    /// Validates the endpoint list.
    ///
    /// # Errors
    ///
    /// Returns an error if a location pattern is empty, unparseable or duplicated.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_endpoints(&self.endpoints)
    }

    #[must_use]
    pub fn into_catalog(self) -> EndpointCatalog {
        EndpointCatalog::new(self.endpoints)
    }
}

/// Checks a list of endpoint descriptions for unusable or duplicate patterns.
///
/// Credentials are cached per scheme, host and port, never per path. Two
/// patterns that differ only in their path prefix therefore share one cache
/// entry, and must agree on the credential they ask for.
///
/// # Errors
///
/// Returns an error naming the first offending pattern.
pub fn validate_endpoints(endpoints: &[EndpointDescription]) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    let mut compiled: Vec<(CompiledPattern, &EndpointDescription)> = Vec::new();
    for endpoint in endpoints {
        let pattern = endpoint.location.trim();
        if pattern.is_empty() {
            anyhow::bail!("Endpoint with empty location pattern");
        }
        let Some(current) = CompiledPattern::compile(pattern) else {
            anyhow::bail!("Invalid location pattern: {pattern}");
        };
        if !seen.insert(pattern.to_ascii_lowercase()) {
            anyhow::bail!("Duplicate location pattern: {pattern}");
        }
        if let Some((_, other)) = compiled.iter().find(|(earlier, other)| {
            earlier.shares_key_with(&current) && !same_credential(other, endpoint)
        }) {
            anyhow::bail!(
                "Location patterns {} and {pattern} share a server but ask for different credentials",
                other.location.trim()
            );
        }
        compiled.push((current, endpoint));
    }
    Ok(())
}

fn same_credential(a: &EndpointDescription, b: &EndpointDescription) -> bool {
    a.credential_hint == b.credential_hint
        && a.header_name() == b.header_name()
        && a.token_env == b.token_env
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use super::*;

    fn endpoint(location: &str, hint: CredentialHint) -> EndpointDescription {
        EndpointDescription::builder()
            .location(location)
            .credential_hint(hint)
            .build()
    }

    #[test]
    fn test_exact_host_matches_any_path() {
        let catalog = EndpointCatalog::new(vec![endpoint("api.example.com", CredentialHint::Bearer)]);

        assert!(catalog.match_location("api.example.com").is_some());
        assert!(catalog.match_location("api.example.com/v1/shells").is_some());
        assert!(catalog.match_location("https://API.EXAMPLE.COM:8443/").is_some());
        assert!(catalog.match_location("example.com").is_none());
    }

    #[test]
    fn test_host_boundary_respected() {
        let catalog = EndpointCatalog::new(vec![endpoint("api.example.com", CredentialHint::Bearer)]);

        assert!(catalog.match_location("api.example.com.evil.org").is_none());
        assert!(catalog.match_location("xapi.example.com").is_none());
    }

    #[test]
    fn test_path_prefix_on_segment_boundary() {
        let catalog = EndpointCatalog::new(vec![endpoint("api.example.com/v2", CredentialHint::Basic)]);

        assert!(catalog.match_location("api.example.com/v2").is_some());
        assert!(catalog.match_location("api.example.com/v2/shells").is_some());
        assert!(catalog.match_location("api.example.com/v20").is_none());
        assert!(catalog.match_location("api.example.com").is_none());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let catalog = EndpointCatalog::new(vec![
            endpoint("api.example.com", CredentialHint::Bearer),
            endpoint("api.example.com/legacy", CredentialHint::Basic),
        ]);

        let found = catalog.match_location("api.example.com/legacy/shells").unwrap();
        assert_eq!(found.credential_hint, CredentialHint::Basic);

        let found = catalog.match_location("api.example.com/shells").unwrap();
        assert_eq!(found.credential_hint, CredentialHint::Bearer);
    }

    #[test]
    fn test_exact_beats_wildcard() {
        let catalog = EndpointCatalog::new(vec![
            endpoint("*.example.com", CredentialHint::Basic),
            endpoint("api.example.com", CredentialHint::Bearer),
        ]);

        let found = catalog.match_location("api.example.com").unwrap();
        assert_eq!(found.credential_hint, CredentialHint::Bearer);

        let found = catalog.match_location("repo.example.com").unwrap();
        assert_eq!(found.credential_hint, CredentialHint::Basic);
    }

    #[test]
    fn test_wildcard_requires_subdomain() {
        let catalog = EndpointCatalog::new(vec![endpoint("*.example.com", CredentialHint::Basic)]);

        assert!(catalog.match_location("a.b.example.com").is_some());
        assert!(catalog.match_location("example.com").is_none());
        assert!(catalog.match_location("badexample.com").is_none());
    }

    #[test]
    fn test_port_pattern() {
        let catalog = EndpointCatalog::new(vec![
            endpoint("aas.local", CredentialHint::None),
            endpoint("aas.local:5001", CredentialHint::ApiKey),
        ]);

        let found = catalog.match_location("http://aas.local:5001/shells").unwrap();
        assert_eq!(found.credential_hint, CredentialHint::ApiKey);

        let found = catalog.match_location("http://aas.local:5002").unwrap();
        assert_eq!(found.credential_hint, CredentialHint::None);
    }

    #[test]
    fn test_equal_specificity_first_wins() {
        let first = EndpointDescription::builder()
            .location("api.example.com")
            .name("first")
            .build();
        let second = EndpointDescription::builder()
            .location("API.example.com")
            .name("second")
            .build();
        let catalog = EndpointCatalog::new(vec![first, second]);

        let found = catalog.match_location("api.example.com").unwrap();
        assert_eq!(found.display_name(), "first");
    }

    #[test]
    fn test_header_name_override() {
        let plain = endpoint("a", CredentialHint::ApiKey);
        assert_eq!(plain.header_name(), "X-API-Key");

        let custom = EndpointDescription::builder()
            .location("a")
            .credential_hint(CredentialHint::ApiKey)
            .header_name("X-Registry-Key")
            .build();
        assert_eq!(custom.header_name(), "X-Registry-Key");
    }

    #[test]
    fn test_empty_location_never_matches() {
        let catalog = EndpointCatalog::new(vec![endpoint("api.example.com", CredentialHint::Bearer)]);
        assert!(catalog.match_location("").is_none());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let file = CatalogFile {
            endpoints: vec![
                endpoint("api.example.com", CredentialHint::Bearer),
                endpoint("API.example.com", CredentialHint::Basic),
            ],
        };
        assert!(file.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_conflicting_path_prefixes() {
        let file = CatalogFile {
            endpoints: vec![
                endpoint("api.example.com", CredentialHint::Bearer),
                endpoint("api.example.com/legacy", CredentialHint::Basic),
            ],
        };
        let err = file.validate().unwrap_err().to_string();
        assert!(err.contains("api.example.com/legacy"));

        let wildcard = CatalogFile {
            endpoints: vec![
                endpoint("*.example.org/v1", CredentialHint::ApiKey),
                endpoint("*.example.org:8443", CredentialHint::Bearer),
            ],
        };
        assert!(wildcard.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_consistent_path_prefixes() {
        let file = CatalogFile {
            endpoints: vec![
                endpoint("api.example.com", CredentialHint::Bearer),
                endpoint("api.example.com/v2", CredentialHint::Bearer),
                endpoint("api.example.com:8443/legacy", CredentialHint::Bearer),
                endpoint("*.example.com/legacy", CredentialHint::ApiKey),
                endpoint("other.example.com:9443/legacy", CredentialHint::Basic),
                endpoint("other.example.com:8443", CredentialHint::ApiKey),
            ],
        };
        assert!(file.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_pattern() {
        let file = CatalogFile {
            endpoints: vec![endpoint("  ", CredentialHint::Bearer)],
        };
        assert!(file.validate().is_err());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[[endpoints]]
location = "api.example.com"
credential_hint = "bearer"
token_env = "EXAMPLE_TOKEN"

[[endpoints]]
location = "*.factory.local"
"#
        )
        .unwrap();

        let loaded = CatalogFile::from_file(file.path()).unwrap();
        assert_eq!(loaded.endpoints.len(), 2);
        assert_eq!(loaded.endpoints[0].token_env.as_deref(), Some("EXAMPLE_TOKEN"));
        assert_eq!(loaded.endpoints[1].credential_hint, CredentialHint::None);

        let catalog = loaded.into_catalog();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "endpoints:\n  - location: repo.example.com/v3\n    credential_hint: api_key\n    header_name: X-Repo-Key\n"
        )
        .unwrap();

        let loaded = CatalogFile::from_file(file.path()).unwrap();
        assert_eq!(loaded.endpoints[0].header_name(), "X-Repo-Key");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(CatalogFile::from_file(file.path()).is_err());
    }
}
