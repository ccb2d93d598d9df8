//! CLI configuration.
//!
//! Configuration is loaded from `~/.config/aas-access/config.toml`.
//!
//! ## Example Configuration
//!
//! ```toml
//! [settings]
//! ask_for_unknown = false
//! absent_ttl_secs = 600
//! resolver_timeout_secs = 120
//! store_path = "/home/me/.local/share/aas-access/credentials.json"
//!
//! [[endpoints]]
//! location = "api.example.com"
//! credential_hint = "bearer"
//! name = "Example AAS repository"
//! token_env = "EXAMPLE_TOKEN"
//!
//! [[endpoints]]
//! location = "*.factory.local:8081"
//! credential_hint = "basic"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use aas_access::{
    AccessError, CoordinatorSettings, EndpointCatalog, EndpointDescription, Result,
    validate_endpoints,
};

/// CLI configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub settings: Settings,

    /// Known endpoints, in matching order
    #[serde(default)]
    pub endpoints: Vec<EndpointDescription>,
}

/// Optional settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Resolve locations that match no endpoint (default: false)
    #[serde(default)]
    pub ask_for_unknown: bool,

    /// Seconds a declined credential is remembered (default: session)
    #[serde(default)]
    pub absent_ttl_secs: Option<u64>,

    /// Seconds a single resolution may take (default: unbounded)
    #[serde(default)]
    pub resolver_timeout_secs: Option<u64>,

    /// Credential file; persistence is disabled when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl Settings {
    #[must_use]
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            absent_ttl: self.absent_ttl_secs.map(Duration::from_secs),
            resolver_timeout: self.resolver_timeout_secs.map(Duration::from_secs),
        }
    }
}

impl AccessConfig {
    /// Loads configuration from the default location.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config directory cannot be determined
    /// - The file cannot be read or parsed
    /// - Validation fails
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        Self::from_path(&path)
    }

    /// Loads configuration from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, malformed or invalid.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            AccessError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| AccessError::Config(format!("Failed to parse {}: {e}", path.display())))?;
        config.validate()?;

        debug!(
            path = %path.display(),
            endpoints = config.endpoints.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Returns the default configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AccessError::Config("Failed to determine config directory".to_string()))?
            .join("aas-access");

        Ok(config_dir.join("config.toml"))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An endpoint location is empty or duplicated
    /// - A timeout of zero seconds is configured
    pub fn validate(&self) -> Result<()> {
        validate_endpoints(&self.endpoints).map_err(|e| AccessError::Config(e.to_string()))?;

        if self.settings.resolver_timeout_secs == Some(0) {
            return Err(AccessError::Config(
                "resolver_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn catalog(&self) -> EndpointCatalog {
        EndpointCatalog::new(self.endpoints.clone())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use aas_access::CredentialHint;
    use tempfile::TempDir;

    use super::*;

    fn sample_config_toml() -> &'static str {
        r#"
[settings]
ask_for_unknown = true
absent_ttl_secs = 600
resolver_timeout_secs = 120
store_path = "/tmp/aas-access/credentials.json"

[[endpoints]]
location = "api.example.com"
credential_hint = "bearer"
name = "Example AAS repository"
token_env = "EXAMPLE_TOKEN"

[[endpoints]]
location = "*.factory.local:8081"
credential_hint = "api_key"
header_name = "X-Factory-Key"
        "#
    }

    #[test]
    fn test_parse_config() {
        let config: AccessConfig = toml::from_str(sample_config_toml()).unwrap();

        assert!(config.settings.ask_for_unknown);
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].credential_hint, CredentialHint::Bearer);
        assert_eq!(config.endpoints[1].header_name(), "X-Factory-Key");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_coordinator_settings() {
        let config: AccessConfig = toml::from_str(sample_config_toml()).unwrap();
        let settings = config.settings.coordinator_settings();

        assert_eq!(settings.absent_ttl, Some(Duration::from_secs(600)));
        assert_eq!(settings.resolver_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_default_settings() {
        let config: AccessConfig = toml::from_str("").unwrap();

        assert!(!config.settings.ask_for_unknown);
        assert!(config.settings.store_path.is_none());
        assert!(config.endpoints.is_empty());
        assert_eq!(
            config.settings.coordinator_settings(),
            CoordinatorSettings::default()
        );
    }

    #[test]
    fn test_validate_duplicate_locations() {
        let toml = r#"
[[endpoints]]
location = "api.example.com"

[[endpoints]]
location = "api.example.com"
credential_hint = "basic"
        "#;

        let config: AccessConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(AccessError::Config(_))));
    }

    #[test]
    fn test_validate_path_prefix_with_other_credential() {
        let toml = r#"
[[endpoints]]
location = "api.example.com"
credential_hint = "bearer"

[[endpoints]]
location = "api.example.com/legacy"
credential_hint = "basic"
        "#;

        let config: AccessConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(AccessError::Config(_))));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config: AccessConfig = toml::from_str("[settings]\nresolver_timeout_secs = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, sample_config_toml()).unwrap();

        let config = AccessConfig::from_path(&path).unwrap();
        let catalog = config.catalog();
        assert_eq!(
            catalog
                .match_location("https://line1.factory.local:8081/shells")
                .unwrap()
                .location,
            "*.factory.local:8081"
        );
    }

    #[test]
    fn test_from_path_missing() {
        let dir = TempDir::new().unwrap();
        let err = AccessConfig::from_path(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
