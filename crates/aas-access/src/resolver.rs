//! Pluggable credential determination.
//!
//! The coordinator calls an [`InteractiveResolver`] when a location has no
//! cached header. Implementations may prompt a user, query a secret store or
//! read the environment; the coordinator only relies on the contract:
//!
//! - `Ok(Some(item))`: a credential was determined
//! - `Ok(None)`: the user or store declined; remembered as Absent
//! - `Err(_)`: determination failed; nothing is cached and a later call may retry
//!
//! A resolver may take arbitrarily long. The coordinator invokes it at most
//! once per resolution, however many callers are waiting. If the calling
//! task is cancelled, the future returned by `resolve` is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use aas_access_common::{CredentialHint, EndpointDescription, HeaderItem, LocationKey};

/// Default prefix for environment variables consulted by [`EnvResolver`].
pub const DEFAULT_ENV_PREFIX: &str = "AAS_ACCESS_TOKEN";

/// Everything a resolver gets to know about the location being resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Location as passed by the caller.
    pub location: String,
    /// Normalized cache key; resolvers should use it as the item scope.
    pub key: LocationKey,
    /// Matched catalog entry, `None` for unlisted locations.
    pub endpoint: Option<EndpointDescription>,
}

impl ResolveRequest {
    /// The credential kind the endpoint expects.
    #[must_use]
    pub fn hint(&self) -> CredentialHint {
        self.endpoint
            .as_ref()
            .map_or(CredentialHint::None, |endpoint| endpoint.credential_hint)
    }

    /// The header name the credential should be sent in.
    #[must_use]
    pub fn header_name(&self) -> &str {
        self.endpoint.as_ref().map_or_else(
            || CredentialHint::None.default_header_name(),
            EndpointDescription::header_name,
        )
    }

    /// Name to present to a user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.endpoint
            .as_ref()
            .map_or(self.key.as_str(), EndpointDescription::display_name)
    }
}

/// Capability invoked when a location's header is unknown.
#[async_trait]
pub trait InteractiveResolver: Send + Sync {
    /// Determine a header for the requested location.
    ///
    /// # Errors
    ///
    /// Returns an error if determination failed (I/O, locked keyring, broken
    /// prompt). Declining is not an error and is reported as `Ok(None)`.
    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<HeaderItem>>;

    /// Short name used in log output.
    fn name(&self) -> &str {
        "resolver"
    }
}

/// Resolves from a fixed map of locations to headers.
///
/// Useful for headless deployments and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    items: HashMap<LocationKey, HeaderItem>,
}

impl StaticResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header for a location. Unusable locations are ignored.
    #[must_use]
    pub fn with(mut self, location: &str, item: HeaderItem) -> Self {
        if let Some(key) = LocationKey::normalize(location) {
            self.items.insert(key, item);
        }
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl InteractiveResolver for StaticResolver {
    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<HeaderItem>> {
        Ok(self.items.get(&request.key).cloned())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Function used by [`EnvResolver`] to read a variable.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials from environment variables.
///
/// The variable is the endpoint's `token_env` when set, otherwise
/// `<prefix>_<HOST>` where `HOST` is the key's host and port upper-cased with
/// every non-alphanumeric character replaced by `_`
/// (`api.example.com:8443` -> `AAS_ACCESS_TOKEN_API_EXAMPLE_COM_8443`). The
/// scheme is not part of the name, so `http` and `https` keys for one host
/// read the same variable but are still cached apart.
///
/// | Hint | Variables | Header |
/// |------|-----------|--------|
/// | `basic` | `<VAR>_USER`, `<VAR>_PASSWORD` | `Authorization: Basic ...` |
/// | `api_key` | `<VAR>` | `<header_name>: <value>` |
/// | `bearer`, `none` | `<VAR>` | `Authorization: Bearer <value>` |
///
/// Missing variables decline.
#[derive(Clone)]
pub struct EnvResolver {
    prefix: String,
    lookup: EnvLookup,
}

impl Default for EnvResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvResolver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_ENV_PREFIX.to_string(),
            lookup: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Sets the prefix for derived variable names.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replaces the process environment with a custom lookup.
    #[must_use]
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    /// The variable consulted for a request.
    #[must_use]
    pub fn variable_for(&self, request: &ResolveRequest) -> String {
        if let Some(var) = request
            .endpoint
            .as_ref()
            .and_then(|endpoint| endpoint.token_env.as_ref())
        {
            return var.clone();
        }

        let suffix: String = request
            .key
            .authority()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{suffix}", self.prefix)
    }

    fn read(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.is_empty())
    }
}

#[async_trait]
impl InteractiveResolver for EnvResolver {
    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<HeaderItem>> {
        let var = self.variable_for(request);
        let scope = request.key.as_str();

        let item = match request.hint() {
            CredentialHint::Basic => {
                let user = self.read(&format!("{var}_USER"));
                let password = self.read(&format!("{var}_PASSWORD"));
                match (user, password) {
                    (Some(user), Some(password)) => Some(HeaderItem::basic(user, password, scope)),
                    (None, None) => None,
                    _ => anyhow::bail!("Incomplete basic credentials in {var}_USER/{var}_PASSWORD"),
                }
            }
            CredentialHint::ApiKey => self
                .read(&var)
                .map(|token| HeaderItem::new(request.header_name(), token, scope)),
            _ => self.read(&var).map(|token| {
                HeaderItem::new(request.header_name(), format!("Bearer {token}"), scope)
            }),
        };

        debug!(
            variable = %var,
            found = item.is_some(),
            "Checked environment for credential"
        );
        Ok(item)
    }

    fn name(&self) -> &str {
        "env"
    }
}

impl std::fmt::Debug for EnvResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvResolver")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Tries several resolvers in order.
///
/// The first credential wins. If none is found, the chain declines, unless a
/// member failed, in which case the first failure is returned so the caller
/// does not cache a decline that was really an error.
#[derive(Default, Clone)]
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn InteractiveResolver>>,
}

impl ChainResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, resolver: Arc<dyn InteractiveResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

#[async_trait]
impl InteractiveResolver for ChainResolver {
    async fn resolve(&self, request: &ResolveRequest) -> Result<Option<HeaderItem>> {
        let mut first_error = None;

        for resolver in &self.resolvers {
            match resolver.resolve(request).await {
                Ok(Some(item)) => {
                    debug!(resolver = resolver.name(), key = %request.key, "Chain member resolved");
                    return Ok(Some(item));
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(resolver = resolver.name(), key = %request.key, "Chain member failed: {e}");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        first_error.map_or(Ok(None), Err)
    }

    fn name(&self) -> &str {
        "chain"
    }
}

impl std::fmt::Debug for ChainResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("ChainResolver")
            .field("resolvers", &names)
            .finish()
    }
}
