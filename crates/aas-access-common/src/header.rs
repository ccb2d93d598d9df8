//! Resolved authentication headers and credential hints.
//!
//! A [`HeaderItem`] is what the coordinator caches and hands out: a header
//! name, its secret value and the location key it was resolved for.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::location::LocationKey;

/// Header name used for `Basic` and `Bearer` credentials.
pub const AUTHORIZATION: &str = "Authorization";

/// Header name used for API key credentials unless an endpoint overrides it.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Describes which kind of credential an endpoint expects.
///
/// Resolvers use the hint to decide what to ask for and how to shape the
/// resulting header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CredentialHint {
    /// No particular scheme is known; the resolver decides.
    #[default]
    None,
    /// HTTP basic authentication (`user:password`).
    Basic,
    /// Bearer token in the `Authorization` header.
    Bearer,
    /// Raw key in a dedicated header.
    ApiKey,
}

impl CredentialHint {
    /// The header name a credential of this kind is sent in by default.
    #[must_use]
    pub const fn default_header_name(self) -> &'static str {
        match self {
            Self::ApiKey => API_KEY_HEADER,
            Self::None | Self::Basic | Self::Bearer => AUTHORIZATION,
        }
    }
}

impl fmt::Display for CredentialHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Basic => write!(f, "basic"),
            Self::Bearer => write!(f, "bearer"),
            Self::ApiKey => write!(f, "api_key"),
        }
    }
}

impl FromStr for CredentialHint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "bearer" => Ok(Self::Bearer),
            "api_key" | "apikey" => Ok(Self::ApiKey),
            _ => anyhow::bail!("Unknown credential hint: {s}"),
        }
    }
}

/// A resolved HTTP authentication header for one location.
///
/// The value is kept in a [`SecretString`] and never appears in `Debug`
/// output. Items are immutable: the cache hands out clones and nothing
/// mutates an item after it was resolved.
///
/// # Examples
///
/// ```
/// use aas_access_common::HeaderItem;
///
/// let item = HeaderItem::bearer("abc", "api.example.com");
/// assert_eq!(item.name(), "Authorization");
/// assert_eq!(item.scope(), "api.example.com");
/// assert!(!format!("{item:?}").contains("abc"));
/// ```
#[derive(Clone)]
pub struct HeaderItem {
    name: String,
    value: SecretString,
    scope: String,
    expires_at: Option<DateTime<Utc>>,
}

impl HeaderItem {
    /// Creates a header item from its raw parts.
    ///
    /// # Arguments
    ///
    /// * `name` - HTTP header field name
    /// * `value` - Credential payload, sent verbatim
    /// * `scope` - Location key the item was resolved for
    pub fn new(name: impl Into<String>, value: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: SecretString::new(value.into().into()),
            scope: scope.into(),
            expires_at: None,
        }
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(token: impl AsRef<str>, scope: impl Into<String>) -> Self {
        Self::new(AUTHORIZATION, format!("Bearer {}", token.as_ref()), scope)
    }

    /// `Authorization: Basic <base64(user:password)>`.
    pub fn basic(user: impl AsRef<str>, password: impl AsRef<str>, scope: impl Into<String>) -> Self {
        let encoded = STANDARD.encode(format!("{}:{}", user.as_ref(), password.as_ref()));
        Self::new(AUTHORIZATION, format!("Basic {encoded}"), scope)
    }

    /// Sets the instant after which the item is no longer usable.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The credential payload.
    ///
    /// Callers attach this to an outbound request; it must not be logged.
    pub fn value(&self) -> &SecretString {
        &self.value
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the item has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// The normalized key of this item's scope, if the scope is usable.
    #[must_use]
    pub fn scope_key(&self) -> Option<LocationKey> {
        LocationKey::normalize(&self.scope)
    }
}

impl PartialEq for HeaderItem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.scope == other.scope
            && self.expires_at == other.expires_at
            && self.value.expose_secret() == other.value.expose_secret()
    }
}

impl Eq for HeaderItem {}

impl fmt::Debug for HeaderItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderItem")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Duration;

    use super::*;

    #[test]
    fn test_bearer_header() {
        let item = HeaderItem::bearer("abc", "api.example.com");
        assert_eq!(item.name(), "Authorization");
        assert_eq!(item.value().expose_secret(), "Bearer abc");
        assert_eq!(item.scope(), "api.example.com");
        assert!(item.expires_at().is_none());
    }

    #[test]
    fn test_basic_header_is_base64() {
        let item = HeaderItem::basic("aladdin", "opensesame", "host");
        assert_eq!(
            item.value().expose_secret(),
            "Basic YWxhZGRpbjpvcGVuc2VzYW1l"
        );
    }

    #[test]
    fn test_debug_redacts_value() {
        let item = HeaderItem::new("X-API-Key", "super-secret", "host");
        let debug_str = format!("{item:?}");

        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super-secret"));
    }

    #[test]
    fn test_equality_compares_value() {
        let a = HeaderItem::bearer("one", "host");
        let b = HeaderItem::bearer("one", "host");
        let c = HeaderItem::bearer("two", "host");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let item = HeaderItem::bearer("t", "host").with_expiry(now + Duration::seconds(30));

        assert!(!item.is_expired_at(now));
        assert!(item.is_expired_at(now + Duration::seconds(30)));
        assert!(!HeaderItem::bearer("t", "host").is_expired_at(now));
    }

    #[test]
    fn test_scope_key_keeps_scheme() {
        let item = HeaderItem::bearer("t", "http://aas.local:5001/shells");
        assert_eq!(item.scope_key().unwrap().as_str(), "http://aas.local:5001");

        let bare = HeaderItem::bearer("t", "api.example.com");
        assert_eq!(bare.scope_key().unwrap().as_str(), "https://api.example.com");
    }

    #[test]
    fn test_hint_header_names() {
        assert_eq!(CredentialHint::Bearer.default_header_name(), "Authorization");
        assert_eq!(CredentialHint::Basic.default_header_name(), "Authorization");
        assert_eq!(CredentialHint::ApiKey.default_header_name(), "X-API-Key");
    }

    #[test]
    fn test_hint_parse_and_display() {
        assert_eq!("Bearer".parse::<CredentialHint>().unwrap(), CredentialHint::Bearer);
        assert_eq!("apikey".parse::<CredentialHint>().unwrap(), CredentialHint::ApiKey);
        assert!("kerberos".parse::<CredentialHint>().is_err());
        assert_eq!(CredentialHint::ApiKey.to_string(), "api_key");
    }

    #[test]
    fn test_hint_serde_names() {
        let hint: CredentialHint = serde_json::from_str("\"api_key\"").unwrap();
        assert_eq!(hint, CredentialHint::ApiKey);
        assert_eq!(
            serde_json::to_string(&CredentialHint::Basic).unwrap(),
            "\"basic\""
        );
    }
}
