//! # aas-access-common
//!
//! Common types for resolving the authentication headers of remote Asset
//! Administration Shell servers.
//!
//! This crate provides the value types shared by the access coordinator and
//! its embedders:
//! - [`HeaderItem`]: a resolved header, with its secret value redacted from debug output
//! - [`EndpointCatalog`]: the host application's list of known servers
//! - [`LocationKey`]: the normalized form of a server location used as cache key
//!
//! ## Example
//!
//! ```
//! use aas_access_common::{CredentialHint, EndpointCatalog, EndpointDescription, HeaderItem, LocationKey};
//!
//! let catalog = EndpointCatalog::new(vec![
//!     EndpointDescription::builder()
//!         .location("api.example.com")
//!         .credential_hint(CredentialHint::Bearer)
//!         .name("Example repository")
//!         .build(),
//! ]);
//!
//! let endpoint = catalog.match_location("https://api.example.com/shells").unwrap();
//! assert_eq!(endpoint.display_name(), "Example repository");
//!
//! let key = LocationKey::normalize("https://api.example.com/shells").unwrap();
//! let item = HeaderItem::bearer("abc", key.as_str());
//! assert_eq!(item.scope_key(), Some(key));
//! ```

pub mod catalog;
pub mod header;
pub mod location;

pub use catalog::{CatalogFile, EndpointCatalog, EndpointDescription, validate_endpoints};
pub use header::{API_KEY_HEADER, AUTHORIZATION, CredentialHint, HeaderItem};
pub use location::{LocationKey, ParsedLocation};
