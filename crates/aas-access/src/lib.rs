//! # aas-access
//!
//! Resolves the HTTP authentication headers needed to reach remote Asset
//! Administration Shell servers.
//!
//! An [`AccessCoordinator`] answers two questions for the components that
//! issue requests:
//!
//! - "Do we already know a header for this location?" via
//!   [`AccessCoordinator::lookup_authenticate_header`], which never suspends
//! - "Find out, asking if necessary" via
//!   [`AccessCoordinator::interactive_determine_authenticate_header`], which
//!   runs at most one [`InteractiveResolver`] invocation per location no
//!   matter how many callers ask at once
//!
//! [`AccessCoordinator::clear_all_credentials`] forgets everything.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use aas_access::{AccessCoordinator, EnvResolver};
//! use aas_access_common::{CredentialHint, EndpointCatalog, EndpointDescription};
//!
//! let catalog = EndpointCatalog::new(vec![
//!     EndpointDescription::builder()
//!         .location("*.example.com")
//!         .credential_hint(CredentialHint::Bearer)
//!         .build(),
//! ]);
//!
//! let coordinator = Arc::new(
//!     AccessCoordinator::new(catalog).with_resolver(Arc::new(EnvResolver::new())),
//! );
//! assert!(coordinator.lookup_authenticate_header("api.example.com").is_none());
//! ```

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod resolver;
pub mod store;

pub use aas_access_common::*;

pub use cache::{CacheLookup, CredentialCache};
pub use coordinator::{AccessCoordinator, CoordinatorSettings, LocationState, PreseedSummary};
pub use error::{AccessError, Result};
pub use resolver::{
    ChainResolver, DEFAULT_ENV_PREFIX, EnvLookup, EnvResolver, InteractiveResolver,
    ResolveRequest, StaticResolver,
};
pub use store::{CredentialStore, JsonFileStore, MemoryStore};
