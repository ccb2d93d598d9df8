//! Credential resolution for remote AAS servers.
//!
//! [`AccessCoordinator`] owns the credential cache, the endpoint catalog
//! snapshot and the set of in-flight resolutions. It is shared by `Arc`
//! between every component that issues HTTP requests.
//!
//! Concurrent interactive calls for the same location are coalesced: the
//! first caller (the initiator) invokes the resolver, later callers wait for
//! its outcome. Each in-flight resolution is a `Flight` stored in a
//! `DashMap` keyed by [`LocationKey`]; the map's entry API decides atomically
//! whether a caller initiates or waits. Outcomes are published through a
//! `tokio::sync::watch` channel so every waiter receives an identical copy.
//!
//! Ordering on completion is cache write, then marker release, then notify,
//! so a caller arriving after the release finds the cache populated.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use aas_access_common::{EndpointCatalog, HeaderItem, LocationKey};

use crate::cache::{CacheLookup, CredentialCache};
use crate::error::{AccessError, Result};
use crate::resolver::{InteractiveResolver, ResolveRequest};

/// Tuning knobs for an [`AccessCoordinator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// How long a declined resolution is remembered. `None` keeps it for the
    /// lifetime of the cache.
    pub absent_ttl: Option<Duration>,

    /// Upper bound on a single resolver invocation.
    pub resolver_timeout: Option<Duration>,
}

impl CoordinatorSettings {
    #[must_use]
    pub const fn with_absent_ttl(mut self, ttl: Duration) -> Self {
        self.absent_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout = Some(timeout);
        self
    }
}

/// Diagnostic view of a location's resolution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationState {
    /// Never resolved, cleared, expired, or the last attempt failed.
    Unresolved,
    /// A resolution is in progress.
    Pending,
    /// A header is cached.
    Resolved,
    /// Resolution yielded no credential.
    Absent,
}

impl fmt::Display for LocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unresolved => "unresolved",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Absent => "absent",
        };
        f.write_str(label)
    }
}

/// Outcome of one pre-seed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreseedSummary {
    /// Items written to the cache.
    pub inserted: usize,
    /// Items whose scope could not be normalized or that already expired.
    pub skipped: usize,
}

type FlightOutcome = Result<Option<HeaderItem>>;

/// One in-progress resolution, shared by its initiator and waiters.
struct Flight {
    /// Cache generation at the time the flight started.
    generation: u64,
    outcome: watch::Sender<Option<FlightOutcome>>,
}

impl Flight {
    fn new(generation: u64) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            generation,
            outcome,
        }
    }

    fn publish(&self, outcome: FlightOutcome) {
        self.outcome.send_replace(Some(outcome));
    }
}

enum Role {
    Initiator(Arc<Flight>),
    Waiter(watch::Receiver<Option<FlightOutcome>>),
}

/// Held by the initiator for the lifetime of its flight.
///
/// Dropping the guard without completing it releases the pending marker and
/// publishes `Cancelled` to every waiter.
struct FlightGuard<'a> {
    flights: &'a DashMap<LocationKey, Arc<Flight>>,
    key: LocationKey,
    flight: Arc<Flight>,
    finished: bool,
}

impl FlightGuard<'_> {
    fn generation(&self) -> u64 {
        self.flight.generation
    }

    fn release(&self) {
        // A flight replaced after a clear must not evict its successor.
        self.flights
            .remove_if(&self.key, |_, current| Arc::ptr_eq(current, &self.flight));
    }

    fn complete(mut self, outcome: FlightOutcome) {
        self.finished = true;
        self.release();
        self.flight.publish(outcome);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(key = %self.key, "Resolution cancelled by its initiator");
        self.release();
        self.flight.publish(Err(AccessError::Cancelled {
            location: self.key.to_string(),
        }));
    }
}

/// Resolves and caches authentication headers for remote servers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use aas_access::{AccessCoordinator, StaticResolver};
/// use aas_access_common::{CredentialHint, EndpointCatalog, EndpointDescription, HeaderItem};
///
/// # tokio_test_block(async {
/// let catalog = EndpointCatalog::new(vec![
///     EndpointDescription::builder()
///         .location("api.example.com")
///         .credential_hint(CredentialHint::Bearer)
///         .build(),
/// ]);
/// let resolver = StaticResolver::new()
///     .with("api.example.com", HeaderItem::bearer("abc", "api.example.com"));
/// let coordinator = AccessCoordinator::new(catalog).with_resolver(Arc::new(resolver));
///
/// let item = coordinator
///     .interactive_determine_authenticate_header("https://api.example.com/v1", false)
///     .await
///     .unwrap();
/// assert!(item.is_some());
/// assert!(coordinator.lookup_authenticate_header("api.example.com").is_some());
/// # });
/// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f);
/// # }
/// ```
pub struct AccessCoordinator {
    catalog: ArcSwap<EndpointCatalog>,
    cache: CredentialCache,
    resolver: Option<Arc<dyn InteractiveResolver>>,
    settings: CoordinatorSettings,

    /// In-flight resolutions (location key -> flight)
    flights: DashMap<LocationKey, Arc<Flight>>,
}

impl AccessCoordinator {
    /// Creates a coordinator with an empty cache and no resolver.
    #[must_use]
    pub fn new(catalog: EndpointCatalog) -> Self {
        Self {
            catalog: ArcSwap::from_pointee(catalog),
            cache: CredentialCache::new(),
            resolver: None,
            settings: CoordinatorSettings::default(),
            flights: DashMap::new(),
        }
    }

    /// Registers the resolver used for unknown locations.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn InteractiveResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    #[must_use]
    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    /// Returns the cached header for a location without ever suspending.
    ///
    /// Returns `None` for unknown, declined, expired and unusable locations.
    /// Never consults the catalog or the resolver.
    #[must_use]
    pub fn lookup_authenticate_header(&self, location: &str) -> Option<HeaderItem> {
        let key = LocationKey::normalize(location)?;
        match self.cache.get(&key) {
            CacheLookup::Resolved(item) => {
                debug!(key = %key, "Cache hit");
                Some(item)
            }
            CacheLookup::Absent | CacheLookup::NotFound => {
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Returns a header for a location, resolving it if needed.
    ///
    /// Cached outcomes (resolved or declined) are returned immediately.
    /// Locations that match no catalog entry are only resolved when
    /// `ask_for_unknown` is set; otherwise the call returns `Ok(None)` and
    /// records nothing. Concurrent calls for the same location share a single
    /// resolver invocation and all observe its outcome.
    ///
    /// Dropping the future of the call that started a resolution cancels it;
    /// every caller waiting on it then receives [`AccessError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The location is empty or cannot be normalized
    /// - A resolution is needed but no resolver is registered
    /// - The resolver fails, times out or is cancelled
    #[instrument(skip(self), fields(key = tracing::field::Empty))]
    pub async fn interactive_determine_authenticate_header(
        &self,
        location: &str,
        ask_for_unknown: bool,
    ) -> Result<Option<HeaderItem>> {
        let key = LocationKey::normalize(location)
            .ok_or_else(|| AccessError::InvalidLocation(location.to_string()))?;
        tracing::Span::current().record("key", key.as_str());

        match self.cache.get(&key) {
            CacheLookup::Resolved(item) => {
                debug!("Cache hit");
                return Ok(Some(item));
            }
            CacheLookup::Absent => {
                debug!("Cached as absent");
                return Ok(None);
            }
            CacheLookup::NotFound => {}
        }

        let endpoint = self.catalog.load().match_location(location).cloned();
        if endpoint.is_none() && !ask_for_unknown {
            debug!("Location not in catalog, not asking");
            return Ok(None);
        }

        let resolver = self.resolver.clone().ok_or(AccessError::NoResolver)?;

        let flight = match self.join_or_start(&key) {
            Role::Waiter(rx) => {
                debug!("Joining in-flight resolution");
                return wait_for_outcome(rx, &key).await;
            }
            Role::Initiator(flight) => flight,
        };

        let guard = FlightGuard {
            flights: &self.flights,
            key: key.clone(),
            flight,
            finished: false,
        };

        // A flight that finished between the cache read and registration has
        // already written its outcome.
        match self.cache.get(&key) {
            CacheLookup::Resolved(item) => {
                let outcome = Ok(Some(item));
                guard.complete(outcome.clone());
                return outcome;
            }
            CacheLookup::Absent => {
                guard.complete(Ok(None));
                return Ok(None);
            }
            CacheLookup::NotFound => {}
        }

        let request = ResolveRequest {
            location: location.to_string(),
            key: key.clone(),
            endpoint,
        };
        let generation = guard.generation();

        info!(resolver = resolver.name(), "Resolving credential");
        let outcome = match self.call_resolver(resolver.as_ref(), &request).await {
            Ok(Some(item)) => {
                if self.cache.put_if_current(key.clone(), item.clone(), generation) {
                    info!(header = item.name(), "Credential resolved");
                } else {
                    info!("Credential resolved after clear, not cached");
                }
                Ok(Some(item))
            }
            Ok(None) => {
                let until = self.absent_until();
                if self.cache.put_absent_if_current(key.clone(), until, generation) {
                    info!("Credential declined");
                } else {
                    info!("Credential declined after clear, not cached");
                }
                Ok(None)
            }
            Err(e) => {
                warn!("Resolution failed: {e}");
                Err(e)
            }
        };

        guard.complete(outcome.clone());
        outcome
    }

    /// Forgets every cached credential.
    ///
    /// Never suspends. Resolutions already running still deliver their
    /// outcome to their callers but no longer write to the cache, and later
    /// callers start fresh resolutions instead of joining them.
    ///
    /// Returns the number of entries removed.
    #[instrument(skip(self))]
    pub fn clear_all_credentials(&self) -> usize {
        let removed = self.cache.clear_all();
        info!(removed, in_flight = self.flights.len(), "Cleared all credentials");
        removed
    }

    /// Inserts known headers, keyed by each item's scope.
    ///
    /// Used to restore credentials from a store at startup.
    pub fn preseed(&self, items: impl IntoIterator<Item = HeaderItem>) -> PreseedSummary {
        let now = Utc::now();
        let mut summary = PreseedSummary::default();

        for item in items {
            match item.scope_key() {
                Some(key) if !item.is_expired_at(now) => {
                    self.cache.put(key, item);
                    summary.inserted += 1;
                }
                _ => summary.skipped += 1,
            }
        }

        if summary.skipped > 0 {
            warn!(skipped = summary.skipped, "Skipped unusable pre-seeded credentials");
        }
        debug!(inserted = summary.inserted, "Pre-seeded credentials");
        summary
    }

    /// All cached, unexpired headers.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HeaderItem> {
        self.cache.snapshot()
    }

    /// Replaces the catalog snapshot. The cache is left untouched.
    pub fn reload_catalog(&self, catalog: EndpointCatalog) {
        info!(endpoints = catalog.len(), "Reloaded endpoint catalog");
        self.catalog.store(Arc::new(catalog));
    }

    /// The current catalog snapshot.
    #[must_use]
    pub fn catalog(&self) -> Arc<EndpointCatalog> {
        self.catalog.load_full()
    }

    #[must_use]
    pub fn state_of(&self, location: &str) -> LocationState {
        let Some(key) = LocationKey::normalize(location) else {
            return LocationState::Unresolved;
        };

        match self.cache.get(&key) {
            CacheLookup::Resolved(_) => LocationState::Resolved,
            CacheLookup::Absent => LocationState::Absent,
            CacheLookup::NotFound => {
                let generation = self.cache.generation();
                let pending = self
                    .flights
                    .get(&key)
                    .is_some_and(|flight| flight.generation == generation);
                if pending {
                    LocationState::Pending
                } else {
                    LocationState::Unresolved
                }
            }
        }
    }

    /// Number of resolutions currently in progress.
    #[must_use]
    pub fn pending_resolutions(&self) -> usize {
        self.flights.len()
    }

    /// Registers a new flight for `key` or subscribes to the current one.
    ///
    /// A flight started before the last clear is replaced, never joined.
    fn join_or_start(&self, key: &LocationKey) -> Role {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let generation = self.cache.generation();
                if entry.get().generation == generation {
                    Role::Waiter(entry.get().outcome.subscribe())
                } else {
                    let flight = Arc::new(Flight::new(generation));
                    entry.insert(Arc::clone(&flight));
                    Role::Initiator(flight)
                }
            }
            Entry::Vacant(entry) => {
                let flight = Arc::new(Flight::new(self.cache.generation()));
                entry.insert(Arc::clone(&flight));
                Role::Initiator(flight)
            }
        }
    }

    async fn call_resolver(
        &self,
        resolver: &dyn InteractiveResolver,
        request: &ResolveRequest,
    ) -> Result<Option<HeaderItem>> {
        let location = request.key.to_string();
        let resolution = resolver.resolve(request);

        let result = match self.settings.resolver_timeout {
            Some(limit) => tokio::time::timeout(limit, resolution)
                .await
                .map_err(|_| AccessError::TimedOut {
                    location: location.clone(),
                })?,
            None => resolution.await,
        };

        result.map_err(|e| AccessError::ResolutionFailed {
            location,
            message: format!("{e:#}"),
        })
    }

    fn absent_until(&self) -> Option<chrono::DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.settings.absent_ttl?).ok()?;
        Utc::now().checked_add_signed(ttl)
    }
}

async fn wait_for_outcome(
    mut rx: watch::Receiver<Option<FlightOutcome>>,
    key: &LocationKey,
) -> FlightOutcome {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(value) => Option::clone(&value),
        Err(_) => None,
    };

    outcome.unwrap_or_else(|| {
        Err(AccessError::Cancelled {
            location: key.to_string(),
        })
    })
}

impl fmt::Debug for AccessCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCoordinator")
            .field("endpoints", &self.catalog.load().len())
            .field("cached", &self.cache.len())
            .field("pending", &self.flights.len())
            .field("resolver", &self.resolver.as_ref().map(|r| r.name().to_string()))
            .field("settings", &self.settings)
            .finish()
    }
}
