//! Thread-safe credential cache with generation-checked writes.
//!
//! The cache maps a [`LocationKey`] to either a resolved [`HeaderItem`] or an
//! explicit Absent marker ("resolution was attempted and yielded nothing").
//! A key with no entry has never been resolved.
//!
//! `clear_all` bumps a generation counter under the same lock that guards the
//! entries. Resolutions capture the generation when they start and write with
//! [`CredentialCache::put_if_current`]; a write whose generation is stale is
//! dropped, so a clear can never be undone by a resolution that was already
//! running.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use aas_access_common::{HeaderItem, LocationKey};

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A usable header is cached.
    Resolved(HeaderItem),
    /// Resolution was attempted and produced no credential.
    Absent,
    /// Nothing is known about the key (never resolved, cleared or expired).
    NotFound,
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Resolved(HeaderItem),
    Absent { until: Option<DateTime<Utc>> },
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    entries: HashMap<LocationKey, CacheEntry>,
}

impl CacheState {
    fn write(&mut self, key: LocationKey, entry: CacheEntry, generation: Option<u64>) -> bool {
        if generation.is_some_and(|g| g != self.generation) {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }
}

/// Maps normalized locations to resolved headers.
#[derive(Debug, Default)]
pub struct CredentialCache {
    state: RwLock<CacheState>,
}

impl CredentialCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads an entry. Never blocks on a resolution and never starts one.
    #[must_use]
    pub fn get(&self, key: &LocationKey) -> CacheLookup {
        self.get_at(key, Utc::now())
    }

    /// Reads an entry as of `now`; expired entries read as [`CacheLookup::NotFound`].
    #[must_use]
    pub fn get_at(&self, key: &LocationKey, now: DateTime<Utc>) -> CacheLookup {
        let state = self.state.read();
        match state.entries.get(key) {
            Some(CacheEntry::Resolved(item)) if !item.is_expired_at(now) => {
                CacheLookup::Resolved(item.clone())
            }
            Some(CacheEntry::Absent { until }) if until.is_none_or(|at| at > now) => {
                CacheLookup::Absent
            }
            Some(_) | None => CacheLookup::NotFound,
        }
    }

    /// Stores or overwrites a resolved header.
    pub fn put(&self, key: LocationKey, item: HeaderItem) {
        self.state
            .write()
            .write(key, CacheEntry::Resolved(item), None);
    }

    /// Records that resolution yielded no credential, optionally until `until`.
    pub fn put_absent(&self, key: LocationKey, until: Option<DateTime<Utc>>) {
        self.state
            .write()
            .write(key, CacheEntry::Absent { until }, None);
    }

    /// Stores a header only if no clear happened since `generation` was read.
    ///
    /// Returns `false` when the write was discarded.
    pub fn put_if_current(&self, key: LocationKey, item: HeaderItem, generation: u64) -> bool {
        self.state
            .write()
            .write(key, CacheEntry::Resolved(item), Some(generation))
    }

    /// Records Absent only if no clear happened since `generation` was read.
    ///
    /// Returns `false` when the write was discarded.
    pub fn put_absent_if_current(
        &self,
        key: LocationKey,
        until: Option<DateTime<Utc>>,
        generation: u64,
    ) -> bool {
        self.state
            .write()
            .write(key, CacheEntry::Absent { until }, Some(generation))
    }

    /// Removes every entry and bumps the generation.
    ///
    /// Returns the number of entries removed.
    pub fn clear_all(&self) -> usize {
        let mut state = self.state.write();
        state.generation += 1;
        let removed = state.entries.len();
        state.entries.clear();
        removed
    }

    /// Current generation; changes only on [`CredentialCache::clear_all`].
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Number of entries, including Absent and not yet evicted expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// All resolved, unexpired headers.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HeaderItem> {
        let now = Utc::now();
        self.state
            .read()
            .entries
            .values()
            .filter_map(|entry| match entry {
                CacheEntry::Resolved(item) if !item.is_expired_at(now) => Some(item.clone()),
                CacheEntry::Resolved(_) | CacheEntry::Absent { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use chrono::Duration;

    use super::*;

    fn key(location: &str) -> LocationKey {
        LocationKey::normalize(location).unwrap()
    }

    #[test]
    fn test_empty_cache_not_found() {
        let cache = CredentialCache::new();
        assert_eq!(cache.get(&key("api.example.com")), CacheLookup::NotFound);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_and_get() {
        let cache = CredentialCache::new();
        let item = HeaderItem::bearer("abc", "api.example.com");
        cache.put(key("api.example.com"), item.clone());

        assert_eq!(cache.get(&key("api.example.com")), CacheLookup::Resolved(item));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = CredentialCache::new();
        cache.put_absent(key("host"), None);
        let item = HeaderItem::bearer("abc", "host");
        cache.put(key("host"), item.clone());

        assert_eq!(cache.get(&key("host")), CacheLookup::Resolved(item));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_absent_is_distinct_from_not_found() {
        let cache = CredentialCache::new();
        cache.put_absent(key("host"), None);

        assert_eq!(cache.get(&key("host")), CacheLookup::Absent);
        assert_eq!(cache.get(&key("other")), CacheLookup::NotFound);
    }

    #[test]
    fn test_absent_expiry() {
        let cache = CredentialCache::new();
        let now = Utc::now();
        cache.put_absent(key("host"), Some(now + Duration::seconds(10)));

        assert_eq!(cache.get_at(&key("host"), now), CacheLookup::Absent);
        assert_eq!(
            cache.get_at(&key("host"), now + Duration::seconds(11)),
            CacheLookup::NotFound
        );
    }

    #[test]
    fn test_expired_item_reads_as_not_found() {
        let cache = CredentialCache::new();
        let now = Utc::now();
        let item = HeaderItem::bearer("abc", "host").with_expiry(now + Duration::seconds(5));
        cache.put(key("host"), item);

        assert!(matches!(cache.get_at(&key("host"), now), CacheLookup::Resolved(_)));
        assert_eq!(
            cache.get_at(&key("host"), now + Duration::seconds(6)),
            CacheLookup::NotFound
        );
    }

    #[test]
    fn test_clear_all_bumps_generation() {
        let cache = CredentialCache::new();
        cache.put(key("a"), HeaderItem::bearer("1", "a"));
        cache.put_absent(key("b"), None);
        let before = cache.generation();

        assert_eq!(cache.clear_all(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), before + 1);
    }

    #[test]
    fn test_stale_write_discarded() {
        let cache = CredentialCache::new();
        let generation = cache.generation();
        cache.clear_all();

        assert!(!cache.put_if_current(key("a"), HeaderItem::bearer("1", "a"), generation));
        assert!(!cache.put_absent_if_current(key("b"), None, generation));
        assert!(cache.is_empty());

        let current = cache.generation();
        assert!(cache.put_if_current(key("a"), HeaderItem::bearer("1", "a"), current));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snapshot_only_resolved() {
        let cache = CredentialCache::new();
        let item = HeaderItem::bearer("1", "a");
        cache.put(key("a"), item.clone());
        cache.put_absent(key("b"), None);
        cache.put(
            key("c"),
            HeaderItem::bearer("old", "c").with_expiry(Utc::now() - Duration::seconds(1)),
        );

        assert_eq!(cache.snapshot(), vec![item]);
    }

    #[test]
    fn test_concurrent_writers_and_clear() {
        let cache = Arc::new(CredentialCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for j in 0..100 {
                        let location = format!("host{i}-{j}");
                        let generation = cache.generation();
                        cache.put_if_current(
                            key(&location),
                            HeaderItem::bearer("t", location.as_str()),
                            generation,
                        );
                        if j % 25 == 0 {
                            cache.clear_all();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let generation = cache.generation();
        cache.clear_all();
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), generation + 1);
    }
}
