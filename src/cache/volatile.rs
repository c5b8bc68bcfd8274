//! Bounded in-process cache tier.
//!
//! One [`VolatileNamespace`] per cache namespace, each with its own TTL and
//! capacity. A position counter orders entries for eviction: under
//! [`Eviction::LeastRecentlyUsed`] a hit moves the entry to the newest
//! position, under [`Eviction::Insertion`] positions only change on write.
//!
//! Expired entries are dropped lazily on read, before eviction when the
//! namespace is full, and by [`VolatileNamespace::purge_expired`].

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde_json::Value;

use super::{Eviction, NamespaceConfig};

/// A stored value plus its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    pub hit_count: u64,
}

impl CacheEntry {
    /// An entry is valid strictly before its expiry instant.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    position: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Slot>,
    /// position → key, oldest first.
    order: BTreeMap<u64, String>,
    next_position: u64,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        let p = self.next_position;
        self.next_position += 1;
        p
    }

    fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.position);
        Some(slot)
    }

    fn purge_expired(&mut self, now: SystemTime) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, s)| !s.entry.is_valid_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// One namespace of the volatile tier. Safe to share across tasks.
#[derive(Debug)]
pub struct VolatileNamespace {
    config: NamespaceConfig,
    inner: Mutex<Inner>,
}

impl VolatileNamespace {
    pub fn new(config: NamespaceConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Look up a live entry, counting the hit.
    pub fn get(&self, key: &str, now: SystemTime) -> Option<Value> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let valid = inner.entries.get(key)?.entry.is_valid_at(now);
        if !valid {
            inner.remove(key);
            return None;
        }

        let reposition = self.config.eviction == Eviction::LeastRecentlyUsed;
        let new_position = reposition.then(|| inner.bump());
        let slot = inner.entries.get_mut(key)?;
        slot.entry.hit_count += 1;
        let value = slot.entry.value.clone();
        if let Some(p) = new_position {
            let old = std::mem::replace(&mut slot.position, p);
            inner.order.remove(&old);
            inner.order.insert(p, key.to_owned());
        }
        Some(value)
    }

    /// Inspect an entry without counting a hit or touching recency.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.inner.lock().entries.get(key).map(|s| s.entry.clone())
    }

    /// Insert with the namespace TTL (or `ttl` when given).
    pub fn insert(&self, key: &str, value: Value, ttl: Option<Duration>, now: SystemTime) {
        let ttl = ttl.unwrap_or(self.config.ttl);
        self.insert_with_expiry(key, value, now, now + ttl, now);
    }

    /// Insert an entry whose timestamps were decided elsewhere (durable promotion).
    pub fn insert_with_expiry(
        &self,
        key: &str,
        value: Value,
        created_at: SystemTime,
        expires_at: SystemTime,
        now: SystemTime,
    ) {
        if self.config.max_entries == 0 || expires_at <= now {
            return;
        }
        let mut inner = self.inner.lock();
        inner.remove(key);

        if inner.entries.len() >= self.config.max_entries {
            inner.purge_expired(now);
        }
        while inner.entries.len() >= self.config.max_entries {
            if inner.evict_oldest().is_none() {
                break;
            }
        }

        let position = inner.bump();
        inner.order.insert(position, key.to_owned());
        inner.entries.insert(
            key.to_owned(),
            Slot {
                entry: CacheEntry {
                    key: key.to_owned(),
                    value,
                    created_at,
                    expires_at,
                    hit_count: 0,
                },
                position,
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self, now: SystemTime) -> usize {
        self.inner.lock().purge_expired(now)
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (live entries, summed hit count over live entries).
    pub fn live_stats(&self, now: SystemTime) -> (usize, u64) {
        let inner = self.inner.lock();
        inner
            .entries
            .values()
            .filter(|s| s.entry.is_valid_at(now))
            .fold((0, 0), |(n, hits), s| (n + 1, hits + s.entry.hit_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ns(max: usize, eviction: Eviction) -> VolatileNamespace {
        VolatileNamespace::new(NamespaceConfig {
            max_entries: max,
            ttl: Duration::from_secs(60),
            eviction,
        })
    }

    #[test]
    fn miss_then_hit_counts() {
        let cache = ns(10, Eviction::LeastRecentlyUsed);
        let now = SystemTime::now();
        assert!(cache.get("a", now).is_none());
        cache.insert("a", json!("x"), None, now);
        assert_eq!(cache.get("a", now), Some(json!("x")));
        assert_eq!(cache.get("a", now), Some(json!("x")));
        assert_eq!(cache.peek("a").unwrap().hit_count, 2);
    }

    #[test]
    fn expired_entry_is_a_miss_and_removed() {
        let cache = ns(10, Eviction::LeastRecentlyUsed);
        let now = SystemTime::now();
        cache.insert("a", json!(1), Some(Duration::from_secs(5)), now);
        assert!(cache.get("a", now + Duration::from_secs(4)).is_some());
        assert!(cache.get("a", now + Duration::from_secs(5)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = ns(2, Eviction::LeastRecentlyUsed);
        let now = SystemTime::now();
        cache.insert("a", json!(1), None, now);
        cache.insert("b", json!(2), None, now);
        cache.get("a", now);
        cache.insert("c", json!(3), None, now);
        assert!(cache.peek("a").is_some());
        assert!(cache.peek("b").is_none());
        assert!(cache.peek("c").is_some());
    }

    #[test]
    fn insertion_order_ignores_reads() {
        let cache = ns(2, Eviction::Insertion);
        let now = SystemTime::now();
        cache.insert("a", json!(1), None, now);
        cache.insert("b", json!(2), None, now);
        cache.get("a", now);
        cache.insert("c", json!(3), None, now);
        assert!(cache.peek("a").is_none());
        assert!(cache.peek("b").is_some());
    }

    #[test]
    fn expired_entries_are_reclaimed_before_evicting_live_ones() {
        let cache = ns(2, Eviction::Insertion);
        let now = SystemTime::now();
        cache.insert("old", json!(1), Some(Duration::from_secs(1)), now);
        cache.insert("live", json!(2), None, now);
        let later = now + Duration::from_secs(2);
        cache.insert("new", json!(3), None, later);
        assert!(cache.peek("live").is_some());
        assert!(cache.peek("old").is_none());
    }

    #[test]
    fn overwrite_replaces_value_and_resets_hits() {
        let cache = ns(2, Eviction::LeastRecentlyUsed);
        let now = SystemTime::now();
        cache.insert("a", json!(1), None, now);
        cache.get("a", now);
        cache.insert("a", json!(2), None, now);
        let entry = cache.peek("a").unwrap();
        assert_eq!(entry.value, json!(2));
        assert_eq!(entry.hit_count, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn purge_expired_sweeps_without_reads() {
        let cache = ns(10, Eviction::LeastRecentlyUsed);
        let now = SystemTime::now();
        cache.insert("a", json!(1), Some(Duration::from_secs(1)), now);
        cache.insert("b", json!(2), Some(Duration::from_secs(100)), now);
        assert_eq!(cache.purge_expired(now + Duration::from_secs(10)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = ns(0, Eviction::LeastRecentlyUsed);
        let now = SystemTime::now();
        cache.insert("a", json!(1), None, now);
        assert!(cache.is_empty());
    }
}
