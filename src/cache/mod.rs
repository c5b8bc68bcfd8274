//! Tiered cache layer.
//!
//! Reads resolve through three tiers, first hit wins:
//!
//! 1. **Static** ([`Whitelist`]): read-only table of known names, consulted
//!    with the request text rather than a key.
//! 2. **Volatile** ([`VolatileNamespace`]): bounded in-process map per
//!    namespace, per-entry TTL.
//! 3. **Durable** ([`DurableStore`]): optional persistent store that mirrors
//!    every volatile write. A durable hit is promoted into the volatile tier
//!    with its original expiry.
//!
//! Writes go to the volatile and durable tiers, never the static one.
//!
//! Namespaces ([`Namespace`]) have independent TTLs and capacities: filling
//! one never evicts another's entries.
//!
//! # Concurrency
//!
//! [`TieredCache`] is `Send + Sync`; every namespace guards its own map with
//! a lock, so callers never need their own. Two identical requests racing on
//! a cold key may both miss and both write; the second write overwrites the
//! first with an equivalent value.

pub mod key;
pub mod store;
pub mod volatile;
pub mod whitelist;

pub use key::{CacheKey, StageSwitches, canonicalize, fingerprint};
pub use store::{DurableStore, FileStore, MemoryStore};
pub use volatile::{CacheEntry, VolatileNamespace};
pub use whitelist::{Whitelist, WhitelistEntry};

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock, unix_millis};
use crate::telemetry;
use crate::types::TaskKind;

/// A cache partition with its own TTL and size bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Final orchestrator results.
    Generation,
    /// Translated request text.
    Translation,
    /// Search-derived context snippets.
    Context,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [
        Namespace::Generation,
        Namespace::Translation,
        Namespace::Context,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Generation => "generation",
            Namespace::Translation => "translation",
            Namespace::Context => "context",
        }
    }

    fn index(&self) -> usize {
        match self {
            Namespace::Generation => 0,
            Namespace::Translation => 1,
            Namespace::Context => 2,
        }
    }
}

/// Which entry leaves first when a namespace is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Eviction {
    #[default]
    LeastRecentlyUsed,
    /// Oldest by insertion; reads do not refresh.
    Insertion,
}

/// Per-namespace limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub max_entries: usize,
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    #[serde(default)]
    pub eviction: Eviction,
}

impl NamespaceConfig {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl,
            eviction: Eviction::default(),
        }
    }

    pub fn eviction(mut self, eviction: Eviction) -> Self {
        self.eviction = eviction;
        self
    }
}

/// Limits for every namespace.
///
/// ```rust
/// # use huginn::cache::{CacheConfig, NamespaceConfig};
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .generation(NamespaceConfig::new(5_000, Duration::from_secs(3600)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default: 10,000 entries, 24 hours, LRU.
    pub generation: NamespaceConfig,
    /// Default: 500 entries, 6 hours, oldest-by-insertion.
    pub translation: NamespaceConfig,
    /// Default: 1,000 entries, 1 hour, LRU.
    pub context: NamespaceConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: NamespaceConfig::new(10_000, Duration::from_secs(24 * 3600)),
            translation: NamespaceConfig::new(500, Duration::from_secs(6 * 3600))
                .eviction(Eviction::Insertion),
            context: NamespaceConfig::new(1_000, Duration::from_secs(3600)),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(mut self, config: NamespaceConfig) -> Self {
        self.generation = config;
        self
    }

    pub fn translation(mut self, config: NamespaceConfig) -> Self {
        self.translation = config;
        self
    }

    pub fn context(mut self, config: NamespaceConfig) -> Self {
        self.context = config;
        self
    }

    pub fn namespace(&self, namespace: Namespace) -> &NamespaceConfig {
        match namespace {
            Namespace::Generation => &self.generation,
            Namespace::Translation => &self.translation,
            Namespace::Context => &self.context,
        }
    }
}

/// The tier that answered a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Static,
    Volatile,
    Durable,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Static => "static",
            CacheTier::Volatile => "volatile",
            CacheTier::Durable => "durable",
        }
    }
}

/// A successful read.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub value: Value,
    pub tier: CacheTier,
}

/// Volatile-tier counters for one namespace or all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Live entries.
    pub size: usize,
    pub total_hits: u64,
    /// `total_hits / size`, 0 when empty.
    pub average_hits: f64,
}

/// What the cache writes into the durable store.
#[derive(Debug, Serialize, Deserialize)]
struct DurableRecord {
    created_at_ms: u64,
    expires_at_ms: u64,
    value: Value,
}

/// Static + volatile + durable cache.
pub struct TieredCache {
    config: CacheConfig,
    whitelist: Whitelist,
    volatile: [VolatileNamespace; 3],
    durable: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
}

impl TieredCache {
    /// A cache with an empty static tier and no durable tier.
    pub fn new(config: CacheConfig) -> Self {
        let volatile = Namespace::ALL.map(|ns| VolatileNamespace::new(config.namespace(ns).clone()));
        Self {
            config,
            whitelist: Whitelist::new(),
            volatile,
            durable: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn with_durable(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub(crate) fn now(&self) -> SystemTime {
        self.clock.now()
    }

    fn namespace(&self, namespace: Namespace) -> &VolatileNamespace {
        &self.volatile[namespace.index()]
    }

    fn durable_key(namespace: Namespace, key: &CacheKey) -> String {
        format!("{}:{}", namespace.as_str(), key.as_str())
    }

    /// Static tier lookup for `task` on the raw request text.
    pub fn lookup_static(&self, task: TaskKind, input: &str) -> Option<CacheHit> {
        let entry = self.whitelist.lookup(task, input)?;
        metrics::counter!(telemetry::CACHE_HITS_TOTAL,
            "tier" => CacheTier::Static.as_str(),
            "namespace" => Namespace::Generation.as_str(),
        )
        .increment(1);
        Some(CacheHit {
            value: Value::String(entry.answer.clone()),
            tier: CacheTier::Static,
        })
    }

    /// Volatile then durable lookup. Durable failures count as misses.
    pub async fn get(&self, namespace: Namespace, key: &CacheKey) -> Option<CacheHit> {
        let now = self.now();
        if let Some(value) = self.namespace(namespace).get(key.as_str(), now) {
            record_hit(CacheTier::Volatile, namespace);
            return Some(CacheHit {
                value,
                tier: CacheTier::Volatile,
            });
        }

        if let Some(hit) = self.get_durable(namespace, key, now).await {
            record_hit(CacheTier::Durable, namespace);
            return Some(hit);
        }

        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "namespace" => namespace.as_str())
            .increment(1);
        None
    }

    async fn get_durable(
        &self,
        namespace: Namespace,
        key: &CacheKey,
        now: SystemTime,
    ) -> Option<CacheHit> {
        let store = self.durable.as_ref()?;
        let durable_key = Self::durable_key(namespace, key);
        let raw = match store.get(&durable_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(store = store.name(), namespace = namespace.as_str(), error = %e, "durable read failed");
                return None;
            }
        };
        let record: DurableRecord = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(store = store.name(), error = %e, "discarding unreadable durable record");
                let _ = store.delete(&durable_key).await;
                return None;
            }
        };
        if record.expires_at_ms <= unix_millis(now) {
            let _ = store.delete(&durable_key).await;
            return None;
        }

        let created_at = SystemTime::UNIX_EPOCH + Duration::from_millis(record.created_at_ms);
        let expires_at = SystemTime::UNIX_EPOCH + Duration::from_millis(record.expires_at_ms);
        self.namespace(namespace).insert_with_expiry(
            key.as_str(),
            record.value.clone(),
            created_at,
            expires_at,
            now,
        );
        debug!(namespace = namespace.as_str(), "promoted durable entry");
        Some(CacheHit {
            value: record.value,
            tier: CacheTier::Durable,
        })
    }

    /// Write to the volatile and durable tiers. `ttl` defaults to the namespace TTL.
    pub async fn set(
        &self,
        namespace: Namespace,
        key: &CacheKey,
        value: Value,
        ttl: Option<Duration>,
    ) {
        let now = self.now();
        let ttl = ttl.unwrap_or(self.config.namespace(namespace).ttl);
        self.namespace(namespace)
            .insert(key.as_str(), value.clone(), Some(ttl), now);

        let Some(store) = &self.durable else {
            return;
        };
        let record = DurableRecord {
            created_at_ms: unix_millis(now),
            expires_at_ms: unix_millis(now + ttl),
            value,
        };
        let result = match serde_json::to_string(&record) {
            Ok(raw) => store.put(&Self::durable_key(namespace, key), raw, ttl).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(store = store.name(), namespace = namespace.as_str(), error = %e, "durable write failed");
        }
    }

    /// Remove one key from the volatile and durable tiers.
    pub async fn remove(&self, namespace: Namespace, key: &CacheKey) {
        self.namespace(namespace).remove(key.as_str());
        if let Some(store) = &self.durable
            && let Err(e) = store.delete(&Self::durable_key(namespace, key)).await
        {
            warn!(store = store.name(), error = %e, "durable delete failed");
        }
    }

    /// Clear one namespace, or every namespace when `None`.
    pub async fn clear(&self, namespace: Option<Namespace>) {
        let targets: Vec<Namespace> = match namespace {
            Some(ns) => vec![ns],
            None => Namespace::ALL.to_vec(),
        };
        for ns in &targets {
            self.namespace(*ns).clear();
        }
        if let Some(store) = &self.durable {
            let result = match namespace {
                Some(ns) => store.clear(Some(&format!("{}:", ns.as_str()))).await,
                None => store.clear(None).await,
            };
            if let Err(e) = result {
                warn!(store = store.name(), error = %e, "durable clear failed");
            }
        }
    }

    /// Live-entry stats for one namespace or summed over all.
    pub fn stats(&self, namespace: Option<Namespace>) -> CacheStats {
        let now = self.now();
        let (size, total_hits) = match namespace {
            Some(ns) => self.namespace(ns).live_stats(now),
            None => Namespace::ALL
                .iter()
                .map(|ns| self.namespace(*ns).live_stats(now))
                .fold((0, 0), |(s, h), (s2, h2)| (s + s2, h + h2)),
        };
        let average_hits = if size == 0 {
            0.0
        } else {
            total_hits as f64 / size as f64
        };
        CacheStats {
            size,
            total_hits,
            average_hits,
        }
    }

    /// Sweep expired entries out of every volatile namespace.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        Namespace::ALL
            .iter()
            .map(|ns| self.namespace(*ns).purge_expired(now))
            .sum()
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until the
    /// handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        })
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("static_entries", &self.whitelist.len())
            .field("durable", &self.durable.as_ref().map(|s| s.name().to_owned()))
            .field("stats", &self.stats(None))
            .finish()
    }
}

fn record_hit(tier: CacheTier, namespace: Namespace) {
    metrics::counter!(telemetry::CACHE_HITS_TOTAL,
        "tier" => tier.as_str(),
        "namespace" => namespace.as_str(),
    )
    .increment(1);
}

/// Serde helper: durations as whole seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
