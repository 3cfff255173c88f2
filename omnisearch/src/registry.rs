//! Source registry: configuration plus per-source runtime state.
//!
//! Each registered id owns exactly one [`SourceEntry`], which bundles the
//! source's config, [`HealthTracker`], [`StatsCollector`] and
//! [`RateLimiter`]. All four are created together on registration and
//! dropped together on unregistration.
//!
//! Locking is per source: the registry map lock is only held to look up or
//! replace entries, and each entry guards its own state, so concurrent
//! calls against different sources never contend. No lock is held across
//! an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::SearchError;
use crate::health::{HealthTracker, HealthTransition, SourceHealth};
use crate::rate_limiter::{RateLimitStatus, RateLimiter};
use crate::stats::{AggregateStats, SourceStats, StatsCollector};
use crate::types::{Capability, SourceCategory, SourceConfig, SourceUpdate};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

/// Config and runtime state of one registered source.
#[derive(Debug)]
pub struct SourceEntry {
    /// Registration order, used to break priority ties.
    seq: u64,
    config: RwLock<SourceConfig>,
    health: Mutex<HealthTracker>,
    stats: Mutex<StatsCollector>,
    limiter: Mutex<RateLimiter>,
}

impl SourceEntry {
    fn new(config: SourceConfig, seq: u64) -> Self {
        Self {
            seq,
            health: Mutex::new(HealthTracker::new(config.id.clone())),
            stats: Mutex::new(StatsCollector::new(config.id.clone())),
            limiter: Mutex::new(RateLimiter::new(&config.rate_limit)),
            config: RwLock::new(config),
        }
    }

    pub fn config(&self) -> SourceConfig {
        read(&self.config).clone()
    }

    pub fn id(&self) -> String {
        read(&self.config).id.clone()
    }

    pub fn is_enabled(&self) -> bool {
        read(&self.config).enabled
    }

    pub fn is_healthy(&self) -> bool {
        lock(&self.health).is_healthy()
    }

    /// Ask the rate limiter to admit one request.
    pub fn try_acquire(&self) -> bool {
        lock(&self.limiter).try_acquire()
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        lock(&self.limiter).status()
    }

    /// Record a successful search in stats and health.
    pub fn record_success(&self, latency_ms: f64, result_count: usize) -> HealthTransition {
        lock(&self.stats).update_stats(true, latency_ms, result_count);
        lock(&self.health).record_success(latency_ms)
    }

    /// Record a search whose retries were exhausted.
    pub fn record_failure(&self, latency_ms: f64, error: &str) -> HealthTransition {
        lock(&self.stats).update_stats(false, latency_ms, 0);
        lock(&self.health).record_failure(Some(error))
    }

    /// Record a probe outcome. Probes affect health only, not usage stats.
    pub fn record_probe(&self, healthy: bool, latency_ms: f64, error: Option<&str>) -> HealthTransition {
        let mut health = lock(&self.health);
        if healthy {
            health.record_success(latency_ms)
        } else {
            health.record_failure(error)
        }
    }

    pub fn health(&self) -> SourceHealth {
        lock(&self.health).snapshot()
    }

    pub fn stats(&self) -> SourceStats {
        lock(&self.stats).snapshot()
    }
}

/// All registered sources, keyed by id.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Arc<SourceEntry>>>,
    next_seq: AtomicU64,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a source, creating fresh health, stats and
    /// rate-limit state for it.
    ///
    /// Returns `true` if an existing source with the same id was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the config fails validation.
    pub fn register(&self, config: SourceConfig) -> Result<bool, SearchError> {
        config.validate()?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = config.id.clone();
        let entry = Arc::new(SourceEntry::new(config, seq));
        Ok(write(&self.sources).insert(id, entry).is_some())
    }

    /// Remove a source and all of its state.
    pub fn unregister(&self, id: &str) -> Option<SourceConfig> {
        write(&self.sources).remove(id).map(|entry| entry.config())
    }

    /// Merge a partial update into a source.
    ///
    /// The rate limiter is rebuilt (counters reset) only when the
    /// rate-limit fields change. Health and stats are kept.
    ///
    /// # Errors
    ///
    /// [`SearchError::UnknownSource`] if `id` is not registered, or
    /// [`SearchError::Config`] if the merged config is invalid (in which
    /// case nothing is changed).
    pub fn update(&self, id: &str, update: SourceUpdate) -> Result<SourceConfig, SearchError> {
        let entry = self.require(id)?;
        let mut config = write(&entry.config);
        let mut merged = config.clone();
        let rate_limit_changed = update.apply_to(&mut merged);
        // The id is the registry key; an update must not move it.
        merged.id = config.id.clone();
        merged.validate()?;

        if rate_limit_changed {
            *lock(&entry.limiter) = RateLimiter::new(&merged.rate_limit);
        }
        *config = merged.clone();
        Ok(merged)
    }

    /// Enable or disable a source without touching its state.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<SourceConfig, SearchError> {
        let entry = self.require(id)?;
        let mut config = write(&entry.config);
        config.enabled = enabled;
        Ok(config.clone())
    }

    pub fn entry(&self, id: &str) -> Option<Arc<SourceEntry>> {
        read(&self.sources).get(id).cloned()
    }

    /// Look up an entry or fail with [`SearchError::UnknownSource`].
    pub fn require(&self, id: &str) -> Result<Arc<SourceEntry>, SearchError> {
        self.entry(id)
            .ok_or_else(|| SearchError::UnknownSource(id.to_owned()))
    }

    pub fn get(&self, id: &str) -> Option<SourceConfig> {
        self.entry(id).map(|e| e.config())
    }

    pub fn contains(&self, id: &str) -> bool {
        read(&self.sources).contains_key(id)
    }

    pub fn len(&self) -> usize {
        read(&self.sources).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry, in registration order.
    pub fn entries(&self) -> Vec<Arc<SourceEntry>> {
        let mut entries: Vec<_> = read(&self.sources).values().cloned().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    /// Every entry sorted by priority (descending), ties in registration order.
    pub(crate) fn entries_by_priority(&self) -> Vec<(Arc<SourceEntry>, SourceConfig)> {
        let mut entries: Vec<_> = self
            .entries()
            .into_iter()
            .map(|e| {
                let config = e.config();
                (e, config)
            })
            .collect();
        // Stable sort keeps registration order among equal priorities.
        entries.sort_by(|a, b| b.1.priority.cmp(&a.1.priority));
        entries
    }

    pub fn all_sources(&self) -> Vec<SourceConfig> {
        self.entries().iter().map(|e| e.config()).collect()
    }

    pub fn enabled_sources(&self) -> Vec<SourceConfig> {
        self.all_sources().into_iter().filter(|c| c.enabled).collect()
    }

    pub fn sources_by_category(&self, category: SourceCategory) -> Vec<SourceConfig> {
        self.all_sources()
            .into_iter()
            .filter(|c| c.category == category)
            .collect()
    }

    pub fn sources_with_capability(&self, capability: Capability) -> Vec<SourceConfig> {
        self.all_sources()
            .into_iter()
            .filter(|c| c.capabilities.contains(&capability))
            .collect()
    }

    /// Enabled sources whose health tracker currently reports healthy.
    pub fn healthy_sources(&self) -> Vec<SourceConfig> {
        self.entries()
            .iter()
            .filter(|e| e.is_healthy())
            .map(|e| e.config())
            .filter(|c| c.enabled)
            .collect()
    }

    pub fn health(&self, id: &str) -> Option<SourceHealth> {
        self.entry(id).map(|e| e.health())
    }

    pub fn all_health(&self) -> Vec<SourceHealth> {
        self.entries().iter().map(|e| e.health()).collect()
    }

    pub fn stats(&self, id: &str) -> Option<SourceStats> {
        self.entry(id).map(|e| e.stats())
    }

    pub fn all_stats(&self) -> Vec<SourceStats> {
        self.entries().iter().map(|e| e.stats()).collect()
    }

    pub fn aggregate_stats(&self) -> AggregateStats {
        let entries = self.entries();
        let healthy = entries.iter().filter(|e| e.is_healthy()).count();
        let stats: Vec<SourceStats> = entries.iter().map(|e| e.stats()).collect();
        AggregateStats::from_sources(&stats, healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RateLimitConfig, SourceType};

    fn source(id: &str, category: SourceCategory, priority: i32) -> SourceConfig {
        SourceConfig::new(id, id.to_uppercase(), category, SourceType::Api, "https://example.com")
            .with_priority(priority)
    }

    fn trip(entry: &SourceEntry) {
        for _ in 0..7 {
            entry.record_failure(1.0, "boom");
        }
        assert!(!entry.is_healthy());
    }

    #[test]
    fn register_creates_all_state() {
        let registry = SourceRegistry::new();
        assert!(!registry.register(source("a", SourceCategory::News, 1)).unwrap());
        assert!(registry.contains("a"));
        assert!(registry.health("a").unwrap().is_healthy);
        assert_eq!(registry.stats("a").unwrap().total_requests, 0);
        assert_eq!(
            registry.entry("a").unwrap().rate_limit_status().minute_remaining,
            Some(60)
        );
    }

    #[test]
    fn register_rejects_invalid_config() {
        let registry = SourceRegistry::new();
        let err = registry.register(source("", SourceCategory::News, 1)).unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn reregistration_replaces_state() {
        let registry = SourceRegistry::new();
        registry.register(source("a", SourceCategory::News, 1)).unwrap();
        registry.entry("a").unwrap().record_success(10.0, 3);
        assert!(registry.register(source("a", SourceCategory::News, 5)).unwrap());
        assert_eq!(registry.stats("a").unwrap().total_requests, 0);
        assert_eq!(registry.get("a").unwrap().priority, 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes_everything() {
        let registry = SourceRegistry::new();
        registry.register(source("a", SourceCategory::News, 1)).unwrap();
        let removed = registry.unregister("a").expect("was registered");
        assert_eq!(removed.id, "a");
        assert!(registry.get("a").is_none());
        assert!(registry.health("a").is_none());
        assert!(registry.stats("a").is_none());
        assert!(registry.unregister("a").is_none());
    }

    #[test]
    fn update_unknown_source_fails() {
        let registry = SourceRegistry::new();
        let err = registry.update("nope", SourceUpdate::default()).unwrap_err();
        assert!(matches!(err, SearchError::UnknownSource(_)));
    }

    #[test]
    fn update_rebuilds_limiter_only_on_rate_change() {
        let registry = SourceRegistry::new();
        registry.register(source("a", SourceCategory::News, 1)).unwrap();
        let entry = registry.entry("a").unwrap();
        assert!(entry.try_acquire());
        assert_eq!(entry.rate_limit_status().minute_remaining, Some(59));

        registry
            .update("a", SourceUpdate { priority: Some(3), ..Default::default() })
            .unwrap();
        assert_eq!(entry.rate_limit_status().minute_remaining, Some(59));

        registry
            .update(
                "a",
                SourceUpdate {
                    rate_limit: Some(RateLimitConfig {
                        requests_per_minute: 10,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(entry.rate_limit_status().minute_remaining, Some(10));
        assert_eq!(registry.get("a").unwrap().priority, 3);
    }

    #[test]
    fn invalid_update_leaves_config_untouched() {
        let registry = SourceRegistry::new();
        registry.register(source("a", SourceCategory::News, 1)).unwrap();
        let bad = SourceUpdate {
            rate_limit: Some(RateLimitConfig {
                requests_per_minute: 0,
                ..Default::default()
            }),
            priority: Some(9),
            ..Default::default()
        };
        assert!(registry.update("a", bad).is_err());
        assert_eq!(registry.get("a").unwrap().priority, 1);
    }

    #[test]
    fn set_enabled_keeps_state() {
        let registry = SourceRegistry::new();
        registry.register(source("a", SourceCategory::News, 1)).unwrap();
        registry.entry("a").unwrap().record_success(5.0, 2);
        registry.set_enabled("a", false).unwrap();
        assert!(registry.enabled_sources().is_empty());
        assert_eq!(registry.stats("a").unwrap().total_requests, 1);
        registry.set_enabled("a", true).unwrap();
        assert_eq!(registry.enabled_sources().len(), 1);
    }

    #[test]
    fn filtered_views() {
        let registry = SourceRegistry::new();
        registry
            .register(
                source("a", SourceCategory::Academic, 1).with_capabilities([Capability::DateFilter]),
            )
            .unwrap();
        registry.register(source("b", SourceCategory::News, 2)).unwrap();
        registry.register(source("c", SourceCategory::Academic, 3).disabled()).unwrap();

        let ids = |v: Vec<SourceConfig>| v.into_iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids(registry.all_sources()), ["a", "b", "c"]);
        assert_eq!(ids(registry.enabled_sources()), ["a", "b"]);
        assert_eq!(ids(registry.sources_by_category(SourceCategory::Academic)), ["a", "c"]);
        assert_eq!(ids(registry.sources_with_capability(Capability::DateFilter)), ["a"]);

        trip(&registry.entry("b").unwrap());
        assert_eq!(ids(registry.healthy_sources()), ["a"]);
    }

    #[test]
    fn priority_order_breaks_ties_by_registration() {
        let registry = SourceRegistry::new();
        registry.register(source("low", SourceCategory::News, 1)).unwrap();
        registry.register(source("first", SourceCategory::News, 5)).unwrap();
        registry.register(source("second", SourceCategory::News, 5)).unwrap();
        let order: Vec<_> = registry
            .entries_by_priority()
            .into_iter()
            .map(|(_, c)| c.id)
            .collect();
        assert_eq!(order, ["first", "second", "low"]);
    }

    #[test]
    fn probe_updates_health_but_not_stats() {
        let registry = SourceRegistry::new();
        registry.register(source("a", SourceCategory::News, 1)).unwrap();
        let entry = registry.entry("a").unwrap();
        entry.record_probe(false, 0.0, Some("down"));
        assert_eq!(entry.health().last_error.as_deref(), Some("down"));
        assert_eq!(entry.stats().total_requests, 0);
    }

    #[test]
    fn aggregate_counts_healthy_sources() {
        let registry = SourceRegistry::new();
        registry.register(source("a", SourceCategory::News, 1)).unwrap();
        registry.register(source("b", SourceCategory::News, 1)).unwrap();
        registry.entry("a").unwrap().record_success(100.0, 4);
        trip(&registry.entry("b").unwrap());

        let agg = registry.aggregate_stats();
        assert_eq!(agg.total_sources, 2);
        assert_eq!(agg.healthy_sources, 1);
        assert_eq!(agg.total_requests, 8);
        assert_eq!(agg.successful_requests, 1);
        assert_eq!(agg.total_results, 4);
    }
}
