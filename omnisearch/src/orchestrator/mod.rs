//! Search orchestrator: source registry, fan-out, dedup, scoring, probes.
//!
//! [`SearchOrchestrator`] is a cheaply cloneable handle. All clones share
//! one registry, cache, event bus and probe supervisor.

pub mod aggregate;
pub mod dedup;
mod probe;
pub mod retry;
mod search;
pub mod selection;
pub mod url_normalize;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::adapter::{SearchAdapter, SourceQualityScorer};
use crate::cache::ResultCache;
use crate::config::{OrchestratorConfig, RegistryFile};
use crate::error::SearchError;
use crate::events::{EventBus, OrchestratorEvent};
use crate::health::SourceHealth;
use crate::rate_limiter::RateLimitStatus;
use crate::registry::SourceRegistry;
use crate::stats::{AggregateStats, SourceStats};
use crate::types::{ScoredResult, SearchQuery, SourceConfig, SourceResult, SourceResultMap, SourceUpdate};

use probe::ProbeSupervisor;
pub use selection::SearchOptions;

/// State shared by every clone of the orchestrator and by its probe tasks.
pub(crate) struct Shared {
    pub(crate) config: OrchestratorConfig,
    pub(crate) registry: SourceRegistry,
    pub(crate) cache: ResultCache,
    pub(crate) events: EventBus,
    adapters: RwLock<HashMap<String, Arc<dyn SearchAdapter>>>,
    scorer: RwLock<Option<Arc<dyn SourceQualityScorer>>>,
}

impl Shared {
    pub(crate) fn adapter(&self, source_id: &str) -> Option<Arc<dyn SearchAdapter>> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
            .cloned()
    }

    pub(crate) fn scorer(&self) -> Option<Arc<dyn SourceQualityScorer>> {
        self.scorer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Federated search over a registry of heterogeneous sources.
///
/// Construct one explicitly and share clones of it; there is no global
/// instance. Call [`start`](Self::start) to run health probes and
/// [`shutdown`](Self::shutdown) to stop them.
///
/// # Examples
///
/// ```no_run
/// use omnisearch::{
///     OrchestratorConfig, SearchOptions, SearchOrchestrator, SearchQuery, SourceCategory,
///     SourceConfig, SourceType,
/// };
///
/// # async fn example() -> omnisearch::Result<()> {
/// let orchestrator = SearchOrchestrator::new(OrchestratorConfig::default())?;
/// orchestrator.register_source(
///     SourceConfig::new("arxiv", "arXiv", SourceCategory::Academic, SourceType::Api, "https://export.arxiv.org")
///         .with_priority(10),
/// )?;
/// let results = orchestrator
///     .search_sources(&SearchQuery::new("rust async"), &SearchOptions::default())
///     .await?;
/// println!("{} results", results.total_results());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SearchOrchestrator {
    shared: Arc<Shared>,
    probes: Arc<ProbeSupervisor>,
}

impl SearchOrchestrator {
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `config` fails validation.
    pub fn new(config: OrchestratorConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let shared = Shared {
            cache: ResultCache::new(config.cache_ttl_seconds, config.cache_max_entries),
            events: EventBus::new(config.event_capacity),
            registry: SourceRegistry::new(),
            adapters: RwLock::new(HashMap::new()),
            scorer: RwLock::new(None),
            config,
        };
        Ok(Self {
            shared: Arc::new(shared),
            probes: Arc::new(ProbeSupervisor::default()),
        })
    }

    /// Build an orchestrator and register every source in `file`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the file or any source is invalid.
    pub fn from_registry_file(file: RegistryFile) -> Result<Self, SearchError> {
        file.validate()?;
        let orchestrator = Self::new(file.orchestrator)?;
        for source in file.sources {
            orchestrator.register_source(source)?;
        }
        Ok(orchestrator)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Attach the adapter used to query `source_id`.
    ///
    /// Adapters are keyed independently of registrations, so one may be
    /// attached before its source is registered and survives
    /// re-registration.
    pub fn register_adapter(&self, source_id: impl Into<String>, adapter: Arc<dyn SearchAdapter>) {
        self.shared
            .adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source_id.into(), adapter);
    }

    /// Install the scorer used by [`get_aggregated_results`](Self::get_aggregated_results).
    pub fn set_scorer(&self, scorer: Arc<dyn SourceQualityScorer>) {
        *self
            .shared
            .scorer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(scorer);
    }

    // ── Registry ────────────────────────────────────────────────────────

    /// Register a source, or replace one with the same id.
    ///
    /// Replacement resets the source's health, stats and rate-limit state.
    /// While running, the source's probe is (re)started.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the config is invalid.
    pub fn register_source(&self, config: SourceConfig) -> Result<(), SearchError> {
        let replaced = self.shared.registry.register(config.clone())?;
        tracing::info!(source_id = %config.id, replaced, "source registered");
        self.probes.respawn(&self.shared, &config);
        self.shared.events.emit(OrchestratorEvent::SourceRegistered {
            source_id: config.id,
        });
        Ok(())
    }

    /// Remove a source with all of its state and stop its probe.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::UnknownSource`] if `source_id` is not registered.
    pub fn unregister_source(&self, source_id: &str) -> Result<SourceConfig, SearchError> {
        let removed = self
            .shared
            .registry
            .unregister(source_id)
            .ok_or_else(|| SearchError::UnknownSource(source_id.to_owned()))?;
        self.probes.stop(source_id);
        tracing::info!(source_id, "source unregistered");
        self.shared.events.emit(OrchestratorEvent::SourceUnregistered {
            source_id: source_id.to_owned(),
        });
        Ok(removed)
    }

    /// Merge a partial update into a source.
    ///
    /// # Errors
    ///
    /// [`SearchError::UnknownSource`] or [`SearchError::Config`]; on error
    /// nothing changes.
    pub fn update_source(&self, source_id: &str, update: SourceUpdate) -> Result<SourceConfig, SearchError> {
        let interval_changed = update.health_check_interval_secs.is_some();
        let updated = self.shared.registry.update(source_id, update)?;
        if interval_changed {
            self.probes.respawn(&self.shared, &updated);
        }
        tracing::debug!(source_id, "source updated");
        self.shared.events.emit(OrchestratorEvent::SourceUpdated {
            source_id: source_id.to_owned(),
        });
        Ok(updated)
    }

    /// Enable or disable a source, keeping its state.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::UnknownSource`] if `source_id` is not registered.
    pub fn set_source_enabled(&self, source_id: &str, enabled: bool) -> Result<SourceConfig, SearchError> {
        let updated = self.shared.registry.set_enabled(source_id, enabled)?;
        tracing::info!(source_id, enabled, "source toggled");
        self.shared.events.emit(OrchestratorEvent::SourceToggled {
            source_id: source_id.to_owned(),
            enabled,
        });
        Ok(updated)
    }

    pub fn get_source(&self, source_id: &str) -> Option<SourceConfig> {
        self.shared.registry.get(source_id)
    }

    /// The registry, for read-only views such as sources by category.
    pub fn registry(&self) -> &SourceRegistry {
        &self.shared.registry
    }

    // ── Search ──────────────────────────────────────────────────────────

    /// Sources a fan-out with `options` would query right now, in order.
    pub fn select_sources(&self, options: &SearchOptions) -> Vec<SourceConfig> {
        selection::select_sources(&self.shared.registry, options, self.shared.config.max_sources)
    }

    /// Query every selected source; see [`SearchOptions`] for filters.
    ///
    /// # Errors
    ///
    /// Only configuration errors. Per-source failures yield empty lists.
    pub async fn search_sources(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SourceResultMap, SearchError> {
        self.shared.search_sources(query, options).await
    }

    /// Query a single source.
    ///
    /// A rate-limited source yields `Ok` with no results.
    ///
    /// # Errors
    ///
    /// [`SearchError::UnknownSource`], [`SearchError::SourceDisabled`], or
    /// the adapter's last error once retries are exhausted.
    pub async fn search_source(
        &self,
        source_id: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SourceResult>, SearchError> {
        self.shared.search_source(source_id, query).await
    }

    /// Fan out, flatten in selection order, score and rank.
    ///
    /// # Errors
    ///
    /// [`SearchError::Config`] if no scorer is set; scorer errors propagate.
    pub async fn get_aggregated_results(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        self.shared.aggregated_results(query, options).await
    }

    // ── Health & stats ──────────────────────────────────────────────────

    pub fn get_source_health(&self, source_id: &str) -> Option<SourceHealth> {
        self.shared.registry.health(source_id)
    }

    pub fn get_all_health_status(&self) -> Vec<SourceHealth> {
        self.shared.registry.all_health()
    }

    pub fn get_source_stats(&self, source_id: &str) -> Option<SourceStats> {
        self.shared.registry.stats(source_id)
    }

    pub fn get_all_stats(&self) -> Vec<SourceStats> {
        self.shared.registry.all_stats()
    }

    pub fn get_aggregate_stats(&self) -> AggregateStats {
        self.shared.registry.aggregate_stats()
    }

    pub fn rate_limit_status(&self, source_id: &str) -> Option<RateLimitStatus> {
        self.shared
            .registry
            .entry(source_id)
            .map(|entry| entry.rate_limit_status())
    }

    /// Probe one source now and return its updated health.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::UnknownSource`] if `source_id` is not registered.
    pub async fn check_health(&self, source_id: &str) -> Result<SourceHealth, SearchError> {
        let entry = self.shared.registry.require(source_id)?;
        self.shared.probe_source(&entry).await;
        Ok(entry.health())
    }

    // ── Cache, events, lifecycle ────────────────────────────────────────

    pub fn clear_cache(&self) {
        self.shared.cache.clear();
        tracing::debug!("result cache cleared");
    }

    pub async fn cached_entry_count(&self) -> u64 {
        self.shared.cache.entry_count().await
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.shared.events.subscribe()
    }

    /// Start health probes for every source with an interval.
    ///
    /// Returns the number of probes spawned. Idempotent while running.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] when called outside a tokio runtime.
    pub fn start(&self) -> Result<usize, SearchError> {
        self.probes.start(&self.shared)
    }

    pub fn is_running(&self) -> bool {
        self.probes.is_running()
    }

    /// Number of live probe tasks.
    pub fn active_probes(&self) -> usize {
        self.probes.active_count()
    }

    /// Cancel and join every probe, clear the cache, emit `shutdown`.
    pub async fn shutdown(&self) {
        self.probes.shutdown().await;
        self.shared.cache.clear();
        tracing::info!("orchestrator shut down");
        self.shared.events.emit(OrchestratorEvent::Shutdown);
    }
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("config", &self.shared.config)
            .field("sources", &self.shared.registry.len())
            .field("cache", &self.shared.cache)
            .field("probes", &self.probes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SourceCategory, SourceType};

    fn source(id: &str) -> SourceConfig {
        SourceConfig::new(id, id, SourceCategory::News, SourceType::Rss, "https://example.com/feed")
    }

    fn drain(rx: &mut broadcast::Receiver<OrchestratorEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = OrchestratorConfig {
            max_concurrent_requests: 0,
            ..Default::default()
        };
        assert!(SearchOrchestrator::new(config).is_err());
    }

    #[test]
    fn registry_operations_emit_events() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        let mut rx = orch.subscribe();

        orch.register_source(source("a")).unwrap();
        orch.update_source("a", SourceUpdate { priority: Some(4), ..Default::default() })
            .unwrap();
        orch.set_source_enabled("a", false).unwrap();
        orch.unregister_source("a").unwrap();

        assert_eq!(
            drain(&mut rx),
            ["source-registered", "source-updated", "source-toggled", "source-unregistered"]
        );
    }

    #[test]
    fn failed_operations_emit_nothing() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        let mut rx = orch.subscribe();
        assert!(orch.unregister_source("ghost").is_err());
        assert!(orch.set_source_enabled("ghost", true).is_err());
        assert!(orch.register_source(source(" ")).is_err());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn unregister_drops_health_and_stats() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        orch.register_source(source("a")).unwrap();
        orch.unregister_source("a").unwrap();
        assert!(orch.get_source("a").is_none());
        assert!(orch.get_source_health("a").is_none());
        assert!(orch.get_source_stats("a").is_none());
        assert!(orch.rate_limit_status("a").is_none());
    }

    #[test]
    fn clones_share_state() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        let clone = orch.clone();
        clone.register_source(source("a")).unwrap();
        assert!(orch.get_source("a").is_some());
    }

    #[test]
    fn start_outside_runtime_fails() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        assert!(orch.start().unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn aggregated_results_require_a_scorer() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        let err = orch
            .get_aggregated_results(&SearchQuery::new("q"), &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[tokio::test]
    async fn shutdown_emits_and_clears_cache() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        orch.register_source(source("a")).unwrap();
        orch.search_source("a", &SearchQuery::new("q")).await.unwrap();
        assert_eq!(orch.cached_entry_count().await, 1);

        let mut rx = orch.subscribe();
        orch.start().unwrap();
        orch.shutdown().await;
        assert_eq!(orch.cached_entry_count().await, 0);
        assert_eq!(drain(&mut rx), ["shutdown"]);
    }
}
