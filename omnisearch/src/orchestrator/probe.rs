//! Periodic health probes.
//!
//! Every source with a health-check interval gets one background task
//! while the orchestrator is running. A probe calls the adapter's
//! `health_check`, or a one-result query when the adapter has none, and
//! feeds the outcome into the source's health tracker. This is how an
//! unhealthy source recovers without organic traffic.
//!
//! Each task owns a child of the supervisor's root
//! [`CancellationToken`]. Replacing or removing a source cancels its task;
//! `shutdown` cancels the root and joins every task ever spawned, so no
//! probe outlives the orchestrator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{DefaultAdapter, SearchAdapter};
use crate::error::SearchError;
use crate::events::OrchestratorEvent;
use crate::health::HealthTransition;
use crate::registry::SourceEntry;
use crate::types::{SearchQuery, SourceConfig};

use super::Shared;
use super::retry::with_timeout;

/// Query text used when an adapter has no dedicated health check.
const FALLBACK_PROBE_QUERY: &str = "test";

impl Shared {
    /// Run one probe against `entry` and record the outcome.
    ///
    /// Returns whether the source answered healthily.
    pub(crate) async fn probe_source(&self, entry: &SourceEntry) -> bool {
        let config = entry.config();
        let adapter: Arc<dyn SearchAdapter> = match self.adapter(&config.id) {
            Some(adapter) => adapter,
            None => Arc::new(DefaultAdapter),
        };

        let started = Instant::now();
        let outcome = with_timeout(check(adapter.as_ref(), &config), config.timeout(), &config.id).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let error = match outcome {
            Ok(true) => None,
            Ok(false) => Some("health check reported unhealthy".to_owned()),
            Err(err) => Some(err.to_string()),
        };
        let healthy = error.is_none();
        let transition = entry.record_probe(healthy, latency_ms, error.as_deref());

        if !healthy {
            warn!(source_id = %config.id, error = ?error, "health check failed");
            self.events.emit(OrchestratorEvent::HealthCheckFailed {
                source_id: config.id.clone(),
                error: error.clone(),
            });
        }
        match transition {
            HealthTransition::BecameUnhealthy => {
                warn!(source_id = %config.id, "source marked unhealthy by probe");
                self.events.emit(OrchestratorEvent::SourceUnhealthy {
                    source_id: config.id.clone(),
                    last_error: error,
                });
            }
            HealthTransition::Recovered => {
                info!(source_id = %config.id, "source recovered after probe");
            }
            HealthTransition::Unchanged => {}
        }
        healthy
    }
}

async fn check(adapter: &dyn SearchAdapter, config: &SourceConfig) -> Result<bool, SearchError> {
    if let Some(healthy) = adapter.health_check(config).await {
        return Ok(healthy);
    }
    let query = SearchQuery::new(FALLBACK_PROBE_QUERY).with_limit(1);
    adapter.search(&query, config).await.map(|_| true)
}

/// Probe `source_id` every `interval` until `cancel` fires or the source
/// is unregistered. Disabled sources are skipped but keep their task.
async fn run_probe_loop(
    shared: Arc<Shared>,
    source_id: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    debug!(source_id, interval_secs = interval.as_secs(), "health probe started");
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {
                let Some(entry) = shared.registry.entry(&source_id) else {
                    break;
                };
                if !entry.is_enabled() {
                    continue;
                }
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = shared.probe_source(&entry) => {}
                }
            }
        }
    }
    debug!(source_id, "health probe stopped");
}

struct ProbeTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct ProbeState {
    runtime: Option<Handle>,
    root: CancellationToken,
    tasks: HashMap<String, ProbeTask>,
    /// Cancelled tasks not yet joined.
    retired: Vec<JoinHandle<()>>,
}

impl ProbeState {
    fn retire(&mut self, source_id: &str) {
        if let Some(task) = self.tasks.remove(source_id) {
            task.cancel.cancel();
            self.retired.push(task.handle);
        }
    }
}

/// Owns the probe tasks of one orchestrator.
#[derive(Default)]
pub(crate) struct ProbeSupervisor {
    state: Mutex<ProbeState>,
}

impl ProbeSupervisor {
    fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state().runtime.is_some()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.state().tasks.len()
    }

    /// Start probing every registered source that has an interval.
    ///
    /// Returns the number of probes spawned; calling it again while
    /// running spawns nothing.
    pub(crate) fn start(&self, shared: &Arc<Shared>) -> Result<usize, SearchError> {
        let runtime = Handle::try_current()
            .map_err(|e| SearchError::Config(format!("start requires a tokio runtime: {e}")))?;
        {
            let mut state = self.state();
            if state.runtime.is_some() {
                return Ok(0);
            }
            state.runtime = Some(runtime);
            state.root = CancellationToken::new();
        }

        let spawned = shared
            .registry
            .all_sources()
            .iter()
            .filter(|config| self.respawn(shared, config))
            .count();
        info!(probes = spawned, "orchestrator started");
        Ok(spawned)
    }

    /// (Re)start the probe for `config` if the supervisor is running.
    ///
    /// Any existing probe for the id is cancelled first. Returns `true` if
    /// a new probe was spawned.
    pub(crate) fn respawn(&self, shared: &Arc<Shared>, config: &SourceConfig) -> bool {
        let mut state = self.state();
        state.retire(&config.id);
        let (Some(runtime), Some(interval)) = (state.runtime.clone(), config.health_check_interval())
        else {
            return false;
        };

        let cancel = state.root.child_token();
        let handle = runtime.spawn(run_probe_loop(
            Arc::clone(shared),
            config.id.clone(),
            interval,
            cancel.clone(),
        ));
        state.tasks.insert(config.id.clone(), ProbeTask { cancel, handle });
        true
    }

    /// Cancel the probe for `source_id`, if any.
    pub(crate) fn stop(&self, source_id: &str) {
        self.state().retire(source_id);
    }

    /// Cancel every probe and wait for all of them to finish.
    pub(crate) async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.state();
            state.runtime = None;
            state.root.cancel();
            let mut handles: Vec<_> = state.tasks.drain().map(|(_, task)| task.handle).collect();
            handles.append(&mut state.retired);
            handles
        };

        let count = handles.len();
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                warn!(error = %err, "health probe task ended abnormally");
            }
        }
        debug!(joined = count, "health probes stopped");
    }
}

impl std::fmt::Debug for ProbeSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ProbeSupervisor")
            .field("running", &state.runtime.is_some())
            .field("probes", &state.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::config::OrchestratorConfig;
    use crate::types::{SourceCategory, SourceResult, SourceType};
    use crate::SearchOrchestrator;

    use super::*;

    /// Health flips with `up`; counts health checks.
    struct Switch {
        up: AtomicBool,
        checks: AtomicU32,
    }

    impl Switch {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(Self {
                up: AtomicBool::new(up),
                checks: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchAdapter for Switch {
        async fn search(
            &self,
            _query: &SearchQuery,
            _config: &SourceConfig,
        ) -> Result<Vec<SourceResult>, SearchError> {
            Ok(Vec::new())
        }

        async fn health_check(&self, _config: &SourceConfig) -> Option<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Some(self.up.load(Ordering::SeqCst))
        }
    }

    /// Has no health check; its fallback query always fails.
    struct NoCheck;

    #[async_trait]
    impl SearchAdapter for NoCheck {
        async fn search(
            &self,
            query: &SearchQuery,
            _config: &SourceConfig,
        ) -> Result<Vec<SourceResult>, SearchError> {
            assert_eq!(query.query, FALLBACK_PROBE_QUERY);
            assert_eq!(query.limit, Some(1));
            Err(SearchError::Adapter("unreachable".into()))
        }
    }

    fn source(id: &str) -> SourceConfig {
        SourceConfig::new(id, id, SourceCategory::Other, SourceType::Api, "https://example.com")
    }

    #[tokio::test]
    async fn check_health_uses_adapter_check() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        let adapter = Switch::new(false);
        orch.register_source(source("s")).unwrap();
        orch.register_adapter("s", adapter.clone());
        let mut events = orch.subscribe();

        let health = orch.check_health("s").await.unwrap();
        assert_eq!(health.consecutive_failures, 1);
        assert_eq!(adapter.checks.load(Ordering::SeqCst), 1);
        assert_eq!(events.try_recv().unwrap().name(), "health-check-failed");
    }

    #[tokio::test]
    async fn probe_falls_back_to_minimal_query() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        orch.register_source(source("s")).unwrap();
        orch.register_adapter("s", Arc::new(NoCheck));

        let health = orch.check_health("s").await.unwrap();
        assert_eq!(health.last_error.as_deref(), Some("adapter error: unreachable"));
        // Probes do not count as requests.
        assert_eq!(orch.get_source_stats("s").unwrap().total_requests, 0);
    }

    #[tokio::test]
    async fn successful_probe_recovers_source() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        let adapter = Switch::new(false);
        orch.register_source(source("s")).unwrap();
        orch.register_adapter("s", adapter.clone());

        for _ in 0..7 {
            orch.check_health("s").await.unwrap();
        }
        assert!(!orch.get_source_health("s").unwrap().is_healthy);

        adapter.up.store(true, Ordering::SeqCst);
        assert!(orch.check_health("s").await.unwrap().is_healthy);
    }

    #[tokio::test]
    async fn check_health_of_unknown_source_fails() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        assert!(matches!(
            orch.check_health("nope").await,
            Err(SearchError::UnknownSource(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn probes_tick_on_interval_and_stop_on_shutdown() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        let adapter = Switch::new(true);
        orch.register_source(source("s").with_health_check_interval_secs(30)).unwrap();
        orch.register_source(source("quiet")).unwrap();
        orch.register_adapter("s", adapter.clone());

        assert_eq!(orch.start().unwrap(), 1);
        assert_eq!(orch.start().unwrap(), 0, "start is idempotent");

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(adapter.checks.load(Ordering::SeqCst), 3);

        orch.shutdown().await;
        assert!(!orch.is_running());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(adapter.checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sources_registered_while_running_get_a_probe() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        orch.start().unwrap();
        let adapter = Switch::new(true);
        orch.register_adapter("late", adapter.clone());
        orch.register_source(source("late").with_health_check_interval_secs(10)).unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(adapter.checks.load(Ordering::SeqCst), 2);

        orch.unregister_source("late").unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(adapter.checks.load(Ordering::SeqCst), 2);
        orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_sources_are_not_probed() {
        let orch = SearchOrchestrator::new(OrchestratorConfig::default()).unwrap();
        let adapter = Switch::new(true);
        orch.register_source(source("s").with_health_check_interval_secs(10).disabled())
            .unwrap();
        orch.register_adapter("s", adapter.clone());
        orch.start().unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(adapter.checks.load(Ordering::SeqCst), 0);
        orch.shutdown().await;
    }
}
