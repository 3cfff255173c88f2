//! Orchestrator events over a tokio broadcast channel.
//!
//! Event names are a wire contract for external listeners: each variant
//! serialises with an `event` tag carrying its kebab-case name
//! (`source-registered`, `rate-limited`, ...). Events are lost when no
//! receiver is subscribed or when a receiver lags past the channel capacity.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything the orchestrator reports to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum OrchestratorEvent {
    SourceRegistered { source_id: String },
    SourceUnregistered { source_id: String },
    SourceUpdated { source_id: String },
    SourceToggled { source_id: String, enabled: bool },
    SearchStarted { query: String, source_ids: Vec<String> },
    SearchCompleted {
        query: String,
        source_count: usize,
        total_results: usize,
        duration_ms: u64,
    },
    SourceResults {
        source_id: String,
        count: usize,
        latency_ms: u64,
    },
    SourceError { source_id: String, error: String },
    RateLimited { source_id: String },
    CacheHit { source_id: String, count: usize },
    HealthCheckFailed { source_id: String, error: Option<String> },
    SourceUnhealthy { source_id: String, last_error: Option<String> },
    DefaultSearch { source_id: String },
    Shutdown,
}

impl OrchestratorEvent {
    /// The wire name listeners match on.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceRegistered { .. } => "source-registered",
            Self::SourceUnregistered { .. } => "source-unregistered",
            Self::SourceUpdated { .. } => "source-updated",
            Self::SourceToggled { .. } => "source-toggled",
            Self::SearchStarted { .. } => "search-started",
            Self::SearchCompleted { .. } => "search-completed",
            Self::SourceResults { .. } => "source-results",
            Self::SourceError { .. } => "source-error",
            Self::RateLimited { .. } => "rate-limited",
            Self::CacheHit { .. } => "cache-hit",
            Self::HealthCheckFailed { .. } => "health-check-failed",
            Self::SourceUnhealthy { .. } => "source-unhealthy",
            Self::DefaultSearch { .. } => "default-search",
            Self::Shutdown => "shutdown",
        }
    }

    /// The source an event concerns, if any.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::SourceRegistered { source_id }
            | Self::SourceUnregistered { source_id }
            | Self::SourceUpdated { source_id }
            | Self::SourceToggled { source_id, .. }
            | Self::SourceResults { source_id, .. }
            | Self::SourceError { source_id, .. }
            | Self::RateLimited { source_id }
            | Self::CacheHit { source_id, .. }
            | Self::HealthCheckFailed { source_id, .. }
            | Self::SourceUnhealthy { source_id, .. }
            | Self::DefaultSearch { source_id } => Some(source_id),
            Self::SearchStarted { .. } | Self::SearchCompleted { .. } | Self::Shutdown => None,
        }
    }
}

/// Cloneable publisher side of the event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<OrchestratorEvent>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish to all current subscribers.
    pub fn emit(&self, event: OrchestratorEvent) {
        tracing::trace!(event = event.name(), "emitting orchestrator event");
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
