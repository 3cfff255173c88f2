//! Source selection for a fan-out.

use serde::{Deserialize, Serialize};

use crate::registry::SourceRegistry;
use crate::types::{Capability, SourceCategory, SourceConfig};

/// Per-call options for [`crate::SearchOrchestrator::search_sources`].
///
/// Every filter is optional; `None` falls back to the orchestrator's
/// configured default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Only consider these source ids.
    pub source_ids: Option<Vec<String>>,
    /// Only consider sources in one of these categories.
    pub categories: Option<Vec<SourceCategory>>,
    /// Drop sources below this priority.
    pub min_priority: Option<i32>,
    /// Sources must support every listed capability.
    pub required_capabilities: Vec<Capability>,
    pub max_sources: Option<usize>,
    pub max_concurrent_requests: Option<usize>,
    pub deduplicate_results: Option<bool>,
}

impl SearchOptions {
    pub fn with_source_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_categories(mut self, categories: impl IntoIterator<Item = SourceCategory>) -> Self {
        self.categories = Some(categories.into_iter().collect());
        self
    }

    pub fn with_min_priority(mut self, priority: i32) -> Self {
        self.min_priority = Some(priority);
        self
    }

    pub fn with_required_capabilities(
        mut self,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        self.required_capabilities = capabilities.into_iter().collect();
        self
    }

    pub fn with_max_sources(mut self, max: usize) -> Self {
        self.max_sources = Some(max);
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = Some(max);
        self
    }

    pub fn with_deduplication(mut self, enabled: bool) -> Self {
        self.deduplicate_results = Some(enabled);
        self
    }

    fn admits(&self, config: &SourceConfig) -> bool {
        if let Some(ids) = &self.source_ids {
            if !ids.iter().any(|id| *id == config.id) {
                return false;
            }
        }
        if let Some(categories) = &self.categories {
            if !categories.contains(&config.category) {
                return false;
            }
        }
        if self.min_priority.is_some_and(|min| config.priority < min) {
            return false;
        }
        config.supports_all(&self.required_capabilities)
    }
}

/// Pick the sources a fan-out will query.
///
/// A source qualifies when it is enabled, currently healthy (the circuit
/// is closed) and passes every filter in `options`. Qualifying sources are
/// ordered by priority, highest first, with ties in registration order,
/// then truncated to `options.max_sources` or `default_max_sources`.
pub fn select_sources(
    registry: &SourceRegistry,
    options: &SearchOptions,
    default_max_sources: usize,
) -> Vec<SourceConfig> {
    let limit = options.max_sources.unwrap_or(default_max_sources);
    let mut skipped_unhealthy = 0usize;

    let selected: Vec<SourceConfig> = registry
        .entries_by_priority()
        .into_iter()
        .filter(|(_, config)| config.enabled && options.admits(config))
        .filter(|(entry, _)| {
            let healthy = entry.is_healthy();
            if !healthy {
                skipped_unhealthy += 1;
            }
            healthy
        })
        .map(|(_, config)| config)
        .take(limit)
        .collect();

    if skipped_unhealthy > 0 {
        tracing::debug!(skipped_unhealthy, "excluded sources with open circuit");
    }
    selected
}
