//! Traits for the orchestrator's external collaborators.
//!
//! A [`SearchAdapter`] performs the actual network call for one source; a
//! [`SourceQualityScorer`] rates aggregated results. Neither is implemented
//! here beyond the no-op [`DefaultAdapter`] used for sources registered
//! without an adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::types::{QualityScore, SearchQuery, SourceConfig, SourceResult};

/// A pluggable client for one source.
///
/// Implementors handle their own:
///
/// - request construction from the query and the source's `base_url`
/// - mapping upstream payloads into [`SourceResult`]s
/// - credentials, if the source needs any
///
/// The orchestrator wraps every call with rate limiting, caching, retry
/// and a per-attempt timeout, so adapters should not retry on their own.
/// All implementations must be `Send + Sync` for concurrent fan-out.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Run the query against the source.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Adapter`] (or any other variant) on failure;
    /// the orchestrator retries according to the source's retry policy.
    async fn search(
        &self,
        query: &SearchQuery,
        config: &SourceConfig,
    ) -> Result<Vec<SourceResult>, SearchError>;

    /// Cheap liveness check.
    ///
    /// Returns `None` when the adapter has no dedicated check; the probe
    /// then falls back to a minimal query through [`SearchAdapter::search`].
    async fn health_check(&self, _config: &SourceConfig) -> Option<bool> {
        None
    }
}

/// Adapter used when a source has no registered adapter. Returns nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdapter;

#[async_trait]
impl SearchAdapter for DefaultAdapter {
    async fn search(
        &self,
        _query: &SearchQuery,
        _config: &SourceConfig,
    ) -> Result<Vec<SourceResult>, SearchError> {
        Ok(Vec::new())
    }
}

/// What a scorer sees of one aggregated result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub url: String,
    /// Host of `url`, without a leading `www.`.
    pub domain: String,
    pub title: String,
    pub author: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
}

/// Relevance/trust scorer applied after aggregation.
pub trait SourceQualityScorer: Send + Sync {
    /// Score one result.
    ///
    /// # Errors
    ///
    /// Errors propagate unchanged out of
    /// [`crate::SearchOrchestrator::get_aggregated_results`].
    fn score_source(&self, metadata: &ResultMetadata) -> Result<QualityScore, SearchError>;
}
