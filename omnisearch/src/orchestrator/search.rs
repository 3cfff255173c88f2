//! Single-source search and the chunked multi-source fan-out.

use std::sync::Arc;

use tokio::time::Instant;

use crate::adapter::{DefaultAdapter, SearchAdapter};
use crate::cache::CacheKey;
use crate::error::SearchError;
use crate::events::OrchestratorEvent;
use crate::health::HealthTransition;
use crate::types::{SearchQuery, SourceResult, SourceResultMap};

use super::Shared;
use super::dedup::deduplicate;
use super::retry::{execute_with_retry, with_timeout};
use super::selection::{SearchOptions, select_sources};

impl Shared {
    /// Query one source through the full pipeline.
    ///
    /// # Pipeline
    ///
    /// 1. Reject unknown or disabled sources
    /// 2. Ask the rate limiter; a rejection returns no results
    /// 3. Serve from the cache when an unexpired entry exists
    /// 4. Resolve the adapter, falling back to [`DefaultAdapter`]
    /// 5. Call the adapter with retry, each attempt bounded by the source timeout
    /// 6. Record the outcome in stats and health; cache and report successes
    pub(crate) async fn search_source(
        &self,
        source_id: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SourceResult>, SearchError> {
        let entry = self.registry.require(source_id)?;
        let config = entry.config();
        if !config.enabled {
            return Err(SearchError::SourceDisabled(source_id.to_owned()));
        }

        if !entry.try_acquire() {
            tracing::debug!(source_id, "rate limit reached, skipping source");
            self.events.emit(OrchestratorEvent::RateLimited {
                source_id: source_id.to_owned(),
            });
            return Ok(Vec::new());
        }

        let key = CacheKey::new(source_id, query);
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(source_id, count = cached.len(), "serving cached results");
            self.events.emit(OrchestratorEvent::CacheHit {
                source_id: source_id.to_owned(),
                count: cached.len(),
            });
            return Ok(cached);
        }

        let adapter: Arc<dyn SearchAdapter> = match self.adapter(source_id) {
            Some(adapter) => adapter,
            None => {
                tracing::debug!(source_id, "no adapter registered, using default");
                self.events.emit(OrchestratorEvent::DefaultSearch {
                    source_id: source_id.to_owned(),
                });
                Arc::new(DefaultAdapter)
            }
        };

        let timeout = config.timeout();
        let started = Instant::now();
        let outcome = execute_with_retry(
            || with_timeout(adapter.search(query, &config), timeout, source_id),
            &config.retry,
        )
        .await;
        let elapsed = started.elapsed();
        let latency_ms = elapsed.as_secs_f64() * 1000.0;

        match outcome {
            Ok(results) => {
                let count = results.len();
                if entry.record_success(latency_ms, count) == HealthTransition::Recovered {
                    tracing::info!(source_id, "source recovered");
                }
                self.cache.insert(key, results.clone()).await;
                tracing::debug!(source_id, count, latency_ms, "source returned results");
                self.events.emit(OrchestratorEvent::SourceResults {
                    source_id: source_id.to_owned(),
                    count,
                    latency_ms: elapsed.as_millis() as u64,
                });
                Ok(results)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(source_id, error = %err, "source search failed");
                if entry.record_failure(latency_ms, &message) == HealthTransition::BecameUnhealthy {
                    tracing::warn!(source_id, "source marked unhealthy");
                    self.events.emit(OrchestratorEvent::SourceUnhealthy {
                        source_id: source_id.to_owned(),
                        last_error: Some(message),
                    });
                }
                Err(err)
            }
        }
    }

    /// Fan a query out to every selected source.
    ///
    /// Sources are queried in chunks of `max_concurrent_requests`; a chunk
    /// starts only after the previous one has fully settled. A failing
    /// source contributes an empty list and a `source-error` event, never
    /// an error for the whole call.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the effective concurrency is zero.
    pub(crate) async fn search_sources(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SourceResultMap, SearchError> {
        let concurrency = options
            .max_concurrent_requests
            .unwrap_or(self.config.max_concurrent_requests);
        if concurrency == 0 {
            return Err(SearchError::Config(
                "max_concurrent_requests must be greater than 0".into(),
            ));
        }

        let selected = select_sources(&self.registry, options, self.config.max_sources);
        let source_ids: Vec<String> = selected.iter().map(|c| c.id.clone()).collect();
        tracing::trace!(query = %query.query, "starting fan-out");
        tracing::debug!(sources = selected.len(), concurrency, "searching sources");
        self.events.emit(OrchestratorEvent::SearchStarted {
            query: query.query.clone(),
            source_ids,
        });

        let started = Instant::now();
        let mut merged = SourceResultMap::new();
        for chunk in selected.chunks(concurrency) {
            let searches = chunk.iter().map(|config| async move {
                let outcome = self.search_source(&config.id, query).await;
                (config.id.as_str(), outcome)
            });
            for (source_id, outcome) in futures::future::join_all(searches).await {
                let results = outcome.unwrap_or_else(|err| {
                    self.events.emit(OrchestratorEvent::SourceError {
                        source_id: source_id.to_owned(),
                        error: err.to_string(),
                    });
                    Vec::new()
                });
                merged.insert(source_id, results);
            }
        }

        if options
            .deduplicate_results
            .unwrap_or(self.config.deduplicate_results)
        {
            merged = deduplicate(merged);
        }

        let total_results = merged.total_results();
        tracing::debug!(
            sources = merged.len(),
            total_results,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fan-out complete"
        );
        self.events.emit(OrchestratorEvent::SearchCompleted {
            query: query.query.clone(),
            source_count: merged.len(),
            total_results,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        Ok(merged)
    }
}
