//! # omnisearch
//!
//! Federated search across many heterogeneous sources: academic databases,
//! news APIs, knowledge bases, code hosts and more.
//!
//! Sources are registered at runtime with a [`SourceConfig`]. Each gets its
//! own rate limiter, health tracker and usage statistics. A query fans out
//! to the selected sources in bounded concurrent chunks, results are
//! deduplicated by normalised URL, and an optional
//! [`SourceQualityScorer`] ranks the merged set.
//!
//! ## Design
//!
//! - Adapters ([`SearchAdapter`]) do the network work; this crate owns
//!   everything around them: rate limiting, caching, retry with
//!   exponential backoff, per-attempt timeouts, health tracking
//! - Unhealthy sources are excluded from fan-out until a successful
//!   search or background probe recovers them
//! - Partial failure never fails a fan-out; a failed source contributes
//!   an empty list and a `source-error` event
//! - Every state change is published on a broadcast [`EventBus`]
//!
//! ## Security
//!
//! - No credentials are stored here; adapters manage their own
//! - Query text is logged only at trace level
//! - No network listeners; this is a library, not a server

pub mod adapter;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod orchestrator;
pub mod rate_limiter;
pub mod registry;
pub mod stats;
pub mod types;

pub use adapter::{DefaultAdapter, ResultMetadata, SearchAdapter, SourceQualityScorer};
pub use config::{OrchestratorConfig, RegistryFile};
pub use error::{Result, SearchError};
pub use events::{EventBus, OrchestratorEvent};
pub use health::SourceHealth;
pub use orchestrator::{SearchOptions, SearchOrchestrator};
pub use rate_limiter::RateLimitStatus;
pub use stats::{AggregateStats, SourceStats};
pub use types::{
    Capability, QualityScore, RateLimitConfig, RetryConfig, ScoredResult, SearchFilters,
    SearchQuery, SourceCategory, SourceConfig, SourceResult, SourceResultMap, SourceType,
    SourceUpdate,
};
