//! Core types: source configuration, queries, and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use crate::error::SearchError;

/// Broad family a source belongs to. Used for category filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// General web search engines.
    SearchEngine,
    /// Academic databases and preprint servers.
    Academic,
    /// News APIs and feeds.
    News,
    /// Encyclopedias and knowledge graphs.
    KnowledgeBase,
    /// Social networks and community forums.
    Social,
    /// Technical Q&A sites and code hosts.
    Technical,
    /// Government registries and open-data portals.
    Government,
    /// Financial filings and market data.
    Financial,
    /// Anything that does not fit the categories above.
    Other,
}

impl SourceCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::SearchEngine,
        Self::Academic,
        Self::News,
        Self::KnowledgeBase,
        Self::Social,
        Self::Technical,
        Self::Government,
        Self::Financial,
        Self::Other,
    ];

    /// Returns the wire name of this category.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchEngine => "search_engine",
            Self::Academic => "academic",
            Self::News => "news",
            Self::KnowledgeBase => "knowledge_base",
            Self::Social => "social",
            Self::Technical => "technical",
            Self::Government => "government",
            Self::Financial => "financial",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SourceCategory {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SearchError::Config(format!("unknown source category: {s}")))
    }
}

/// How a source is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Structured JSON/XML API.
    Api,
    /// HTML scraping.
    Scraper,
    /// RSS or Atom feed.
    Rss,
    /// Direct database or bulk-data access.
    Database,
    /// Anything else.
    Other,
}

/// Optional query features a source understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FullText,
    DateFilter,
    DomainFilter,
    LanguageFilter,
    TypeFilter,
    Pagination,
    Sorting,
}

/// Request budget for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per 60 second window. Required.
    pub requests_per_minute: u32,
    /// Requests admitted per 24 hour window. `None` means unlimited.
    #[serde(default)]
    pub requests_per_day: Option<u32>,
    /// Requests admitted per 1 second window. `None` means unlimited.
    #[serde(default)]
    pub burst_limit: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_day: None,
            burst_limit: None,
        }
    }
}

/// Retry policy applied to every adapter call for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub backoff_ms: u64,
    /// Factor applied to the delay for each further retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Sleep between failed attempt `attempt` (0-based) and the next one.
    ///
    /// `backoff_ms * backoff_multiplier^attempt`, without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ms = self.backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        if ms.is_finite() && ms > 0.0 {
            Duration::from_millis(ms.round() as u64)
        } else {
            Duration::ZERO
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_enabled() -> bool {
    true
}

/// Registration record for one external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique id; the key for every per-source structure.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub category: SourceCategory,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub base_url: String,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Wall-clock bound on a single adapter attempt. 0 disables the bound.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Higher is preferred during selection.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    /// Interval of the background health probe. `None` disables probing.
    #[serde(default)]
    pub health_check_interval_secs: Option<u64>,
}

impl SourceConfig {
    /// Create an enabled source with default limits, retry policy and priority 0.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: SourceCategory,
        source_type: SourceType,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            source_type,
            base_url: base_url.into(),
            rate_limit: RateLimitConfig::default(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
            enabled: true,
            priority: 0,
            capabilities: BTreeSet::new(),
            health_check_interval_secs: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    pub fn with_health_check_interval_secs(mut self, secs: u64) -> Self {
        self.health_check_interval_secs = Some(secs);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Per-attempt timeout, or `None` when unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Probe interval, or `None` when probing is disabled.
    pub fn health_check_interval(&self) -> Option<Duration> {
        self.health_check_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Returns `true` if the source declares every capability in `required`.
    pub fn supports_all(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    /// Validates this source, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `id` must not be blank
    /// - `rate_limit.requests_per_minute` must be greater than 0
    /// - configured day and burst limits must be greater than 0
    /// - `retry.backoff_multiplier` must be finite and non-negative
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.id.trim().is_empty() {
            return Err(SearchError::Config("source id must not be empty".into()));
        }
        if self.rate_limit.requests_per_minute == 0 {
            return Err(SearchError::Config(format!(
                "{}: requests_per_minute must be greater than 0",
                self.id
            )));
        }
        if self.rate_limit.requests_per_day == Some(0) {
            return Err(SearchError::Config(format!(
                "{}: requests_per_day must be greater than 0 when set",
                self.id
            )));
        }
        if self.rate_limit.burst_limit == Some(0) {
            return Err(SearchError::Config(format!(
                "{}: burst_limit must be greater than 0 when set",
                self.id
            )));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(SearchError::Config(format!(
                "{}: backoff_multiplier must be a non-negative number",
                self.id
            )));
        }
        Ok(())
    }
}

/// Partial update merged into an existing [`SourceConfig`].
///
/// `None` leaves a field untouched. `health_check_interval_secs` is doubly
/// optional so an update can clear the interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub category: Option<SourceCategory>,
    pub source_type: Option<SourceType>,
    pub base_url: Option<String>,
    pub rate_limit: Option<RateLimitConfig>,
    pub timeout_ms: Option<u64>,
    pub retry: Option<RetryConfig>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub capabilities: Option<BTreeSet<Capability>>,
    pub health_check_interval_secs: Option<Option<u64>>,
}

impl SourceUpdate {
    /// Merge into `config`. Returns `true` if the rate-limit fields changed.
    pub fn apply_to(self, config: &mut SourceConfig) -> bool {
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(category) = self.category {
            config.category = category;
        }
        if let Some(source_type) = self.source_type {
            config.source_type = source_type;
        }
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(retry) = self.retry {
            config.retry = retry;
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(priority) = self.priority {
            config.priority = priority;
        }
        if let Some(capabilities) = self.capabilities {
            config.capabilities = capabilities;
        }
        if let Some(interval) = self.health_check_interval_secs {
            config.health_check_interval_secs = interval;
        }
        match self.rate_limit {
            Some(rate_limit) if rate_limit != config.rate_limit => {
                config.rate_limit = rate_limit;
                true
            }
            _ => false,
        }
    }
}

/// Inclusive publication date bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Optional query restrictions. Adapters apply what their source supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub date_range: Option<DateRange>,
    /// Only return results from these domains.
    pub include_domains: Vec<String>,
    /// Never return results from these domains.
    pub exclude_domains: Vec<String>,
    pub language: Option<String>,
    #[serde(rename = "type")]
    pub result_type: Option<String>,
}

/// One logical query, fanned out unchanged to every selected source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub filters: Option<SearchFilters>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: None,
            limit: None,
            offset: None,
        }
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A metadata value attached to a result by its adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Source-specific extra fields (citation counts, tags, scores, ...).
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single result returned by one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    /// Id of the source that produced this result.
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub author: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub metadata: Option<Metadata>,
    pub fetched_at: DateTime<Utc>,
}

impl SourceResult {
    /// Create a result stamped with the current time.
    pub fn new(
        source_id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            author: None,
            published_date: None,
            metadata: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_published_date(mut self, date: DateTime<Utc>) -> Self {
        self.published_date = Some(date);
        self
    }

    /// Insert one metadata entry, creating the map on first use.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Relevance/trust score computed by an external scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Combined score; aggregated results are sorted on this, descending.
    pub overall: f64,
    /// Named component scores, as reported by the scorer.
    #[serde(default)]
    pub factors: BTreeMap<String, f64>,
}

impl QualityScore {
    pub fn new(overall: f64) -> Self {
        Self {
            overall,
            factors: BTreeMap::new(),
        }
    }
}

/// A result with its derived domain and attached quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub result: SourceResult,
    pub domain: String,
    pub score: QualityScore,
}

/// Per-source results of one fan-out, in source selection order.
///
/// A failed or rate-limited source maps to an empty list, the same as a
/// source that genuinely found nothing; consult health, stats or events to
/// tell them apart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceResultMap {
    entries: Vec<(String, Vec<SourceResult>)>,
}

impl SourceResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the results for a source, keeping its original position if present.
    pub fn insert(&mut self, source_id: impl Into<String>, results: Vec<SourceResult>) {
        let source_id = source_id.into();
        match self.entries.iter_mut().find(|(id, _)| *id == source_id) {
            Some((_, existing)) => *existing = results,
            None => self.entries.push((source_id, results)),
        }
    }

    pub fn get(&self, source_id: &str) -> Option<&[SourceResult]> {
        self.entries
            .iter()
            .find(|(id, _)| id == source_id)
            .map(|(_, results)| results.as_slice())
    }

    pub fn contains_source(&self, source_id: &str) -> bool {
        self.get(source_id).is_some()
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SourceResult])> {
        self.entries
            .iter()
            .map(|(id, results)| (id.as_str(), results.as_slice()))
    }

    /// Number of sources in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of results across every source.
    pub fn total_results(&self) -> usize {
        self.entries.iter().map(|(_, results)| results.len()).sum()
    }

    /// Concatenate every source's results in map order.
    pub fn into_flat(self) -> Vec<SourceResult> {
        self.entries
            .into_iter()
            .flat_map(|(_, results)| results)
            .collect()
    }
}

impl IntoIterator for SourceResultMap {
    type Item = (String, Vec<SourceResult>);
    type IntoIter = std::vec::IntoIter<(String, Vec<SourceResult>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Vec<SourceResult>)> for SourceResultMap {
    fn from_iter<I: IntoIterator<Item = (String, Vec<SourceResult>)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (id, results) in iter {
            map.insert(id, results);
        }
        map
    }
}

impl Serialize for SourceResultMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(id, results)| (id, results)))
    }
}
