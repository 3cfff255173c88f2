//! Orchestrator configuration with sensible defaults.
//!
//! [`OrchestratorConfig`] controls fan-out width, selection size, caching
//! and event buffering. [`RegistryFile`] bundles it with a list of sources
//! so a whole deployment can be described in one TOML file.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::SearchError;
use crate::types::SourceConfig;

/// Configuration for a [`crate::SearchOrchestrator`].
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Size of each fan-out chunk; also the bound on in-flight adapter calls.
    pub max_concurrent_requests: usize,
    /// Maximum number of sources selected for one fan-out.
    pub max_sources: usize,
    /// How long a source's results are cached in seconds. 0 disables caching.
    pub cache_ttl_seconds: u64,
    /// Upper bound on cached (source, query) entries.
    pub cache_max_entries: u64,
    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
    /// Default for [`crate::SearchOptions::deduplicate_results`].
    pub deduplicate_results: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 20,
            max_sources: 50,
            cache_ttl_seconds: 300,
            cache_max_entries: 1_000,
            event_capacity: 1_024,
            deduplicate_results: true,
        }
    }
}

impl OrchestratorConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `max_concurrent_requests` must be greater than 0
    /// - `max_sources` must be greater than 0
    /// - `event_capacity` must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_concurrent_requests == 0 {
            return Err(SearchError::Config(
                "max_concurrent_requests must be greater than 0".into(),
            ));
        }
        if self.max_sources == 0 {
            return Err(SearchError::Config(
                "max_sources must be greater than 0".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(SearchError::Config(
                "event_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// On-disk description of an orchestrator and its sources.
///
/// ```toml
/// [orchestrator]
/// max_concurrent_requests = 8
///
/// [[sources]]
/// id = "arxiv"
/// name = "arXiv"
/// category = "academic"
/// type = "api"
/// base_url = "https://export.arxiv.org/api"
/// priority = 10
///
/// [sources.rate_limit]
/// requests_per_minute = 20
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl RegistryFile {
    /// Load and validate a registry from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Io`] if the file cannot be read, or
    /// [`SearchError::Config`] if it does not parse or fails validation.
    pub fn from_file(path: &Path) -> Result<Self, SearchError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a registry from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SearchError> {
        let file: Self = toml::from_str(content).map_err(|e| SearchError::Config(e.to_string()))?;
        file.validate()?;
        Ok(file)
    }

    /// Serialise back to TOML.
    pub fn to_toml_string(&self) -> Result<String, SearchError> {
        toml::to_string_pretty(self).map_err(|e| SearchError::Config(e.to_string()))
    }

    /// Validates the orchestrator section, every source, and id uniqueness.
    pub fn validate(&self) -> Result<(), SearchError> {
        self.orchestrator.validate()?;
        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.id.as_str()) {
                return Err(SearchError::Config(format!(
                    "duplicate source id: {}",
                    source.id
                )));
            }
        }
        Ok(())
    }
}
