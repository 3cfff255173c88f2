//! Per-source health tracking and circuit breaking.
//!
//! Every search attempt and every background probe feeds one outcome into
//! the source's [`HealthTracker`]. Unhealthy sources are excluded from
//! selection; a single success restores them.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────┐  failures >= 3 AND success_rate < 0.5  ┌───────────┐
//! │ Healthy ├───────────────────────────────────────►│ Unhealthy │
//! └────▲────┘                                        └─────┬─────┘
//!      │                 any success                       │
//!      └───────────────────────────────────────────────────┘
//! ```
//!
//! The compound trip condition keeps a source with an occasional blip but
//! a high overall success rate in rotation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight of the previous latency in the moving average.
const LATENCY_DECAY: f64 = 0.8;
/// Weight of the previous success rate in the decayed average.
const SUCCESS_DECAY: f64 = 0.9;

/// Public health snapshot for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source_id: String,
    pub is_healthy: bool,
    /// When the last outcome was recorded (creation time until then).
    pub last_check: DateTime<Utc>,
    /// Exponential moving average of successful call latency.
    pub latency_ms: f64,
    /// Decayed success average in `[0, 1]`.
    pub success_rate: f64,
    /// Lifetime failure count.
    pub error_count: u64,
    pub last_error: Option<String>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

/// Thresholds for tripping a source to unhealthy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthPolicy {
    /// Consecutive failures required before tripping.
    pub failure_threshold: u32,
    /// Success rate that must also be undercut before tripping.
    pub min_success_rate: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            min_success_rate: 0.5,
        }
    }
}

/// What an update did to the source's health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Unchanged,
    /// Healthy → Unhealthy on this update.
    BecameUnhealthy,
    /// Unhealthy → Healthy on this update.
    Recovered,
}

/// Health state machine for a single source.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    policy: HealthPolicy,
    health: SourceHealth,
}

impl HealthTracker {
    /// Create a tracker in the healthy state with a perfect success rate.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self::with_policy(source_id, HealthPolicy::default())
    }

    pub fn with_policy(source_id: impl Into<String>, policy: HealthPolicy) -> Self {
        Self {
            policy,
            health: SourceHealth {
                source_id: source_id.into(),
                is_healthy: true,
                last_check: Utc::now(),
                latency_ms: 0.0,
                success_rate: 1.0,
                error_count: 0,
                last_error: None,
                consecutive_failures: 0,
            },
        }
    }

    /// Record a successful call or probe.
    pub fn record_success(&mut self, latency_ms: f64) -> HealthTransition {
        let was_healthy = self.health.is_healthy;
        let h = &mut self.health;
        h.consecutive_failures = 0;
        h.is_healthy = true;
        h.latency_ms = LATENCY_DECAY * h.latency_ms + (1.0 - LATENCY_DECAY) * latency_ms;
        h.success_rate = SUCCESS_DECAY * h.success_rate + (1.0 - SUCCESS_DECAY);
        h.last_check = Utc::now();

        if was_healthy {
            HealthTransition::Unchanged
        } else {
            HealthTransition::Recovered
        }
    }

    /// Record a failed call or probe.
    ///
    /// Trips to unhealthy only once both the failure streak and the
    /// success-rate thresholds are crossed.
    pub fn record_failure(&mut self, error: Option<&str>) -> HealthTransition {
        let was_healthy = self.health.is_healthy;
        let h = &mut self.health;
        h.consecutive_failures = h.consecutive_failures.saturating_add(1);
        h.error_count = h.error_count.saturating_add(1);
        h.success_rate *= SUCCESS_DECAY;
        h.last_check = Utc::now();
        if let Some(error) = error {
            h.last_error = Some(error.to_owned());
        }

        if h.consecutive_failures >= self.policy.failure_threshold
            && h.success_rate < self.policy.min_success_rate
        {
            h.is_healthy = false;
        }

        if was_healthy && !h.is_healthy {
            HealthTransition::BecameUnhealthy
        } else {
            HealthTransition::Unchanged
        }
    }

    /// Record one outcome. Latency only feeds the average on success.
    pub fn update_health(&mut self, success: bool, latency_ms: f64) -> HealthTransition {
        if success {
            self.record_success(latency_ms)
        } else {
            self.record_failure(None)
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy
    }

    pub fn snapshot(&self) -> SourceHealth {
        self.health.clone()
    }
}
