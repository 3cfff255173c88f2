//! Per-source usage and latency counters.
//!
//! `requests_today` and `requests_this_minute` are windowed with the same
//! lazily reset windows the rate limiter uses; `total_requests` is the
//! lifetime counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::rate_limiter::Window;

/// Public usage snapshot for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub source_id: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Incremental mean over every recorded request.
    pub average_latency_ms: f64,
    pub total_results: u64,
    pub requests_today: u32,
    pub requests_this_minute: u32,
    pub last_request_at: Option<DateTime<Utc>>,
}

/// Totals across every registered source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_sources: usize,
    pub healthy_sources: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// `successful / total`, or 0 with no traffic.
    pub success_rate: f64,
    /// Per-source averages weighted by request count.
    pub average_latency_ms: f64,
    pub total_results: u64,
}

impl AggregateStats {
    /// Fold per-source snapshots into totals.
    pub fn from_sources<'a>(
        stats: impl IntoIterator<Item = &'a SourceStats>,
        healthy_sources: usize,
    ) -> Self {
        let mut agg = Self {
            healthy_sources,
            ..Self::default()
        };
        let mut weighted_latency = 0.0;
        for s in stats {
            agg.total_sources += 1;
            agg.total_requests += s.total_requests;
            agg.successful_requests += s.successful_requests;
            agg.failed_requests += s.failed_requests;
            agg.total_results += s.total_results;
            weighted_latency += s.average_latency_ms * s.total_requests as f64;
        }
        if agg.total_requests > 0 {
            let total = agg.total_requests as f64;
            agg.success_rate = agg.successful_requests as f64 / total;
            agg.average_latency_ms = weighted_latency / total;
        }
        agg
    }
}

/// Running counters for one source.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    stats: SourceStats,
    minute: Window,
    day: Window,
}

impl StatsCollector {
    pub fn new(source_id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            stats: SourceStats {
                source_id: source_id.into(),
                total_requests: 0,
                successful_requests: 0,
                failed_requests: 0,
                average_latency_ms: 0.0,
                total_results: 0,
                requests_today: 0,
                requests_this_minute: 0,
                last_request_at: None,
            },
            minute: Window::minute(None, now),
            day: Window::day(None, now),
        }
    }

    /// Record one completed request.
    pub fn update_stats(&mut self, success: bool, latency_ms: f64, result_count: usize) {
        let now = Instant::now();
        let s = &mut self.stats;

        s.total_requests += 1;
        if success {
            s.successful_requests += 1;
            s.total_results += result_count as u64;
        } else {
            s.failed_requests += 1;
        }
        let n = s.total_requests as f64;
        s.average_latency_ms = (s.average_latency_ms * (n - 1.0) + latency_ms) / n;
        s.last_request_at = Some(Utc::now());

        for window in [&mut self.minute, &mut self.day] {
            window.roll(now);
            window.record();
        }
    }

    pub fn snapshot(&self) -> SourceStats {
        let now = Instant::now();
        SourceStats {
            requests_this_minute: self.minute.count_at(now),
            requests_today: self.day.count_at(now),
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_collector_is_zeroed() {
        let stats = StatsCollector::new("s").snapshot();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.requests_today, 0);
        assert!(stats.last_request_at.is_none());
    }

    #[test]
    fn counts_success_and_failure() {
        let mut c = StatsCollector::new("s");
        c.update_stats(true, 100.0, 5);
        c.update_stats(false, 300.0, 0);
        c.update_stats(true, 200.0, 3);
        let s = c.snapshot();
        assert_eq!(s.total_requests, 3);
        assert_eq!(s.successful_requests, 2);
        assert_eq!(s.failed_requests, 1);
        assert_eq!(s.total_results, 8);
        assert!(s.last_request_at.is_some());
    }

    #[test]
    fn average_latency_is_incremental_mean() {
        let mut c = StatsCollector::new("s");
        c.update_stats(true, 100.0, 0);
        c.update_stats(true, 200.0, 0);
        c.update_stats(false, 600.0, 0);
        assert!((c.snapshot().average_latency_ms - 300.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn minute_counter_is_windowed() {
        let mut c = StatsCollector::new("s");
        c.update_stats(true, 1.0, 0);
        c.update_stats(true, 1.0, 0);
        assert_eq!(c.snapshot().requests_this_minute, 2);

        tokio::time::advance(Duration::from_secs(60)).await;
        let s = c.snapshot();
        assert_eq!(s.requests_this_minute, 0);
        assert_eq!(s.requests_today, 2);
        assert_eq!(s.total_requests, 2);

        c.update_stats(true, 1.0, 0);
        let s = c.snapshot();
        assert_eq!(s.requests_this_minute, 1);
        assert_eq!(s.requests_today, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn day_counter_resets_after_a_day() {
        let mut c = StatsCollector::new("s");
        c.update_stats(true, 1.0, 0);
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(c.snapshot().requests_today, 0);
        assert_eq!(c.snapshot().total_requests, 1);
    }

    #[test]
    fn aggregate_weights_latency_by_requests() {
        let mut a = StatsCollector::new("a");
        a.update_stats(true, 100.0, 2);
        a.update_stats(true, 100.0, 2);
        a.update_stats(true, 100.0, 2);
        let mut b = StatsCollector::new("b");
        b.update_stats(false, 500.0, 0);

        let snapshots = [a.snapshot(), b.snapshot()];
        let agg = AggregateStats::from_sources(&snapshots, 1);
        assert_eq!(agg.total_sources, 2);
        assert_eq!(agg.healthy_sources, 1);
        assert_eq!(agg.total_requests, 4);
        assert_eq!(agg.total_results, 6);
        assert!((agg.success_rate - 0.75).abs() < 1e-9);
        assert!((agg.average_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_without_traffic_is_zero() {
        let snapshots = [StatsCollector::new("a").snapshot()];
        let agg = AggregateStats::from_sources(&snapshots, 1);
        assert_eq!(agg.total_requests, 0);
        assert!(agg.success_rate.abs() < f64::EPSILON);
    }
}
