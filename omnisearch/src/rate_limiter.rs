//! Per-source, multi-window request admission control.
//!
//! Each source owns one [`RateLimiter`] holding three independent windows:
//! burst (1 s, optional), minute (60 s, required) and day (24 h, optional).
//! Windows reset lazily: a window whose reset time has passed is zeroed the
//! next time it is touched. There is no queue; a rejected caller skips the
//! source for that request.
//!
//! Time is read from [`tokio::time::Instant`] so tests can drive windows
//! with a paused clock.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::RateLimitConfig;

const BURST_WINDOW: Duration = Duration::from_secs(1);
const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const DAY_WINDOW: Duration = Duration::from_secs(86_400);

/// A fixed window counter with a lazily applied reset.
///
/// A window with no limit still counts, which lets [`crate::stats`] reuse
/// it for windowed request counters.
#[derive(Debug, Clone)]
pub(crate) struct Window {
    limit: Option<u32>,
    count: u32,
    length: Duration,
    resets_at: Instant,
}

impl Window {
    pub(crate) fn new(limit: Option<u32>, length: Duration, now: Instant) -> Self {
        Self {
            limit,
            count: 0,
            length,
            resets_at: now + length,
        }
    }

    pub(crate) fn minute(limit: Option<u32>, now: Instant) -> Self {
        Self::new(limit, MINUTE_WINDOW, now)
    }

    pub(crate) fn day(limit: Option<u32>, now: Instant) -> Self {
        Self::new(limit, DAY_WINDOW, now)
    }

    /// Zero the counter if the window has elapsed.
    pub(crate) fn roll(&mut self, now: Instant) {
        if now >= self.resets_at {
            self.count = 0;
            self.resets_at = now + self.length;
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        matches!(self.limit, Some(limit) if self.count >= limit)
    }

    pub(crate) fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Requests counted in the window as of `now`, without mutating.
    pub(crate) fn count_at(&self, now: Instant) -> u32 {
        if now >= self.resets_at {
            0
        } else {
            self.count
        }
    }

    /// Remaining headroom as of `now`; `None` when unlimited.
    fn remaining_at(&self, now: Instant) -> Option<u32> {
        self.limit
            .map(|limit| limit.saturating_sub(self.count_at(now)))
    }

    fn resets_in(&self, now: Instant) -> Duration {
        self.resets_at.saturating_duration_since(now)
    }
}

/// Remaining headroom for each window. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub burst_remaining: Option<u32>,
    pub minute_remaining: Option<u32>,
    pub day_remaining: Option<u32>,
    /// Time until the minute window resets.
    pub minute_resets_in: Duration,
}

impl RateLimitStatus {
    /// Returns `true` if at least one request would currently be admitted.
    pub fn has_headroom(&self) -> bool {
        [self.burst_remaining, self.minute_remaining, self.day_remaining]
            .iter()
            .all(|r| r.is_none_or(|n| n > 0))
    }
}

/// Burst/minute/day admission control for one source.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    burst: Window,
    minute: Window,
    day: Window,
}

impl RateLimiter {
    /// Create a limiter with all windows opening now.
    pub fn new(config: &RateLimitConfig) -> Self {
        let now = Instant::now();
        Self {
            burst: Window::new(config.burst_limit, BURST_WINDOW, now),
            minute: Window::minute(Some(config.requests_per_minute), now),
            day: Window::day(config.requests_per_day, now),
        }
    }

    /// Try to admit one request.
    ///
    /// Returns `false` without counting anything if any configured window
    /// is at capacity; otherwise counts the request in every window.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        for window in self.windows_mut() {
            window.roll(now);
        }
        if self.windows_mut().iter().any(|w| w.is_full()) {
            return false;
        }
        for window in self.windows_mut() {
            window.record();
        }
        true
    }

    /// Current headroom per window. Does not reset or count anything.
    pub fn status(&self) -> RateLimitStatus {
        let now = Instant::now();
        RateLimitStatus {
            burst_remaining: self.burst.remaining_at(now),
            minute_remaining: self.minute.remaining_at(now),
            day_remaining: self.day.remaining_at(now),
            minute_resets_in: self.minute.resets_in(now),
        }
    }

    fn windows_mut(&mut self) -> [&mut Window; 3] {
        [&mut self.burst, &mut self.minute, &mut self.day]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32, per_day: Option<u32>, burst: Option<u32>) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            requests_per_minute: per_minute,
            requests_per_day: per_day,
            burst_limit: burst,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_per_minute_then_rejects() {
        let mut rl = limiter(5, None, None);
        for i in 0..5 {
            assert!(rl.try_acquire(), "request {i} should be admitted");
        }
        assert!(!rl.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn minute_window_resets_after_elapsing() {
        let mut rl = limiter(3, None, None);
        for _ in 0..3 {
            assert!(rl.try_acquire());
        }
        assert!(!rl.try_acquire());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!rl.try_acquire());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(rl.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_limit_applies_per_second() {
        let mut rl = limiter(100, None, Some(2));
        assert!(rl.try_acquire());
        assert!(rl.try_acquire());
        assert!(!rl.try_acquire());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(rl.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn day_limit_survives_minute_reset() {
        let mut rl = limiter(10, Some(2), None);
        assert!(rl.try_acquire());
        assert!(rl.try_acquire());
        assert!(!rl.try_acquire());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!rl.try_acquire(), "day window still full");

        tokio::time::advance(DAY_WINDOW).await;
        assert!(rl.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_does_not_consume_other_windows() {
        let mut rl = limiter(10, Some(100), Some(1));
        assert!(rl.try_acquire());
        assert!(!rl.try_acquire());
        assert!(!rl.try_acquire());

        let status = rl.status();
        assert_eq!(status.minute_remaining, Some(9));
        assert_eq!(status.day_remaining, Some(99));
        assert_eq!(status.burst_remaining, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_unbounded_windows_as_none() {
        let rl = limiter(60, None, None);
        let status = rl.status();
        assert_eq!(status.burst_remaining, None);
        assert_eq!(status.day_remaining, None);
        assert_eq!(status.minute_remaining, Some(60));
        assert!(status.has_headroom());
    }

    #[tokio::test(start_paused = true)]
    async fn status_reflects_elapsed_window_without_mutating() {
        let mut rl = limiter(2, None, None);
        assert!(rl.try_acquire());
        assert!(rl.try_acquire());
        assert!(!rl.status().has_headroom());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(rl.status().minute_remaining, Some(2));
        assert!(rl.status().has_headroom());
    }

    #[tokio::test(start_paused = true)]
    async fn minute_resets_in_counts_down() {
        let rl = limiter(2, None, None);
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(rl.status().minute_resets_in, Duration::from_secs(40));
    }

    #[test]
    fn unlimited_window_never_full() {
        let now = Instant::now();
        let mut window = Window::minute(None, now);
        for _ in 0..10_000 {
            window.record();
        }
        assert!(!window.is_full());
        assert_eq!(window.count_at(now), 10_000);
    }
}
