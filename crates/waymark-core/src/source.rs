//! Gating of raw position-source fixes.
//!
//! A GPS watch can emit fixes far more often than the tracker needs them.
//! [`FixGate`] decides whether a new fix is worth an evaluation, given the
//! last fix that was accepted.
//!
//! The gate only knows about movement and time. A throttled fix that would
//! still move the observer across a zone boundary is let through by
//! [`ProximityService`](crate::ProximityService), which asks the tracker.

use chrono::{DateTime, Duration, Utc};
use waymark_types::ObserverFix;

use crate::config::SourceConfig;
use crate::geo::haversine_km;

/// What to do with an incoming fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Forward the fix to the tracker.
    Accept,
    /// Too soon and too close to the last accepted fix.
    Throttle,
    /// Timestamped before the last accepted fix.
    Stale,
    /// Timestamped too far after the current time.
    Future,
}

/// Decides which fixes reach the tracker.
#[derive(Debug, Clone)]
pub struct FixGate {
    config: SourceConfig,
}

impl FixGate {
    /// Create a gate with the given limits.
    pub const fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    /// Judge `candidate` against the last accepted fix, using the wall
    /// clock as the current time.
    pub fn check(&self, candidate: &ObserverFix, last: Option<&ObserverFix>) -> GateDecision {
        self.check_at(candidate, last, Utc::now())
    }

    /// Judge `candidate` against the last accepted fix at time `now`.
    ///
    /// A fix stamped more than `max_future_skew_ms` after `now` is refused,
    /// even as the first fix. Otherwise the first fix is always accepted.
    /// After that a fix passes when either `min_interval_ms` has elapsed or
    /// the observer moved at least `min_distance_m`.
    pub fn check_at(
        &self,
        candidate: &ObserverFix,
        last: Option<&ObserverFix>,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let skew = i64::try_from(self.config.max_future_skew_ms)
            .ok()
            .and_then(Duration::try_milliseconds);
        // No representable skew means no limit.
        if let Some(skew) = skew
            && now
                .checked_add_signed(skew)
                .is_some_and(|limit| candidate.timestamp > limit)
        {
            return GateDecision::Future;
        }

        let Some(last) = last else {
            return GateDecision::Accept;
        };
        if self.config.reject_stale && candidate.timestamp < last.timestamp {
            return GateDecision::Stale;
        }

        let elapsed_ms = candidate
            .timestamp
            .signed_duration_since(last.timestamp)
            .num_milliseconds();
        let min_interval_ms = i64::try_from(self.config.min_interval_ms).unwrap_or(i64::MAX);
        if elapsed_ms >= min_interval_ms {
            return GateDecision::Accept;
        }

        let moved_m = haversine_km(
            last.latitude,
            last.longitude,
            candidate.latitude,
            candidate.longitude,
        ) * 1000.0;
        if moved_m >= self.config.min_distance_m {
            GateDecision::Accept
        } else {
            GateDecision::Throttle
        }
    }
}
