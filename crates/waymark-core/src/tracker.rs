//! The proximity tracker: per-marker alert state machine.
//!
//! Each call to [`ProximityTracker::update`] takes the latest observer fix
//! and the *full* current marker snapshot and re-evaluates every marker from
//! scratch. Nothing is patched incrementally, so a dropped or reordered
//! update is corrected by the next one.
//!
//! # State machine
//!
//! ```text
//!              enters threshold (fire)
//!   NoAlert  ---------------------------->  ActiveAlert
//!            <----------------------------
//!        exits threshold or marker deleted (cancel)
//! ```
//!
//! A marker is inside when its great-circle distance to the fix is strictly
//! less than the threshold; exactly at the threshold is outside. A marker
//! has an entry in the active map if and only if an alert was fired for it
//! and not yet cancelled.
//!
//! Markers are evaluated one after another and every sink call is awaited
//! before the next marker is looked at. `update` takes `&mut self`, so two
//! evaluations can never interleave on the same tracker.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};
use waymark_types::{
    AlertContent, AlertHandle, AlertState, AlertTransition, CancelCause, MarkerId, MarkerPoint,
    ObserverFix,
};

use crate::config::ProximityConfig;
use crate::geo::haversine_km;
use crate::sink::{AlertSink, SinkError};

/// Errors returned by [`ProximityTracker::update`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    /// The fix has a non-finite or out-of-range coordinate. No state was
    /// changed.
    #[error("invalid observer fix: latitude {latitude}, longitude {longitude}")]
    InvalidFix {
        /// Rejected latitude.
        latitude: f64,
        /// Rejected longitude.
        longitude: f64,
    },
}

/// Book-keeping for a marker whose alert is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveAlert {
    /// Handle returned by the sink, or `None` if the fire call failed.
    pub handle: Option<AlertHandle>,
    /// Timestamp of the fix that triggered the alert.
    pub fired_at: DateTime<Utc>,
}

/// What one evaluation did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Number of markers whose distance was computed.
    pub evaluated: usize,
    /// Transitions applied, in the order they happened.
    pub transitions: Vec<(MarkerId, AlertTransition)>,
    /// Sink failures encountered. The transitions were applied anyway.
    pub failures: Vec<SinkError>,
}

impl UpdateReport {
    /// Markers an alert was fired for.
    pub fn fired(&self) -> Vec<MarkerId> {
        self.transitions
            .iter()
            .filter(|(_, t)| matches!(t, AlertTransition::Fired))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Markers whose alert was cancelled.
    pub fn cancelled(&self) -> Vec<MarkerId> {
        self.transitions
            .iter()
            .filter(|(_, t)| matches!(t, AlertTransition::Cancelled { .. }))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether the evaluation changed nothing.
    pub fn is_quiet(&self) -> bool {
        self.transitions.is_empty() && self.failures.is_empty()
    }

    /// Append another report's transitions and failures to this one.
    pub fn merge(&mut self, other: Self) {
        self.evaluated = self.evaluated.saturating_add(other.evaluated);
        self.transitions.extend(other.transitions);
        self.failures.extend(other.failures);
    }
}

/// Fires and cancels one-shot alerts as the observer approaches and leaves
/// markers.
#[derive(Debug)]
pub struct ProximityTracker<S> {
    sink: S,
    threshold_km: f64,
    alert_title: String,
    active: BTreeMap<MarkerId, ActiveAlert>,
}

impl<S: AlertSink> ProximityTracker<S> {
    /// Create a tracker delivering alerts to `sink`.
    pub fn new(sink: S, config: &ProximityConfig) -> Self {
        Self {
            sink,
            threshold_km: config.threshold_km,
            alert_title: config.alert_title.clone(),
            active: BTreeMap::new(),
        }
    }

    /// Re-evaluate every marker against `fix`.
    ///
    /// `markers` must be the complete current snapshot. Any marker with an
    /// active alert that is missing from it is treated as deleted and its
    /// alert is cancelled.
    ///
    /// With no fix, or an empty snapshot, this is a no-op and existing
    /// alert state is kept.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidFix`] for a non-finite or
    /// out-of-range fix; alert state is left untouched. Sink failures are
    /// not errors; they are reported in [`UpdateReport::failures`].
    pub async fn update(
        &mut self,
        fix: Option<&ObserverFix>,
        markers: &[MarkerPoint],
    ) -> Result<UpdateReport, TrackerError> {
        let mut report = UpdateReport::default();

        let Some(fix) = fix else {
            trace!("no observer fix yet, skipping evaluation");
            return Ok(report);
        };
        validate_fix(fix)?;
        if markers.is_empty() {
            trace!("empty marker snapshot, skipping evaluation");
            return Ok(report);
        }

        let mut seen = BTreeSet::new();
        for marker in markers {
            if !seen.insert(marker.id) {
                warn!(marker_id = %marker.id, "duplicate marker id in snapshot, ignoring repeat");
                continue;
            }
            self.evaluate(fix, marker, &mut report).await;
        }

        let orphaned: Vec<MarkerId> = self
            .active
            .keys()
            .filter(|id| !seen.contains(*id))
            .copied()
            .collect();
        for id in orphaned {
            self.cancel(id, CancelCause::Removed, &mut report).await;
        }

        if !report.is_quiet() {
            debug!(
                evaluated = report.evaluated,
                fired = report.fired().len(),
                cancelled = report.cancelled().len(),
                failures = report.failures.len(),
                active = self.active.len(),
                "evaluation applied transitions"
            );
        }
        Ok(report)
    }

    /// Cancel and forget the alert for a deleted marker, if one is active.
    ///
    /// This is the explicit deletion path; it works even when the marker
    /// set becomes empty, which `update` treats as a no-op.
    pub async fn retire(&mut self, marker: MarkerId) -> UpdateReport {
        let mut report = UpdateReport::default();
        if self.active.contains_key(&marker) {
            self.cancel(marker, CancelCause::Removed, &mut report).await;
        }
        report
    }

    /// Current state of a marker.
    pub fn state_of(&self, marker: MarkerId) -> AlertState {
        if self.active.contains_key(&marker) {
            AlertState::ActiveAlert
        } else {
            AlertState::NoAlert
        }
    }

    /// The active alert for a marker, if any.
    pub fn active_alert(&self, marker: MarkerId) -> Option<&ActiveAlert> {
        self.active.get(&marker)
    }

    /// Ids of all markers with an active alert, in id order.
    pub fn active_markers(&self) -> Vec<MarkerId> {
        self.active.keys().copied().collect()
    }

    /// Number of active alerts.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether evaluating `fix` against `markers` would fire or cancel
    /// anything. Sends nothing to the sink.
    ///
    /// Mirrors [`update`](Self::update): no transitions for an empty
    /// snapshot, and an active marker missing from a non-empty snapshot
    /// counts as a change.
    pub fn would_change(&self, fix: &ObserverFix, markers: &[MarkerPoint]) -> bool {
        if markers.is_empty() || !fix.is_valid() {
            return false;
        }
        let crosses = |marker: &MarkerPoint| {
            self.is_inside(fix, marker).1 != self.active.contains_key(&marker.id)
        };
        let orphaned = |id: &MarkerId| !markers.iter().any(|m| m.id == *id);
        markers.iter().any(crosses) || self.active.keys().any(orphaned)
    }

    /// The distance threshold in kilometres.
    pub const fn threshold_km(&self) -> f64 {
        self.threshold_km
    }

    /// Borrow the sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutably borrow the sink.
    pub const fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the tracker and return its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    async fn evaluate(&mut self, fix: &ObserverFix, marker: &MarkerPoint, report: &mut UpdateReport) {
        let (distance_km, inside) = self.is_inside(fix, marker);
        report.evaluated = report.evaluated.saturating_add(1);
        let active = self.active.contains_key(&marker.id);
        trace!(marker_id = %marker.id, distance_km, inside, active, "marker evaluated");

        match (inside, active) {
            (true, false) => self.fire(fix, marker, distance_km, report).await,
            (false, true) => self.cancel(marker.id, CancelCause::Exited, report).await,
            (true, true) | (false, false) => {}
        }
    }

    /// Distance to the marker and whether that is inside the threshold.
    fn is_inside(&self, fix: &ObserverFix, marker: &MarkerPoint) -> (f64, bool) {
        let distance_km = haversine_km(
            fix.latitude,
            fix.longitude,
            marker.latitude,
            marker.longitude,
        );
        // NaN never compares less-than, so a corrupt marker counts as outside.
        (distance_km, distance_km < self.threshold_km)
    }

    async fn fire(
        &mut self,
        fix: &ObserverFix,
        marker: &MarkerPoint,
        distance_km: f64,
        report: &mut UpdateReport,
    ) {
        let content = AlertContent::for_marker(&self.alert_title, marker);
        let handle = match self.sink.fire(marker.id, &content).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(marker_id = %marker.id, error = %e, "failed to fire alert, marking active anyway");
                report.failures.push(e);
                None
            }
        };
        self.active.insert(
            marker.id,
            ActiveAlert {
                handle,
                fired_at: fix.timestamp,
            },
        );
        report.transitions.push((marker.id, AlertTransition::Fired));
        info!(marker_id = %marker.id, distance_km, "observer entered marker zone, alert fired");
    }

    async fn cancel(&mut self, marker: MarkerId, cause: CancelCause, report: &mut UpdateReport) {
        let handle = self.active.get(&marker).and_then(|a| a.handle);
        if let Some(handle) = handle
            && let Err(e) = self.sink.cancel(marker, handle).await
        {
            warn!(marker_id = %marker, error = %e, "failed to cancel alert, dropping state anyway");
            report.failures.push(e);
        }
        self.active.remove(&marker);
        report
            .transitions
            .push((marker, AlertTransition::Cancelled { cause }));
        info!(marker_id = %marker, ?cause, "alert cancelled");
    }
}

/// Check that a fix is usable for distance computation.
///
/// # Errors
///
/// Returns [`TrackerError::InvalidFix`] if either coordinate is non-finite
/// or out of range.
pub fn validate_fix(fix: &ObserverFix) -> Result<(), TrackerError> {
    if fix.is_valid() {
        Ok(())
    } else {
        warn!(
            latitude = fix.latitude,
            longitude = fix.longitude,
            "rejecting invalid observer fix"
        );
        Err(TrackerError::InvalidFix {
            latitude: fix.latitude,
            longitude: fix.longitude,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geo::offset_north;
    use crate::sink::RecordingSink;

    const BASE_LAT: f64 = 55.7558;
    const BASE_LON: f64 = 37.6173;

    fn tracker() -> ProximityTracker<RecordingSink> {
        ProximityTracker::new(RecordingSink::new(), &ProximityConfig::default())
    }

    fn marker(id: i64) -> MarkerPoint {
        MarkerPoint::new(MarkerId::new(id), BASE_LAT, BASE_LON)
    }

    /// A fix `km` kilometres due north of the base marker.
    fn fix_at_km(km: f64) -> ObserverFix {
        let (lat, lon) = offset_north(BASE_LAT, BASE_LON, km * 1000.0);
        ObserverFix::now(lat, lon)
    }

    #[tokio::test]
    async fn entry_fires_exactly_once() {
        let mut t = tracker();
        let markers = [marker(1)];
        let mut fire_steps = Vec::new();
        for (step, km) in [0.2, 0.2, 0.03, 0.03, 0.03].into_iter().enumerate() {
            let report = t.update(Some(&fix_at_km(km)), &markers).await.unwrap();
            if !report.fired().is_empty() {
                fire_steps.push(step);
            }
        }
        assert_eq!(fire_steps, vec![2]);
        assert_eq!(t.sink().fired(), vec![MarkerId::new(1)]);
        assert!(t.sink().cancelled().is_empty());
        assert_eq!(t.state_of(MarkerId::new(1)), AlertState::ActiveAlert);
    }

    #[tokio::test]
    async fn exit_cancels_exactly_once() {
        let mut t = tracker();
        let markers = [marker(1)];
        for km in [0.2, 0.2, 0.03, 0.03, 0.03] {
            t.update(Some(&fix_at_km(km)), &markers).await.unwrap();
        }
        let mut cancel_steps = Vec::new();
        for (step, km) in [0.03, 0.2, 0.2].into_iter().enumerate() {
            let report = t.update(Some(&fix_at_km(km)), &markers).await.unwrap();
            if !report.cancelled().is_empty() {
                cancel_steps.push(step);
            }
        }
        assert_eq!(cancel_steps, vec![1]);
        assert_eq!(t.sink().cancelled(), vec![MarkerId::new(1)]);
        assert_eq!(t.sink().fired().len(), 1);
        assert_eq!(t.state_of(MarkerId::new(1)), AlertState::NoAlert);
    }

    #[tokio::test]
    async fn exactly_at_threshold_is_outside() {
        // Place the fix on the exact threshold distance by construction so
        // the comparison is not at the mercy of a rounding error.
        let fix = ObserverFix::now(BASE_LAT, BASE_LON);
        let far = fix_at_km(0.05);
        let distance = haversine_km(BASE_LAT, BASE_LON, far.latitude, far.longitude);
        let config = ProximityConfig {
            threshold_km: distance,
            ..ProximityConfig::default()
        };
        let markers = [MarkerPoint::new(MarkerId::new(1), far.latitude, far.longitude)];

        // Previously outside: no fire.
        let mut t = ProximityTracker::new(RecordingSink::new(), &config);
        t.update(Some(&fix), &markers).await.unwrap();
        assert!(t.sink().fired().is_empty());

        // Previously inside: cancel.
        let mut t = ProximityTracker::new(RecordingSink::new(), &config);
        t.update(Some(&ObserverFix::now(far.latitude, far.longitude)), &markers)
            .await
            .unwrap();
        assert_eq!(t.sink().fired().len(), 1);
        t.update(Some(&fix), &markers).await.unwrap();
        assert_eq!(t.sink().cancelled(), vec![MarkerId::new(1)]);
    }

    #[tokio::test]
    async fn repeated_update_is_idempotent() {
        let mut t = tracker();
        let markers = [marker(1), marker(2)];
        let fix = fix_at_km(0.01);
        t.update(Some(&fix), &markers).await.unwrap();
        let calls_after_first = t.sink().calls().len();
        let second = t.update(Some(&fix), &markers).await.unwrap();
        assert!(second.is_quiet());
        assert_eq!(t.sink().calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn never_near_means_never_active() {
        let mut t = tracker();
        let markers = [marker(1)];
        for km in [5.0, 1.0, 0.5, 0.051, 10.0] {
            t.update(Some(&fix_at_km(km)), &markers).await.unwrap();
        }
        assert_eq!(t.active_count(), 0);
        assert!(t.sink().calls().is_empty());
    }

    #[tokio::test]
    async fn removed_marker_is_cancelled_without_moving() {
        let mut t = tracker();
        let fix = fix_at_km(0.0);
        let far = MarkerPoint::new(MarkerId::new(2), 0.0, 0.0);
        t.update(Some(&fix), &[marker(1), far]).await.unwrap();
        assert_eq!(t.active_markers(), vec![MarkerId::new(1)]);

        let report = t.update(Some(&fix), &[far]).await.unwrap();
        assert_eq!(
            report.transitions,
            vec![(
                MarkerId::new(1),
                AlertTransition::Cancelled {
                    cause: CancelCause::Removed
                }
            )]
        );
        assert_eq!(t.sink().cancelled(), vec![MarkerId::new(1)]);
        assert_eq!(t.active_count(), 0);
    }

    #[tokio::test]
    async fn markers_are_independent() {
        let mut t = tracker();
        let a = marker(1);
        let (b_lat, b_lon) = offset_north(BASE_LAT, BASE_LON, 500.0);
        let b = MarkerPoint::new(MarkerId::new(2), b_lat, b_lon);

        t.update(Some(&fix_at_km(0.01)), &[a, b]).await.unwrap();
        assert_eq!(t.sink().fired(), vec![MarkerId::new(1)]);
        assert_eq!(t.state_of(MarkerId::new(2)), AlertState::NoAlert);

        // Walk to B: A exits, B enters, nothing else.
        t.sink_mut().clear();
        t.update(Some(&fix_at_km(0.5)), &[a, b]).await.unwrap();
        assert_eq!(t.sink().cancelled(), vec![MarkerId::new(1)]);
        assert_eq!(t.sink().fired(), vec![MarkerId::new(2)]);
    }

    #[tokio::test]
    async fn missing_fix_or_markers_keeps_state() {
        let mut t = tracker();
        t.update(Some(&fix_at_km(0.0)), &[marker(1)]).await.unwrap();
        assert_eq!(t.active_count(), 1);

        assert!(t.update(None, &[marker(1)]).await.unwrap().is_quiet());
        assert!(t.update(Some(&fix_at_km(3.0)), &[]).await.unwrap().is_quiet());
        assert_eq!(t.active_count(), 1);
        assert!(t.sink().cancelled().is_empty());
    }

    #[tokio::test]
    async fn invalid_fix_is_rejected_without_mutation() {
        let mut t = tracker();
        t.update(Some(&fix_at_km(0.0)), &[marker(1)]).await.unwrap();
        let calls = t.sink().calls().len();

        let bad = ObserverFix::now(f64::NAN, BASE_LON);
        let err = t.update(Some(&bad), &[]).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidFix { .. }));
        assert_eq!(t.active_count(), 1);
        assert_eq!(t.sink().calls().len(), calls);
    }

    #[tokio::test]
    async fn fire_failure_still_marks_active() {
        let mut t = tracker();
        t.sink_mut().set_fail_fire(true);
        let markers = [marker(1)];
        let report = t.update(Some(&fix_at_km(0.0)), &markers).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(t.state_of(MarkerId::new(1)), AlertState::ActiveAlert);
        assert_eq!(
            t.active_alert(MarkerId::new(1)).map(|a| a.handle),
            Some(None)
        );

        // No retry while still inside.
        t.update(Some(&fix_at_km(0.0)), &markers).await.unwrap();
        assert_eq!(t.sink().fired().len(), 1);

        // Exit: no handle, so the sink is not asked to cancel.
        let report = t.update(Some(&fix_at_km(1.0)), &markers).await.unwrap();
        assert_eq!(report.cancelled(), vec![MarkerId::new(1)]);
        assert!(t.sink().cancelled().is_empty());
        assert_eq!(t.active_count(), 0);
    }

    #[tokio::test]
    async fn cancel_failure_still_drops_state() {
        let mut t = tracker();
        let markers = [marker(1)];
        t.update(Some(&fix_at_km(0.0)), &markers).await.unwrap();
        t.sink_mut().set_fail_cancel(true);
        let report = t.update(Some(&fix_at_km(1.0)), &markers).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(t.active_count(), 0);

        // Re-entry fires a fresh alert.
        t.update(Some(&fix_at_km(0.0)), &markers).await.unwrap();
        assert_eq!(t.sink().fired().len(), 2);
    }

    #[tokio::test]
    async fn retire_cancels_even_with_empty_snapshot() {
        let mut t = tracker();
        t.update(Some(&fix_at_km(0.0)), &[marker(1)]).await.unwrap();
        let report = t.retire(MarkerId::new(1)).await;
        assert_eq!(report.cancelled(), vec![MarkerId::new(1)]);
        assert_eq!(t.active_count(), 0);

        // Retiring again is a no-op.
        assert!(t.retire(MarkerId::new(1)).await.is_quiet());
        assert_eq!(t.sink().cancelled().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_ids_in_snapshot_are_evaluated_once() {
        let mut t = tracker();
        let near = marker(1);
        let far_same_id = MarkerPoint::new(MarkerId::new(1), 0.0, 0.0);
        let report = t
            .update(Some(&fix_at_km(0.0)), &[near, far_same_id])
            .await
            .unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(t.state_of(MarkerId::new(1)), AlertState::ActiveAlert);
    }

    #[tokio::test]
    async fn alert_content_uses_configured_title() {
        let config = ProximityConfig {
            alert_title: "Almost there".to_owned(),
            ..ProximityConfig::default()
        };
        let mut t = ProximityTracker::new(RecordingSink::new(), &config);
        t.update(Some(&fix_at_km(0.0)), &[marker(4)]).await.unwrap();
        let title = t.sink().calls().first().and_then(|c| match c {
            crate::sink::SinkCall::Fire { content, .. } => Some(content.title.clone()),
            crate::sink::SinkCall::Cancel { .. } => None,
        });
        assert_eq!(title.as_deref(), Some("Almost there"));
    }

    #[tokio::test]
    async fn would_change_sees_boundary_crossings_and_removals() {
        let mut t = tracker();
        let markers = [marker(1)];
        assert!(!t.would_change(&fix_at_km(0.2), &markers));
        assert!(t.would_change(&fix_at_km(0.03), &markers));
        assert!(t.sink().calls().is_empty());

        t.update(Some(&fix_at_km(0.03)), &markers).await.unwrap();
        assert!(!t.would_change(&fix_at_km(0.04), &markers));
        assert!(t.would_change(&fix_at_km(0.2), &markers));
        let far = MarkerPoint::new(MarkerId::new(2), 0.0, 0.0);
        assert!(t.would_change(&fix_at_km(0.04), &[far]));
        assert!(!t.would_change(&fix_at_km(0.2), &[]));
    }
}
