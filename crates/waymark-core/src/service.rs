//! The proximity service: tracker plus the latest inputs.
//!
//! The position source and the marker store both push into the service.
//! It remembers the latest accepted fix and the latest marker snapshot and
//! re-runs the tracker whenever either changes, so the tracker always sees
//! a consistent (fix, snapshot) pair.
//!
//! Serialization: every mutating method takes `&mut self`. When several
//! tasks need to drive one service, wrap it in a [`SharedService`]; the
//! async mutex is held across the sink calls, so evaluations run one at a
//! time in lock order.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use waymark_types::{AlertState, MarkerId, MarkerPoint, ObserverFix};

use crate::config::WaymarkConfig;
use crate::sink::AlertSink;
use crate::source::{FixGate, GateDecision};
use crate::tracker::{ProximityTracker, TrackerError, UpdateReport, validate_fix};

/// A service shared between tasks.
pub type SharedService<S> = Arc<Mutex<ProximityService<S>>>;

/// What happened to a submitted fix.
#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    /// The fix was accepted and the markers were re-evaluated.
    Evaluated(UpdateReport),
    /// Dropped by the gate: too soon and too close to the last fix.
    Throttled,
    /// Dropped by the gate: older than the last accepted fix.
    Stale,
    /// Dropped by the gate: stamped too far in the future.
    Future,
}

impl FixOutcome {
    /// The evaluation report, if the fix got that far.
    pub const fn report(&self) -> Option<&UpdateReport> {
        match self {
            Self::Evaluated(report) => Some(report),
            Self::Throttled | Self::Stale | Self::Future => None,
        }
    }
}

/// Tracker fed by a position source and a marker store.
#[derive(Debug)]
pub struct ProximityService<S> {
    tracker: ProximityTracker<S>,
    gate: FixGate,
    last_fix: Option<ObserverFix>,
    markers: Vec<MarkerPoint>,
}

impl<S: AlertSink> ProximityService<S> {
    /// Build a service from config, delivering alerts to `sink`.
    pub fn new(sink: S, config: &WaymarkConfig) -> Self {
        Self {
            tracker: ProximityTracker::new(sink, &config.proximity),
            gate: FixGate::new(config.source.clone()),
            last_fix: None,
            markers: Vec::new(),
        }
    }

    /// Wrap the service for use from several tasks.
    pub fn into_shared(self) -> SharedService<S> {
        Arc::new(Mutex::new(self))
    }

    /// Offer a new fix from the position source.
    ///
    /// A fix the gate would throttle is still evaluated when it moves the
    /// observer into or out of a marker zone, so entering a zone with a
    /// small last step still fires.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidFix`] for a non-finite or
    /// out-of-range fix. The fix is not remembered and no state changes.
    pub async fn submit_fix(&mut self, fix: ObserverFix) -> Result<FixOutcome, TrackerError> {
        validate_fix(&fix)?;
        match self.gate.check(&fix, self.last_fix.as_ref()) {
            GateDecision::Throttle if self.tracker.would_change(&fix, &self.markers) => {
                debug!(
                    latitude = fix.latitude,
                    longitude = fix.longitude,
                    "throttled fix crosses a zone boundary, evaluating"
                );
            }
            GateDecision::Throttle => {
                debug!(latitude = fix.latitude, longitude = fix.longitude, "fix throttled");
                return Ok(FixOutcome::Throttled);
            }
            GateDecision::Stale => {
                debug!(timestamp = %fix.timestamp, "stale fix dropped");
                return Ok(FixOutcome::Stale);
            }
            GateDecision::Future => {
                warn!(timestamp = %fix.timestamp, "fix stamped in the future dropped");
                return Ok(FixOutcome::Future);
            }
            GateDecision::Accept => {}
        }
        self.last_fix = Some(fix);
        let report = self.tracker.update(Some(&fix), &self.markers).await?;
        Ok(FixOutcome::Evaluated(report))
    }

    /// Replace the marker snapshot and re-evaluate.
    ///
    /// Markers missing from `markers` that had an active alert are
    /// cancelled. An empty snapshot is stored but does not cancel
    /// anything; use [`retire`](Self::retire) for deletions.
    ///
    /// # Errors
    ///
    /// Only fails if the stored fix is invalid, which `submit_fix`
    /// prevents.
    pub async fn refresh_markers(
        &mut self,
        markers: Vec<MarkerPoint>,
    ) -> Result<UpdateReport, TrackerError> {
        self.markers = markers;
        self.tracker
            .update(self.last_fix.as_ref(), &self.markers)
            .await
    }

    /// A marker was deleted: drop it from the snapshot and cancel its alert.
    pub async fn retire(&mut self, marker: MarkerId) -> UpdateReport {
        self.markers.retain(|m| m.id != marker);
        self.tracker.retire(marker).await
    }

    /// The last fix that passed the gate.
    pub const fn last_fix(&self) -> Option<&ObserverFix> {
        self.last_fix.as_ref()
    }

    /// The current marker snapshot.
    pub fn markers(&self) -> &[MarkerPoint] {
        &self.markers
    }

    /// Alert state of one marker.
    pub fn state_of(&self, marker: MarkerId) -> AlertState {
        self.tracker.state_of(marker)
    }

    /// Read access to the tracker.
    pub const fn tracker(&self) -> &ProximityTracker<S> {
        &self.tracker
    }

    /// Mutable access to the tracker (and through it, the sink).
    pub const fn tracker_mut(&mut self) -> &mut ProximityTracker<S> {
        &mut self.tracker
    }
}
