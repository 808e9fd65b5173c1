//! Tracker loop driven by a bounded input channel.
//!
//! This module provides [`run_tracker`], the async function that owns a
//! [`ProximityService`] and applies inputs from the position source and the
//! marker store in arrival order:
//!
//! - **Fixes** go through the gate and, if accepted, trigger an evaluation
//! - **Marker snapshots** replace the current snapshot and re-evaluate
//! - **Retirements** cancel the alert of a deleted marker
//!
//! Inputs are processed one at a time, so evaluations never overlap. The
//! loop ends when every sender has been dropped.

use tokio::sync::mpsc;
use tracing::{info, warn};
use waymark_types::{MarkerId, MarkerPoint, ObserverFix};

use crate::service::{FixOutcome, ProximityService};
use crate::sink::AlertSink;
use crate::tracker::UpdateReport;

/// One message for the tracker loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerInput {
    /// A new observer fix from the position source.
    Fix(ObserverFix),
    /// The full current marker snapshot.
    Markers(Vec<MarkerPoint>),
    /// A marker was deleted.
    Retire(MarkerId),
}

/// Counters accumulated over a tracker loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerSummary {
    /// Inputs received.
    pub inputs: u64,
    /// Fixes that led to an evaluation.
    pub fixes_accepted: u64,
    /// Fixes dropped by the gate as too frequent.
    pub fixes_throttled: u64,
    /// Fixes dropped as older than the last accepted one.
    pub fixes_stale: u64,
    /// Fixes dropped as stamped too far in the future.
    pub fixes_future: u64,
    /// Fixes rejected as invalid.
    pub fixes_rejected: u64,
    /// Alerts fired.
    pub alerts_fired: u64,
    /// Alerts cancelled.
    pub alerts_cancelled: u64,
    /// Sink calls that failed.
    pub sink_failures: u64,
}

impl TrackerSummary {
    fn record(&mut self, report: &UpdateReport) {
        self.alerts_fired = self.alerts_fired.saturating_add(count(report.fired().len()));
        self.alerts_cancelled = self
            .alerts_cancelled
            .saturating_add(count(report.cancelled().len()));
        self.sink_failures = self
            .sink_failures
            .saturating_add(count(report.failures.len()));
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Create the bounded channel that feeds [`run_tracker`].
pub fn tracker_channel(
    capacity: usize,
) -> (mpsc::Sender<TrackerInput>, mpsc::Receiver<TrackerInput>) {
    mpsc::channel(capacity.max(1))
}

/// Run the tracker loop until the input channel closes.
///
/// Invalid fixes are logged and counted; they never stop the loop.
pub async fn run_tracker<S: AlertSink>(
    service: &mut ProximityService<S>,
    mut inputs: mpsc::Receiver<TrackerInput>,
) -> TrackerSummary {
    let mut summary = TrackerSummary::default();
    info!("tracker loop starting");

    while let Some(input) = inputs.recv().await {
        summary.inputs = summary.inputs.saturating_add(1);
        match input {
            TrackerInput::Fix(fix) => match service.submit_fix(fix).await {
                Ok(FixOutcome::Evaluated(report)) => {
                    summary.fixes_accepted = summary.fixes_accepted.saturating_add(1);
                    summary.record(&report);
                }
                Ok(FixOutcome::Throttled) => {
                    summary.fixes_throttled = summary.fixes_throttled.saturating_add(1);
                }
                Ok(FixOutcome::Stale) => {
                    summary.fixes_stale = summary.fixes_stale.saturating_add(1);
                }
                Ok(FixOutcome::Future) => {
                    summary.fixes_future = summary.fixes_future.saturating_add(1);
                }
                Err(e) => {
                    warn!(error = %e, "dropping fix");
                    summary.fixes_rejected = summary.fixes_rejected.saturating_add(1);
                }
            },
            TrackerInput::Markers(markers) => match service.refresh_markers(markers).await {
                Ok(report) => summary.record(&report),
                Err(e) => warn!(error = %e, "marker refresh failed"),
            },
            TrackerInput::Retire(marker) => {
                let report = service.retire(marker).await;
                summary.record(&report);
            }
        }
    }

    summary
}

/// Log the end of a tracker loop run.
pub fn log_tracker_end(summary: &TrackerSummary) {
    info!(
        inputs = summary.inputs,
        fixes_accepted = summary.fixes_accepted,
        fixes_throttled = summary.fixes_throttled,
        fixes_stale = summary.fixes_stale,
        fixes_future = summary.fixes_future,
        fixes_rejected = summary.fixes_rejected,
        alerts_fired = summary.alerts_fired,
        alerts_cancelled = summary.alerts_cancelled,
        "tracker loop ended"
    );
    if summary.sink_failures > 0 {
        warn!(
            sink_failures = summary.sink_failures,
            "some alerts could not be delivered or cancelled"
        );
    }
}
