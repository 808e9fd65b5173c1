//! Enumeration types for the proximity alert state machine.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Per-marker alert state.
///
/// Every marker starts in [`AlertState::NoAlert`]. Entering the proximity
/// threshold moves it to [`AlertState::ActiveAlert`] (firing an alert);
/// leaving the threshold or deleting the marker moves it back (cancelling).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    /// No alert is active: never triggered, or already cancelled.
    #[default]
    NoAlert,
    /// An alert was fired and has not been cancelled yet.
    ActiveAlert,
}

/// Why an active alert was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum CancelCause {
    /// The observer moved to or beyond the threshold distance.
    Exited,
    /// The marker disappeared from the snapshot (deleted by the user).
    Removed,
}

/// A single state transition applied during an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AlertTransition {
    /// `NoAlert -> ActiveAlert`; the sink was asked to fire.
    Fired,
    /// `ActiveAlert -> NoAlert`; the sink was asked to cancel.
    Cancelled {
        /// What triggered the cancellation.
        cause: CancelCause,
    },
}
