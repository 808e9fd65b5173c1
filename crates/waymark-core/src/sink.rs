//! Alert sink trait and implementations.
//!
//! The tracker never renders alerts itself. It asks an [`AlertSink`] to
//! fire an alert for a marker, keeps the [`AlertHandle`] the sink returns,
//! and later hands that handle back to cancel the alert. How alerts reach
//! the user (OS notification, log line, push message) is up to the sink.
//!
//! Both operations are async and are awaited by the tracker before the
//! state change they guard is committed.
//!
//! Implementations:
//!
//! - [`ChannelSink`] forwards [`SinkEvent`]s over a `tokio` channel to
//!   whatever task actually delivers them.
//! - [`RecordingSink`] records every call in memory and can be told to
//!   fail; used by tests and dry runs.

use std::future::Future;

use serde::Serialize;
use tokio::sync::mpsc;
use waymark_types::{AlertContent, AlertHandle, MarkerId};

/// Errors reported by an alert sink.
///
/// Sink failures are never fatal to the tracker: they are logged and
/// reported alongside the evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The alert could not be delivered or retracted.
    #[error("alert delivery failed for marker {marker}: {message}")]
    Delivery {
        /// The marker the alert was for.
        marker: MarkerId,
        /// Description of the failure.
        message: String,
    },

    /// The sink's downstream receiver is gone.
    #[error("alert sink closed")]
    Closed,
}

/// Destination for fire and cancel requests.
///
/// Uses return-position `impl Future` so implementations can be written
/// with plain `async fn` while the tracker stays generic over the sink.
pub trait AlertSink: Send {
    /// Fire a one-shot alert for `marker` and return a handle for it.
    fn fire(
        &mut self,
        marker: MarkerId,
        content: &AlertContent,
    ) -> impl Future<Output = Result<AlertHandle, SinkError>> + Send;

    /// Cancel the alert previously fired under `handle`.
    ///
    /// Best-effort: cancelling an alert that was already delivered or has
    /// expired is not an error.
    fn cancel(
        &mut self,
        marker: MarkerId,
        handle: AlertHandle,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Hands out monotonically increasing alert handles, starting at 1.
#[derive(Debug, Clone, Default)]
struct HandleCounter {
    last: u64,
}

impl HandleCounter {
    const fn next(&mut self) -> AlertHandle {
        self.last = self.last.saturating_add(1);
        AlertHandle::new(self.last)
    }
}

// ---------------------------------------------------------------------------
// ChannelSink
// ---------------------------------------------------------------------------

/// A fire or cancel request as forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SinkEvent {
    /// An alert should be shown.
    Fired {
        /// The marker that was approached.
        marker_id: MarkerId,
        /// Handle identifying this alert.
        handle: AlertHandle,
        /// Alert text.
        content: AlertContent,
    },
    /// A previously shown alert should be retracted.
    Cancelled {
        /// The marker whose alert is retracted.
        marker_id: MarkerId,
        /// Handle of the alert being retracted.
        handle: AlertHandle,
    },
}

/// Sink that forwards requests to a delivery task over a bounded channel.
///
/// `fire` and `cancel` complete once the request is queued; if the queue is
/// full they wait, which applies back-pressure to the tracker.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
    handles: HandleCounter,
}

impl ChannelSink {
    /// Create a sink and the receiver its events are delivered to.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                handles: HandleCounter::default(),
            },
            rx,
        )
    }
}

impl AlertSink for ChannelSink {
    async fn fire(
        &mut self,
        marker: MarkerId,
        content: &AlertContent,
    ) -> Result<AlertHandle, SinkError> {
        let handle = self.handles.next();
        self.tx
            .send(SinkEvent::Fired {
                marker_id: marker,
                handle,
                content: content.clone(),
            })
            .await
            .map_err(|_closed| SinkError::Closed)?;
        Ok(handle)
    }

    async fn cancel(&mut self, marker: MarkerId, handle: AlertHandle) -> Result<(), SinkError> {
        self.tx
            .send(SinkEvent::Cancelled {
                marker_id: marker,
                handle,
            })
            .await
            .map_err(|_closed| SinkError::Closed)
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    /// `fire` was called.
    Fire {
        /// Target marker.
        marker: MarkerId,
        /// Handle returned (or that would have been returned on failure).
        handle: AlertHandle,
        /// Alert text.
        content: AlertContent,
    },
    /// `cancel` was called.
    Cancel {
        /// Target marker.
        marker: MarkerId,
        /// Handle passed in.
        handle: AlertHandle,
    },
}

/// In-memory sink that records every call.
///
/// Failed calls are recorded too, so tests can count attempts.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    calls: Vec<SinkCall>,
    handles: HandleCounter,
    fail_fire: bool,
    fail_cancel: bool,
}

impl RecordingSink {
    /// Create a sink that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `fire` calls fail (or succeed again).
    pub const fn set_fail_fire(&mut self, fail: bool) {
        self.fail_fire = fail;
    }

    /// Make subsequent `cancel` calls fail (or succeed again).
    pub const fn set_fail_cancel(&mut self, fail: bool) {
        self.fail_cancel = fail;
    }

    /// Every call received, in order.
    pub fn calls(&self) -> &[SinkCall] {
        &self.calls
    }

    /// Markers `fire` was called for, in order.
    pub fn fired(&self) -> Vec<MarkerId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Fire { marker, .. } => Some(*marker),
                SinkCall::Cancel { .. } => None,
            })
            .collect()
    }

    /// Markers `cancel` was called for, in order.
    pub fn cancelled(&self) -> Vec<MarkerId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Cancel { marker, .. } => Some(*marker),
                SinkCall::Fire { .. } => None,
            })
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl AlertSink for RecordingSink {
    fn fire(
        &mut self,
        marker: MarkerId,
        content: &AlertContent,
    ) -> impl Future<Output = Result<AlertHandle, SinkError>> + Send {
        let handle = self.handles.next();
        self.calls.push(SinkCall::Fire {
            marker,
            handle,
            content: content.clone(),
        });
        let result = if self.fail_fire {
            Err(SinkError::Delivery {
                marker,
                message: "injected fire failure".to_owned(),
            })
        } else {
            Ok(handle)
        };
        std::future::ready(result)
    }

    fn cancel(
        &mut self,
        marker: MarkerId,
        handle: AlertHandle,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        self.calls.push(SinkCall::Cancel { marker, handle });
        let result = if self.fail_cancel {
            Err(SinkError::Delivery {
                marker,
                message: "injected cancel failure".to_owned(),
            })
        } else {
            Ok(())
        };
        std::future::ready(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn content() -> AlertContent {
        AlertContent {
            title: "t".to_owned(),
            body: "b".to_owned(),
        }
    }

    #[tokio::test]
    async fn recording_sink_hands_out_increasing_handles() {
        let mut sink = RecordingSink::new();
        let a = sink.fire(MarkerId::new(1), &content()).await.unwrap();
        let b = sink.fire(MarkerId::new(2), &content()).await.unwrap();
        assert!(a < b);
        assert_eq!(sink.fired(), vec![MarkerId::new(1), MarkerId::new(2)]);
    }

    #[tokio::test]
    async fn recording_sink_records_failed_calls() {
        let mut sink = RecordingSink::new();
        sink.set_fail_fire(true);
        sink.set_fail_cancel(true);
        assert!(sink.fire(MarkerId::new(1), &content()).await.is_err());
        assert!(
            sink.cancel(MarkerId::new(1), AlertHandle::new(1))
                .await
                .is_err()
        );
        assert_eq!(sink.calls().len(), 2);
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (mut sink, mut rx) = ChannelSink::channel(4);
        let handle = sink.fire(MarkerId::new(5), &content()).await.unwrap();
        sink.cancel(MarkerId::new(5), handle).await.unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(SinkEvent::Fired { marker_id, .. }) if marker_id == MarkerId::new(5)
        ));
        assert_eq!(
            rx.recv().await,
            Some(SinkEvent::Cancelled {
                marker_id: MarkerId::new(5),
                handle
            })
        );
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (mut sink, rx) = ChannelSink::channel(1);
        drop(rx);
        assert_eq!(
            sink.fire(MarkerId::new(1), &content()).await,
            Err(SinkError::Closed)
        );
    }
}
