//! Proximity tracking for the Waymark proximity alert system.
//!
//! This crate owns the per-marker alert state machine: given the latest
//! observer fix and the full marker snapshot, it fires a one-shot alert
//! when the observer comes within the threshold of a marker and cancels it
//! when the observer leaves or the marker is deleted.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `waymark-config.yaml` into
//!   strongly-typed structs.
//! - [`geo`] -- Haversine great-circle distance.
//! - [`runner`] -- [`run_tracker`], the channel-driven tracker loop.
//! - [`service`] -- [`ProximityService`], the tracker plus latest inputs.
//! - [`sink`] -- [`AlertSink`] trait, [`ChannelSink`] and [`RecordingSink`].
//! - [`source`] -- [`FixGate`], throttling of raw position fixes.
//! - [`tracker`] -- [`ProximityTracker`], the state machine itself.
//!
//! [`run_tracker`]: runner::run_tracker
//! [`ProximityService`]: service::ProximityService
//! [`AlertSink`]: sink::AlertSink
//! [`ChannelSink`]: sink::ChannelSink
//! [`RecordingSink`]: sink::RecordingSink
//! [`FixGate`]: source::FixGate
//! [`ProximityTracker`]: tracker::ProximityTracker

pub mod config;
pub mod geo;
pub mod runner;
pub mod service;
pub mod sink;
pub mod source;
pub mod tracker;

pub use config::WaymarkConfig;
pub use runner::{TrackerInput, TrackerSummary, run_tracker};
pub use service::{FixOutcome, ProximityService, SharedService};
pub use sink::{AlertSink, ChannelSink, RecordingSink, SinkError, SinkEvent};
pub use tracker::{ProximityTracker, TrackerError, UpdateReport};
