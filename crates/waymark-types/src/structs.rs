//! Core record types exchanged between the stores, the tracker, and sinks.
//!
//! Covers the observer position sample ([`ObserverFix`]), the read-only
//! marker snapshot entry ([`MarkerPoint`]), the stored marker and image
//! records, and the payload delivered with a fired alert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{ImageId, MarkerId};

/// Latitude bounds in degrees.
pub const LATITUDE_RANGE: core::ops::RangeInclusive<f64> = -90.0..=90.0;

/// Longitude bounds in degrees.
pub const LONGITUDE_RANGE: core::ops::RangeInclusive<f64> = -180.0..=180.0;

/// Check that a latitude/longitude pair is finite and inside WGS84 bounds.
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && LATITUDE_RANGE.contains(&latitude)
        && LONGITUDE_RANGE.contains(&longitude)
}

// ---------------------------------------------------------------------------
// Observer position
// ---------------------------------------------------------------------------

/// One observer position sample pushed by the position source.
///
/// Every newer fix supersedes the previous one; no history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ObserverFix {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

impl ObserverFix {
    /// Create a fix taken at `timestamp`.
    pub const fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Create a fix stamped with the current wall-clock time.
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, Utc::now())
    }

    /// Whether both coordinates are finite and within bounds.
    pub fn is_valid(&self) -> bool {
        is_valid_coordinate(self.latitude, self.longitude)
    }
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// A marker as seen by the tracker: id plus coordinate.
///
/// The tracker receives a full list of these on every evaluation and never
/// mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MarkerPoint {
    /// Stable marker id.
    pub id: MarkerId,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl MarkerPoint {
    /// Create a marker point.
    pub const fn new(id: MarkerId, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            latitude,
            longitude,
        }
    }
}

/// A marker record as held by the marker store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Marker {
    /// Stable marker id, assigned on creation.
    pub id: MarkerId,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// When the marker was placed.
    pub created_at: DateTime<Utc>,
}

impl Marker {
    /// Project the record down to the tracker's snapshot entry.
    pub const fn point(&self) -> MarkerPoint {
        MarkerPoint::new(self.id, self.latitude, self.longitude)
    }
}

/// A photo attached to a marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MarkerImage {
    /// Stable image id, assigned on attach.
    pub id: ImageId,
    /// The marker this image belongs to.
    pub marker_id: MarkerId,
    /// Location of the image payload (file or content URI).
    pub uri: String,
    /// When the image was attached.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Text delivered with a fired proximity alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AlertContent {
    /// Short headline.
    pub title: String,
    /// Longer body text.
    pub body: String,
}

impl AlertContent {
    /// Build the alert text for `marker`.
    ///
    /// The body is `Marker: ` followed by the marker point as JSON.
    pub fn for_marker(title: &str, marker: &MarkerPoint) -> Self {
        let json = serde_json::to_string(marker).unwrap_or_else(|_| marker.id.to_string());
        Self {
            title: title.to_owned(),
            body: format!("Marker: {json}"),
        }
    }
}
