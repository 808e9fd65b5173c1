//! Marker storage keyed by autoincrement id.
//!
//! The [`MarkerStore`] owns every marker the user has placed. Ids start at
//! 1 and are never reused, so a deleted marker's id cannot be picked up by
//! a later marker and confuse the tracker's alert bookkeeping.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;
use waymark_types::{Marker, MarkerId, MarkerPoint, is_valid_coordinate};

use crate::error::StoreError;

/// Store of placed markers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MarkerStore {
    /// All markers indexed by id.
    markers: BTreeMap<MarkerId, Marker>,
    /// The id handed to the next created marker.
    next_id: i64,
}

impl MarkerStore {
    /// Create an empty store. The first marker receives id 1.
    pub const fn new() -> Self {
        Self {
            markers: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Place a new marker and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCoordinate`] if the coordinate is not
    /// finite or out of bounds, or [`StoreError::IdSpaceExhausted`] if the
    /// id counter overflowed.
    pub fn create(&mut self, latitude: f64, longitude: f64) -> Result<MarkerId, StoreError> {
        if !is_valid_coordinate(latitude, longitude) {
            return Err(StoreError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }
        let id = MarkerId::new(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(StoreError::IdSpaceExhausted)?;
        self.markers.insert(
            id,
            Marker {
                id,
                latitude,
                longitude,
                created_at: Utc::now(),
            },
        );
        debug!(marker_id = %id, latitude, longitude, "marker created");
        Ok(id)
    }

    /// Delete a marker and return its record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MarkerNotFound`] if no marker has this id.
    pub fn delete(&mut self, id: MarkerId) -> Result<Marker, StoreError> {
        let removed = self
            .markers
            .remove(&id)
            .ok_or(StoreError::MarkerNotFound(id))?;
        debug!(marker_id = %id, "marker deleted");
        Ok(removed)
    }

    /// Snapshot of every marker in id order, as consumed by the tracker.
    pub fn list(&self) -> Vec<MarkerPoint> {
        self.markers.values().map(Marker::point).collect()
    }

    /// Full marker records in id order.
    pub fn records(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    /// Look up a marker record.
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    /// Whether a marker with this id exists.
    pub fn contains(&self, id: MarkerId) -> bool {
        self.markers.contains_key(&id)
    }

    /// Find the marker placed at exactly this coordinate.
    ///
    /// Matching is bit-exact: the map hands back the same coordinate the
    /// marker was created with, so no tolerance is applied.
    pub fn find_at(&self, latitude: f64, longitude: f64) -> Option<&Marker> {
        self.markers.values().find(|m| {
            m.latitude.to_bits() == latitude.to_bits()
                && m.longitude.to_bits() == longitude.to_bits()
        })
    }

    /// Number of markers in the store.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the store holds no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl Default for MarkerStore {
    fn default() -> Self {
        Self::new()
    }
}
