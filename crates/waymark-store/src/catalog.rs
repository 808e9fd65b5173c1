//! Combined marker + image store with cascading deletes.
//!
//! The [`Catalog`] is the one object the application mutates. It keeps the
//! image store consistent with the marker store (no image outlives its
//! marker) and implements the map gestures: a long press on an empty spot
//! places a marker, a long press on an existing marker removes it.

use tracing::info;
use waymark_types::{ImageId, Marker, MarkerId, MarkerImage, MarkerPoint};

use crate::error::StoreError;
use crate::images::ImageStore;
use crate::markers::MarkerStore;

/// Outcome of a [`Catalog::toggle_at`] gesture.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Toggle {
    /// No marker was at the coordinate; a new one was placed.
    Created {
        /// The new marker's id.
        id: MarkerId,
    },
    /// A marker was at the coordinate and has been removed.
    Removed {
        /// The removed marker.
        marker: Marker,
        /// How many attached images were removed with it.
        images_removed: usize,
    },
}

/// Marker and image stores kept consistent with each other.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Catalog {
    markers: MarkerStore,
    images: ImageStore,
}

impl Catalog {
    /// Create an empty catalog.
    pub const fn new() -> Self {
        Self {
            markers: MarkerStore::new(),
            images: ImageStore::new(),
        }
    }

    /// Read access to the marker store.
    pub const fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// Read access to the image store.
    pub const fn images(&self) -> &ImageStore {
        &self.images
    }

    /// The marker snapshot handed to the proximity tracker.
    pub fn snapshot(&self) -> Vec<MarkerPoint> {
        self.markers.list()
    }

    /// Place a marker.
    ///
    /// # Errors
    ///
    /// See [`MarkerStore::create`].
    pub fn create_marker(&mut self, latitude: f64, longitude: f64) -> Result<MarkerId, StoreError> {
        let id = self.markers.create(latitude, longitude)?;
        info!(marker_id = %id, latitude, longitude, "marker placed");
        Ok(id)
    }

    /// Delete a marker and every image attached to it.
    ///
    /// Returns the removed marker and the number of images removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MarkerNotFound`] if no marker has this id.
    pub fn delete_marker(&mut self, id: MarkerId) -> Result<(Marker, usize), StoreError> {
        let marker = self.markers.delete(id)?;
        let images_removed = self.images.detach_all_for(id);
        info!(marker_id = %id, images_removed, "marker removed");
        Ok((marker, images_removed))
    }

    /// Long-press gesture: remove the marker at this exact coordinate if
    /// there is one, otherwise place a new marker there.
    ///
    /// # Errors
    ///
    /// See [`MarkerStore::create`].
    pub fn toggle_at(&mut self, latitude: f64, longitude: f64) -> Result<Toggle, StoreError> {
        if let Some(existing) = self.markers.find_at(latitude, longitude).map(|m| m.id) {
            let (marker, images_removed) = self.delete_marker(existing)?;
            return Ok(Toggle::Removed {
                marker,
                images_removed,
            });
        }
        let id = self.create_marker(latitude, longitude)?;
        Ok(Toggle::Created { id })
    }

    /// Attach an image to an existing marker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MarkerNotFound`] if the marker does not exist,
    /// or any error from [`ImageStore::attach`].
    pub fn attach_image(&mut self, marker_id: MarkerId, uri: &str) -> Result<ImageId, StoreError> {
        if !self.markers.contains(marker_id) {
            return Err(StoreError::MarkerNotFound(marker_id));
        }
        self.images.attach(marker_id, uri)
    }

    /// Remove a single image.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ImageNotFound`] if no image has this id.
    pub fn detach_image(&mut self, image_id: ImageId) -> Result<MarkerImage, StoreError> {
        self.images.detach(image_id)
    }

    /// Images attached to a marker, in attach order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MarkerNotFound`] if the marker does not exist.
    pub fn images_for(&self, marker_id: MarkerId) -> Result<Vec<MarkerImage>, StoreError> {
        if !self.markers.contains(marker_id) {
            return Err(StoreError::MarkerNotFound(marker_id));
        }
        Ok(self.images.list_for(marker_id))
    }

    /// Remove the image with `uri` from a marker (long press on a photo).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MarkerNotFound`] if the marker does not exist.
    pub fn detach_image_by_uri(
        &mut self,
        marker_id: MarkerId,
        uri: &str,
    ) -> Result<Option<MarkerImage>, StoreError> {
        if !self.markers.contains(marker_id) {
            return Err(StoreError::MarkerNotFound(marker_id));
        }
        let Some(image_id) = self.images.find_by_uri(marker_id, uri).map(|i| i.id) else {
            return Ok(None);
        };
        self.images.detach(image_id).map(Some)
    }
}
