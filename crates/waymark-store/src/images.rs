//! Photo attachments for markers.
//!
//! The [`ImageStore`] does not know which markers exist; the
//! [`Catalog`](crate::Catalog) checks that before attaching and cascades
//! marker deletion into [`ImageStore::detach_all_for`].

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;
use waymark_types::{ImageId, MarkerId, MarkerImage};

use crate::error::StoreError;

/// Store of images attached to markers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ImageStore {
    /// All images indexed by id. Id order equals attach order.
    images: BTreeMap<ImageId, MarkerImage>,
    /// The id handed to the next attached image.
    next_id: i64,
}

impl ImageStore {
    /// Create an empty store. The first image receives id 1.
    pub const fn new() -> Self {
        Self {
            images: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Attach an image to a marker and return the new image id.
    ///
    /// The caller is responsible for checking that `marker_id` exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyUri`] for a blank uri, or
    /// [`StoreError::IdSpaceExhausted`] if the id counter overflowed.
    pub fn attach(&mut self, marker_id: MarkerId, uri: &str) -> Result<ImageId, StoreError> {
        if uri.trim().is_empty() {
            return Err(StoreError::EmptyUri);
        }
        let id = ImageId::new(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(StoreError::IdSpaceExhausted)?;
        self.images.insert(
            id,
            MarkerImage {
                id,
                marker_id,
                uri: uri.to_owned(),
                created_at: Utc::now(),
            },
        );
        debug!(image_id = %id, marker_id = %marker_id, uri, "image attached");
        Ok(id)
    }

    /// Remove a single image.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ImageNotFound`] if no image has this id.
    pub fn detach(&mut self, id: ImageId) -> Result<MarkerImage, StoreError> {
        let removed = self
            .images
            .remove(&id)
            .ok_or(StoreError::ImageNotFound(id))?;
        debug!(image_id = %id, "image detached");
        Ok(removed)
    }

    /// Remove every image belonging to `marker_id`. Returns how many went.
    pub fn detach_all_for(&mut self, marker_id: MarkerId) -> usize {
        let before = self.images.len();
        self.images.retain(|_, img| img.marker_id != marker_id);
        before.saturating_sub(self.images.len())
    }

    /// All images attached to `marker_id`, in attach order.
    pub fn list_for(&self, marker_id: MarkerId) -> Vec<MarkerImage> {
        self.images
            .values()
            .filter(|img| img.marker_id == marker_id)
            .cloned()
            .collect()
    }

    /// Find an image on `marker_id` by its uri.
    pub fn find_by_uri(&self, marker_id: MarkerId, uri: &str) -> Option<&MarkerImage> {
        self.images
            .values()
            .find(|img| img.marker_id == marker_id && img.uri == uri)
    }

    /// Look up an image record.
    pub fn get(&self, id: ImageId) -> Option<&MarkerImage> {
        self.images.get(&id)
    }

    /// Total number of images across all markers.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the store holds no images.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn attach_and_list_in_order() {
        let mut store = ImageStore::new();
        let m = MarkerId::new(1);
        let first = store.attach(m, "file:///a.jpg").unwrap();
        let second = store.attach(m, "file:///b.jpg").unwrap();
        store.attach(MarkerId::new(2), "file:///c.jpg").unwrap();

        let listed: Vec<ImageId> = store.list_for(m).iter().map(|i| i.id).collect();
        assert_eq!(listed, vec![first, second]);
    }

    #[test]
    fn empty_uri_is_rejected() {
        let mut store = ImageStore::new();
        assert!(matches!(
            store.attach(MarkerId::new(1), "  "),
            Err(StoreError::EmptyUri)
        ));
    }

    #[test]
    fn detach_missing_image_fails() {
        let mut store = ImageStore::new();
        assert!(matches!(
            store.detach(ImageId::new(5)),
            Err(StoreError::ImageNotFound(_))
        ));
    }

    #[test]
    fn detach_all_only_touches_one_marker() {
        let mut store = ImageStore::new();
        let m1 = MarkerId::new(1);
        let m2 = MarkerId::new(2);
        store.attach(m1, "a").unwrap();
        store.attach(m1, "b").unwrap();
        store.attach(m2, "c").unwrap();

        assert_eq!(store.detach_all_for(m1), 2);
        assert!(store.list_for(m1).is_empty());
        assert_eq!(store.list_for(m2).len(), 1);
    }

    #[test]
    fn find_by_uri_is_scoped_to_marker() {
        let mut store = ImageStore::new();
        let m1 = MarkerId::new(1);
        let m2 = MarkerId::new(2);
        let id = store.attach(m1, "same").unwrap();
        store.attach(m2, "same").unwrap();
        assert_eq!(store.find_by_uri(m1, "same").map(|i| i.id), Some(id));
        assert!(store.find_by_uri(m1, "other").is_none());
    }

    #[test]
    fn len_counts_images_across_markers() {
        let mut store = ImageStore::new();
        assert!(store.is_empty());
        let first = store.attach(MarkerId::new(1), "a").unwrap();
        store.attach(MarkerId::new(2), "b").unwrap();
        assert_eq!(store.len(), 2);
        store.detach(first).unwrap();
        assert_eq!(store.len(), 1);
    }
}
