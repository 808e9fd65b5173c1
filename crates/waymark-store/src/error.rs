//! Error types for the `waymark-store` crate.
//!
//! All fallible store operations return [`StoreError`].

use waymark_types::{ImageId, MarkerId};

/// Errors that can occur during marker and image store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No marker exists with the given id.
    #[error("marker not found: {0}")]
    MarkerNotFound(MarkerId),

    /// No image exists with the given id.
    #[error("image not found: {0}")]
    ImageNotFound(ImageId),

    /// The coordinate is not finite or lies outside latitude/longitude bounds.
    #[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate {
        /// Rejected latitude.
        latitude: f64,
        /// Rejected longitude.
        longitude: f64,
    },

    /// An image was attached with an empty URI.
    #[error("image uri must not be empty")]
    EmptyUri,

    /// The autoincrement counter ran out of ids.
    #[error("id space exhausted")]
    IdSpaceExhausted,
}
