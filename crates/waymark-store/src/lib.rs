//! Marker and image stores for the Waymark proximity alert system.
//!
//! These are the collaborators the proximity tracker reads from: a marker
//! store handing out full snapshots, and an image store for photos attached
//! to markers. Both are in-memory; durable persistence is left to the
//! embedding application.
//!
//! # Modules
//!
//! - [`catalog`] -- [`Catalog`] keeps both stores consistent (cascade
//!   delete) and implements the long-press toggle gesture.
//! - [`error`] -- Error types for store operations.
//! - [`images`] -- [`ImageStore`], photos keyed by autoincrement id.
//! - [`markers`] -- [`MarkerStore`], markers keyed by autoincrement id.

pub mod catalog;
pub mod error;
pub mod images;
pub mod markers;

// Re-export primary types at crate root.
pub use catalog::{Catalog, Toggle};
pub use error::StoreError;
pub use images::ImageStore;
pub use markers::MarkerStore;
