//! Shared type definitions for the Waymark proximity alert system.
//!
//! This crate is the single source of truth for the records that flow
//! between the marker/image stores, the proximity tracker, and alert sinks.
//! Types defined here flow downstream to `TypeScript` via `ts-rs` for the
//! map front end.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe integer wrappers for marker, image, and alert keys
//! - [`enums`] -- Alert state machine states and transitions
//! - [`structs`] -- Observer fixes, marker points, stored records, alert text

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AlertState, AlertTransition, CancelCause};
pub use ids::{AlertHandle, ImageId, MarkerId};
pub use structs::{
    AlertContent, LATITUDE_RANGE, LONGITUDE_RANGE, Marker, MarkerImage, MarkerPoint, ObserverFix,
    is_valid_coordinate,
};
