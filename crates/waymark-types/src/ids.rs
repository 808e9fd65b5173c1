//! Type-safe identifier wrappers around integer keys.
//!
//! Markers and images are keyed by autoincrement integers, mirroring the
//! row ids of the store that owns them. Wrapping each key in its own
//! newtype prevents a marker id from being passed where an image id is
//! expected.
//!
//! Ids are assigned by the store and never reused, so an id is stable for
//! the whole lifetime of the entity it names.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around an integer key with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub $inner);

        impl $name {
            /// Wrap a raw key.
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Return the inner key value.
            pub const fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a marker placed on the map.
    MarkerId(i64)
}

define_id! {
    /// Unique identifier for an image attached to a marker.
    ImageId(i64)
}

define_id! {
    /// Opaque handle returned by an alert sink when an alert is fired.
    ///
    /// The tracker keeps the handle next to the marker's active alert and
    /// passes it back to the sink when the alert has to be cancelled.
    AlertHandle(u64)
}
