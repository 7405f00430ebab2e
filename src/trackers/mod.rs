//! Tracker registries: custom trackers and user-attributed tracked objects.

mod custom;
mod tracked;

pub use custom::{CustomTracker, CustomTrackerRegistry};
pub use tracked::{TrackedObject, TrackedObjectSet};

pub(crate) use tracked::resolve_user_id;
