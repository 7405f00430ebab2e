//! The service boundary: the capability trait and the wire-level data types.

pub(crate) mod handle;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod types;

pub use handle::ServiceHandle;
pub use types::{
    GestureInfo, HostDescriptor, SessionSummary, SystemMessage, SystemMessageKind, TrackerKind,
    TrackerPose, TrackingQuality,
};
