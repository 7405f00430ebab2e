//! Lifecycle events, the broadcast bus and the stream dispatch layer.

pub(crate) mod bus;
pub(crate) mod dispatcher;
pub(crate) mod envelope;
pub(crate) mod event;

pub use bus::Bus;
pub use dispatcher::{StreamReceiver, StreamSink, StreamUpdate};
pub use envelope::{
    DeviceSummary, ErgonomicsBatch, ErgonomicsEntry, GestureBatch, GestureEntry,
    GestureProbability, Landscape, NodePose, RawSkeletonPose, RawSkeletonPoseBatch, SkeletonPose,
    SkeletonPoseBatch, SkeletonSummary, StreamEnvelope, TrackerPoseBatch, TrackerSummary,
    UserSummary,
};
pub use event::{Event, EventKind};
