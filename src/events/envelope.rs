//! Streamed payload types and the envelope that carries them.
//!
//! Every stream kind is delivered as a [`StreamEnvelope`] stamping the
//! moment the service published the payload. Envelopes are plain values;
//! the dispatch layer wraps them in `Arc` when fanning them out.

use std::time::SystemTime;

use crate::service::types::{GestureInfo, TrackerKind, TrackerPose};
use crate::skeleton::draft::Transform;

/// A timestamped stream payload.
#[derive(Clone, Debug)]
pub struct StreamEnvelope<T> {
    /// When the service published this payload.
    pub publish_time: SystemTime,
    pub payload: T,
}

impl<T> StreamEnvelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            publish_time: SystemTime::now(),
            payload,
        }
    }
}

/// One physical device known to the service.
#[derive(Clone, Debug)]
pub struct DeviceSummary {
    pub device_id: u32,
    pub model: String,
    pub battery_percent: u8,
}

/// One user tracked by the service.
#[derive(Clone, Debug)]
pub struct UserSummary {
    pub user_id: u32,
    pub name: String,
}

/// One live skeleton known to the service.
#[derive(Clone, Debug)]
pub struct SkeletonSummary {
    pub skeleton_id: u32,
    pub name: String,
    pub user_id: u32,
}

/// One tracker known to the service.
#[derive(Clone, Debug)]
pub struct TrackerSummary {
    pub tracker_id: String,
    pub kind: TrackerKind,
    pub user_id: u32,
}

/// Point-in-time snapshot of everything the service knows about.
#[derive(Clone, Debug, Default)]
pub struct Landscape {
    pub devices: Vec<DeviceSummary>,
    pub users: Vec<UserSummary>,
    pub skeletons: Vec<SkeletonSummary>,
    pub trackers: Vec<TrackerSummary>,
    /// Filled in from the gesture catalog on ingest; empty on the wire.
    pub gestures: Vec<GestureInfo>,
}

/// Pose of one skeleton node.
#[derive(Clone, Debug)]
pub struct NodePose {
    pub node_id: u32,
    pub transform: Transform,
}

/// Solved pose of one live skeleton.
#[derive(Clone, Debug)]
pub struct SkeletonPose {
    pub remote_id: u32,
    pub nodes: Vec<NodePose>,
}

#[derive(Clone, Debug, Default)]
pub struct SkeletonPoseBatch {
    pub skeletons: Vec<SkeletonPose>,
}

/// Unprocessed pose of one glove, before retargeting.
#[derive(Clone, Debug)]
pub struct RawSkeletonPose {
    pub glove_id: u32,
    pub nodes: Vec<NodePose>,
}

#[derive(Clone, Debug, Default)]
pub struct RawSkeletonPoseBatch {
    pub skeletons: Vec<RawSkeletonPose>,
}

#[derive(Clone, Debug, Default)]
pub struct TrackerPoseBatch {
    pub poses: Vec<TrackerPose>,
}

/// Ergonomics values for one skeleton, indexed by the service's fixed
/// measurement layout.
#[derive(Clone, Debug)]
pub struct ErgonomicsEntry {
    pub skeleton_id: u32,
    pub values: Vec<f32>,
}

#[derive(Clone, Debug, Default)]
pub struct ErgonomicsBatch {
    pub entries: Vec<ErgonomicsEntry>,
}

/// Probability of one gesture being performed.
#[derive(Clone, Debug)]
pub struct GestureProbability {
    pub gesture_id: u32,
    pub probability: f32,
}

/// Gesture probabilities for one tracked hand.
#[derive(Clone, Debug)]
pub struct GestureEntry {
    pub skeleton_id: u32,
    pub is_user_data: bool,
    pub probabilities: Vec<GestureProbability>,
}

#[derive(Clone, Debug, Default)]
pub struct GestureBatch {
    pub entries: Vec<GestureEntry>,
}
