//! Value types crossing the remote service boundary.
//!
//! Everything here is a plain value: produced by discovery or stream
//! callbacks, or handed to the service during setup construction. None of it
//! carries connection state.

use std::time::SystemTime;

/// A host offering the motion-capture service, as reported by discovery.
///
/// Equality is by `name`: the "last connected" preference matches on the host
/// name, not its (possibly reassigned) address.
#[derive(Clone, Debug)]
pub struct HostDescriptor {
    /// Host name as announced on the network.
    pub name: String,
    /// Network address the service listens on.
    pub address: String,
    /// Version string of the service running on the host.
    pub service_version: String,
}

impl PartialEq for HostDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for HostDescriptor {}

/// Kind of tracking hardware (or virtual source) behind a tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TrackerKind {
    #[default]
    Unknown,
    Head,
    Waist,
    LeftHand,
    RightHand,
    LeftFoot,
    RightFoot,
    Controller,
}

/// How confident the source is in a tracker pose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TrackingQuality {
    Untrackable,
    BadTracking,
    #[default]
    Trackable,
}

/// One tracker pose sample, as sent to or received from the service.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerPose {
    /// Stable tracker identifier (hardware id, or the user-chosen key for
    /// application-owned trackers).
    pub tracker_id: String,
    /// User the tracker is assigned to; 0 when unassigned.
    pub user_id: u32,
    /// Kind of tracker producing the sample.
    pub kind: TrackerKind,
    /// Position in meters.
    pub position: [f32; 3],
    /// Orientation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
    /// Confidence of the sample.
    pub quality: TrackingQuality,
    /// When the source last updated this pose.
    pub updated_at: SystemTime,
}

/// Classification of service system messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SystemMessageKind {
    Unknown,
    /// A temporary skeleton was modified by an external editing tool.
    TemporarySkeletonModified,
    /// The session this client owns was terminated remotely.
    SessionConnectionClosed,
}

/// Out-of-band notification from the service.
#[derive(Clone, Debug)]
pub struct SystemMessage {
    /// What happened.
    pub kind: SystemMessageKind,
    /// Message-specific numeric payload (for
    /// [`SystemMessageKind::TemporarySkeletonModified`]: the setup index).
    pub argument: u32,
    /// Human-readable description.
    pub text: String,
}

/// A gesture known to the service, fetched with the landscape.
#[derive(Clone, Debug, PartialEq)]
pub struct GestureInfo {
    pub id: u32,
    pub name: String,
}

/// Temporary skeletons available in one editing session on the service.
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub session_id: u32,
    pub session_name: String,
    /// `(skeleton name, setup index)` per stored draft.
    pub skeletons: Vec<(String, u32)>,
}
