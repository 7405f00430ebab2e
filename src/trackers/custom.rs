//! Application-owned ("custom") trackers.
//!
//! Hardware trackers are announced by the service; custom trackers are
//! created by the application under a user-chosen id and fed poses every
//! frame. The registry is the local source of truth: it survives
//! disconnects, and the driver pushes the latest pose of every registered
//! tracker upstream each tick while connected.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ServiceError;
use crate::service::types::{TrackerKind, TrackerPose};

/// Definition of one application-owned tracker.
#[derive(Clone, Debug)]
pub struct CustomTracker {
    /// Unique key chosen by the application.
    pub tracker_id: String,
    pub kind: TrackerKind,
    pub user_id: u32,
}

struct Entry {
    tracker: CustomTracker,
    latest_pose: Option<TrackerPose>,
}

/// Registry of custom trackers, keyed by their unique id.
#[derive(Default)]
pub struct CustomTrackerRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl CustomTrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tracker. Rejects an id that is already present without
    /// touching the existing entry.
    pub fn register(&self, tracker: CustomTracker) -> Result<(), ServiceError> {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        if entries.contains_key(&tracker.tracker_id) {
            return Err(ServiceError::Duplicate {
                id: tracker.tracker_id,
            });
        }
        entries.insert(
            tracker.tracker_id.clone(),
            Entry {
                tracker,
                latest_pose: None,
            },
        );
        Ok(())
    }

    /// Removes a tracker; `false` when the id was unknown.
    pub fn unregister(&self, tracker_id: &str) -> bool {
        self.entries
            .lock()
            .expect("registry lock poisoned")
            .remove(tracker_id)
            .is_some()
    }

    /// Records the most recent pose for a registered tracker; `false` when
    /// the id is unknown.
    pub fn update_pose(&self, pose: TrackerPose) -> bool {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        match entries.get_mut(&pose.tracker_id) {
            Some(entry) => {
                entry.latest_pose = Some(pose);
                true
            }
            None => false,
        }
    }

    /// Latest pose of every registered tracker that has reported one.
    pub(crate) fn collect_poses(&self) -> Vec<TrackerPose> {
        self.entries
            .lock()
            .expect("registry lock poisoned")
            .values()
            .filter_map(|e| e.latest_pose.clone())
            .collect()
    }

    pub fn contains(&self, tracker_id: &str) -> bool {
        self.entries
            .lock()
            .expect("registry lock poisoned")
            .contains_key(tracker_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Definitions of all registered trackers.
    pub fn trackers(&self) -> Vec<CustomTracker> {
        self.entries
            .lock()
            .expect("registry lock poisoned")
            .values()
            .map(|e| e.tracker.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::service::types::TrackingQuality;

    fn tracker(id: &str) -> CustomTracker {
        CustomTracker {
            tracker_id: id.to_owned(),
            kind: TrackerKind::Controller,
            user_id: 1,
        }
    }

    fn pose(id: &str) -> TrackerPose {
        TrackerPose {
            tracker_id: id.to_owned(),
            user_id: 1,
            kind: TrackerKind::Controller,
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            quality: TrackingQuality::Trackable,
            updated_at: SystemTime::now(),
        }
    }

    #[test]
    fn duplicate_id_is_rejected_and_first_entry_kept() {
        let registry = CustomTrackerRegistry::new();
        registry.register(tracker("waist")).unwrap();

        let mut second = tracker("waist");
        second.user_id = 9;
        let err = registry.register(second).unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate { ref id } if id == "waist"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.trackers()[0].user_id, 1);
    }

    #[test]
    fn poses_only_collected_for_known_trackers() {
        let registry = CustomTrackerRegistry::new();
        registry.register(tracker("waist")).unwrap();

        assert!(registry.update_pose(pose("waist")));
        assert!(!registry.update_pose(pose("ghost")));
        assert_eq!(registry.collect_poses().len(), 1);
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = CustomTrackerRegistry::new();
        registry.register(tracker("waist")).unwrap();
        assert!(registry.unregister("waist"));
        assert!(!registry.unregister("waist"));
        assert!(registry.is_empty());
    }
}
