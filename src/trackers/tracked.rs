//! Tracked objects: scene objects whose poses are attributed to a user.
//!
//! A tracked object may be registered before the service knows any users.
//! Registration therefore goes through a pending queue; each tick while
//! connected the driver tries to resolve a user id against the latest
//! landscape and only then moves the object into the active set.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::events::envelope::Landscape;
use crate::service::types::TrackerKind;

/// One object awaiting or holding a user attribution.
#[derive(Clone, Debug)]
pub struct TrackedObject {
    /// Unique key chosen by the application.
    pub object_id: String,
    pub kind: TrackerKind,
    /// Requested user; `None` binds to the first user the service reports.
    pub user_id: Option<u32>,
}

/// Resolves the user an object should be attributed to.
///
/// A concrete request only resolves when that user is actually present; an
/// open request takes the first reported user. `None` keeps the object
/// pending.
pub(crate) fn resolve_user_id(requested: Option<u32>, landscape: &Landscape) -> Option<u32> {
    match requested {
        Some(user_id) => landscape
            .users
            .iter()
            .find(|u| u.user_id == user_id)
            .map(|u| u.user_id),
        None => landscape.users.first().map(|u| u.user_id),
    }
}

/// Objects with a resolved user attribution.
#[derive(Default)]
pub struct TrackedObjectSet {
    objects: Mutex<HashMap<String, (TrackedObject, u32)>>,
    /// Ids removed while an entry for them may already be drained out of
    /// the pending queue; the next activation of such an id is discarded.
    tombstones: Mutex<HashSet<String>>,
}

impl TrackedObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn activate(&self, object: TrackedObject, user_id: u32) {
        if self
            .tombstones
            .lock()
            .expect("set lock poisoned")
            .remove(&object.object_id)
        {
            return;
        }
        self.objects
            .lock()
            .expect("set lock poisoned")
            .insert(object.object_id.clone(), (object, user_id));
    }

    /// Removes an object; `false` when the id was not active (it may still
    /// be pending, or mid-resolution in the driver — the tombstone covers
    /// both).
    pub fn remove(&self, object_id: &str) -> bool {
        self.tombstones
            .lock()
            .expect("set lock poisoned")
            .insert(object_id.to_owned());
        self.objects
            .lock()
            .expect("set lock poisoned")
            .remove(object_id)
            .is_some()
    }

    /// Clears a pending tombstone; run when the id is registered anew so
    /// the fresh registration is not discarded by a stale removal.
    pub(crate) fn clear_tombstone(&self, object_id: &str) {
        self.tombstones
            .lock()
            .expect("set lock poisoned")
            .remove(object_id);
    }

    /// Resolved user for an active object.
    pub fn user_of(&self, object_id: &str) -> Option<u32> {
        self.objects
            .lock()
            .expect("set lock poisoned")
            .get(object_id)
            .map(|(_, user_id)| *user_id)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
