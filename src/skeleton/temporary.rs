//! # Temporary skeletons: drafts parked on the host for external editing.
//!
//! A draft saved as a temporary skeleton lives on the host keyed by
//! `(setup index, session id)`, where an external editor can modify it. The
//! registry tracks which handles this session has stored, and which setup
//! indices the host has since flagged as modified and ready to load back.
//!
//! Handles are only meaningful while the connection that created them is
//! alive. On disconnect the local side is invalidated immediately; the
//! remote copies are discarded when the driver asks the host to clear them.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{ServiceError, SessionError};
use crate::service::handle::ServiceHandle;
use crate::service::types::SessionSummary;
use crate::skeleton::draft::DraftRef;

/// Identity of one draft stored on the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemporarySkeletonHandle {
    pub setup_index: u32,
    pub session_id: u32,
}

/// Tracks the temporary skeletons this session has stored remotely.
#[derive(Default)]
pub struct TemporarySkeletonRegistry {
    sent: Mutex<Vec<TemporarySkeletonHandle>>,
    loadable: Mutex<HashSet<u32>>,
}

impl TemporarySkeletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the draft on the host under its setup index.
    ///
    /// `modified` marks a refresh of an already stored draft. A capacity
    /// rejection clears every stored copy and retries once; drafts of other
    /// handles become stale at that point, which is why their local handles
    /// are invalidated as part of the clear.
    pub async fn save(
        &self,
        service: &dyn ServiceHandle,
        draft: &DraftRef,
        modified: bool,
    ) -> Result<(), ServiceError> {
        let setup_index = {
            let guard = draft.lock().expect("draft lock poisoned");
            guard.setup_index.ok_or_else(|| {
                ServiceError::structural("draft has no setup index; build it first")
            })?
        };
        let session_id = service.session_id().await?;

        match service
            .save_temporary_skeleton(setup_index, session_id, modified)
            .await
        {
            Ok(()) => {}
            Err(ServiceError::Capacity) => {
                log::warn!("temporary skeleton storage full, clearing and retrying");
                self.clear_all(service).await?;
                service
                    .save_temporary_skeleton(setup_index, session_id, modified)
                    .await?;
            }
            Err(err) => return Err(err),
        }

        {
            let mut guard = draft.lock().expect("draft lock poisoned");
            guard.session_id = Some(session_id);
        }
        let handle = TemporarySkeletonHandle {
            setup_index,
            session_id,
        };
        let mut sent = self.sent.lock().expect("registry lock poisoned");
        if !sent.contains(&handle) {
            sent.push(handle);
        }
        Ok(())
    }

    /// Sessions on the host and the temporary skeletons they hold.
    pub async fn list(
        &self,
        service: &dyn ServiceHandle,
    ) -> Result<Vec<SessionSummary>, ServiceError> {
        service.session_summaries().await
    }

    /// Pulls the stored copy back into `draft`, replacing its nodes, chains
    /// and colliders. The stored copy is first staged into the setup slot
    /// and then read back piecewise. The draft is untouched when the read
    /// back structure is malformed.
    pub async fn fetch(
        &self,
        service: &dyn ServiceHandle,
        draft: &DraftRef,
        setup_index: u32,
        session_id: u32,
    ) -> Result<(), ServiceError> {
        service
            .stage_temporary_skeleton(setup_index, session_id)
            .await?;
        self.read_back(service, draft, setup_index, session_id).await
    }

    async fn read_back(
        &self,
        service: &dyn ServiceHandle,
        draft: &DraftRef,
        setup_index: u32,
        session_id: u32,
    ) -> Result<(), ServiceError> {
        let nodes = service.setup_nodes(setup_index).await?;
        let chains = service.setup_chains(setup_index).await?;
        let colliders = service.setup_colliders(setup_index).await?;

        let mut guard = draft.lock().expect("draft lock poisoned");
        guard.apply_structure(nodes, chains, colliders)?;
        guard.session_id = Some(session_id);
        self.loadable
            .lock()
            .expect("registry lock poisoned")
            .remove(&setup_index);
        Ok(())
    }

    /// Discards every stored copy on the host and forgets the local handles.
    pub async fn clear_all(&self, service: &dyn ServiceHandle) -> Result<(), ServiceError> {
        service.clear_all_temporary_skeletons().await?;
        self.invalidate_local();
        Ok(())
    }

    /// Forgets all local handles without touching the host. Used when the
    /// connection is gone and the handles cannot mean anything anymore.
    pub fn invalidate_local(&self) {
        self.sent.lock().expect("registry lock poisoned").clear();
        self.loadable.lock().expect("registry lock poisoned").clear();
    }

    /// Records that the host flagged `setup_index` as modified externally.
    pub(crate) fn mark_loadable(&self, setup_index: u32) {
        self.loadable
            .lock()
            .expect("registry lock poisoned")
            .insert(setup_index);
    }

    /// Whether the host flagged `setup_index` as modified externally.
    pub fn is_loadable(&self, setup_index: u32) -> bool {
        self.loadable
            .lock()
            .expect("registry lock poisoned")
            .contains(&setup_index)
    }

    /// Drops the modified flag for `setup_index` without fetching it back.
    pub fn acknowledge(&self, setup_index: u32) {
        self.loadable
            .lock()
            .expect("registry lock poisoned")
            .remove(&setup_index);
    }

    /// Setup indices modified externally and not yet fetched back.
    pub fn loadable_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .loadable
            .lock()
            .expect("registry lock poisoned")
            .iter()
            .copied()
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Handles this session has stored since the last clear or disconnect.
    pub fn handles(&self) -> Vec<TemporarySkeletonHandle> {
        self.sent.lock().expect("registry lock poisoned").clone()
    }

    /// Writes the compressed form of the draft's stored copy to `path`.
    pub async fn export_to_file(
        &self,
        service: &dyn ServiceHandle,
        draft: &DraftRef,
        path: &Path,
    ) -> Result<(), SessionError> {
        let (setup_index, session_id) = {
            let guard = draft.lock().expect("draft lock poisoned");
            let setup_index = guard.setup_index.ok_or_else(|| {
                ServiceError::structural("draft has no setup index; build it first")
            })?;
            let session_id = guard.session_id.ok_or_else(|| {
                ServiceError::structural("draft was never saved as a temporary skeleton")
            })?;
            (setup_index, session_id)
        };
        let bytes = service
            .compress_temporary_skeleton(setup_index, session_id)
            .await?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    /// Loads a file written by [`export_to_file`](Self::export_to_file) into
    /// the draft's setup index and pulls the resulting structure back.
    pub async fn import_from_file(
        &self,
        service: &dyn ServiceHandle,
        draft: &DraftRef,
        path: &Path,
    ) -> Result<(), SessionError> {
        let setup_index = {
            let guard = draft.lock().expect("draft lock poisoned");
            guard.setup_index.ok_or_else(|| {
                ServiceError::structural("draft has no setup index; build it first")
            })?
        };
        let bytes = tokio::fs::read(path).await?;
        service
            .decompress_temporary_skeleton(setup_index, &bytes)
            .await?;
        let session_id = service.session_id().await?;
        self.fetch(service, draft, setup_index, session_id).await?;
        Ok(())
    }
}
