//! # Transactional skeleton setup builds.
//!
//! ```text
//!  draft ──▶ resolve target ──▶ create / overwrite setup
//!                                       │
//!                         Capacity? ──▶ clear temporaries, retry once
//!                                       │
//!                                       ▼
//!                 nodes ▶ allocate chains ▶ chains ▶ colliders ▶ meshes
//!                                       │
//!                        any failure ──▶ abort, draft untouched
//!                                       │
//!                                       ▼
//!                            prepare ▶ load ▶ commit ids to draft
//! ```
//!
//! A build either completes and commits `(setup index, skeleton id)` to the
//! draft in one step, or leaves the draft's identity fields exactly as they
//! were. Retryable failures report [`BuildOutcome::Queued`] so the driver
//! re-enqueues the draft at the tail of the pending queue, bounding retries
//! to one attempt per tick.

use crate::error::ServiceError;
use crate::service::handle::ServiceHandle;
use crate::skeleton::draft::{DraftRef, SetupSummary, SkeletonDraft, TargetBinding};
use crate::skeleton::temporary::TemporarySkeletonRegistry;

/// Result of one build attempt.
#[derive(Debug)]
pub enum BuildOutcome {
    /// The draft is live; ids were committed to it.
    Built { setup_index: u32, skeleton_id: u32 },
    /// Nothing committed; worth retrying on a later tick.
    Queued(ServiceError),
    /// Nothing committed; retrying will not help.
    Failed(ServiceError),
}

impl BuildOutcome {
    fn from_error(err: ServiceError) -> Self {
        if err.is_retryable() {
            BuildOutcome::Queued(err)
        } else {
            BuildOutcome::Failed(err)
        }
    }
}

/// Attempts to realize `draft` on the service.
///
/// `default_user` is the user to bind when the draft targets user data
/// without naming a user; a draft that cannot resolve its user yet is
/// queued, not failed.
pub(crate) async fn build_setup(
    service: &dyn ServiceHandle,
    temporary: &TemporarySkeletonRegistry,
    draft: &DraftRef,
    default_user: Option<u32>,
) -> BuildOutcome {
    // Snapshot under the lock; remote calls run against the copy so a
    // concurrent editor cannot produce a half-uploaded mixture.
    let snapshot = {
        let guard = draft.lock().expect("draft lock poisoned");
        guard.clone()
    };

    let target = match resolve_target(snapshot.target.clone(), default_user) {
        Some(target) => target,
        None => {
            return BuildOutcome::Queued(ServiceError::transient(
                "no user available to bind the skeleton to",
            ))
        }
    };
    let mut summary = snapshot.summary();
    summary.target = target;

    let setup_index = match snapshot.setup_index {
        Some(index) => match service.overwrite_setup(index, &summary).await {
            Ok(()) => index,
            Err(err) => return BuildOutcome::from_error(err),
        },
        None => match create_with_capacity_retry(service, temporary, &summary).await {
            Ok(index) => index,
            Err(err) => return BuildOutcome::from_error(err),
        },
    };

    if let Err(err) = upload_structure(service, setup_index, &snapshot).await {
        return BuildOutcome::from_error(err);
    }
    if let Err(err) = service.prepare_setup(setup_index).await {
        return BuildOutcome::from_error(err);
    }
    let skeleton_id = match service.load_setup(setup_index).await {
        Ok(id) => id,
        Err(err) => return BuildOutcome::from_error(err),
    };

    let mut guard = draft.lock().expect("draft lock poisoned");
    guard.setup_index = Some(setup_index);
    guard.remote_id = Some(skeleton_id);
    // Staged meshes are uploaded exactly once; a rebuild re-targets the
    // existing setup without re-sending them.
    guard.meshes.clear();
    BuildOutcome::Built {
        setup_index,
        skeleton_id,
    }
}

/// Unloads the draft's live skeleton and releases its remote identity.
pub(crate) async fn unload(
    service: &dyn ServiceHandle,
    draft: &DraftRef,
) -> Result<(), ServiceError> {
    let remote_id = {
        let guard = draft.lock().expect("draft lock poisoned");
        guard.remote_id
    };
    if let Some(id) = remote_id {
        service.unload_skeleton(id).await?;
    }
    let mut guard = draft.lock().expect("draft lock poisoned");
    guard.remote_id = None;
    guard.setup_index = None;
    Ok(())
}

/// Marks the draft's remote identity invalid without a remote call. Used
/// when the connection is lost and the ids cannot be trusted anymore.
pub(crate) fn invalidate_identity(draft: &DraftRef) {
    let mut guard = draft.lock().expect("draft lock poisoned");
    guard.remote_id = None;
    guard.setup_index = None;
}

fn resolve_target(target: TargetBinding, default_user: Option<u32>) -> Option<TargetBinding> {
    match target {
        TargetBinding::UserData { user_id: 0 } => {
            default_user.map(|user_id| TargetBinding::UserData { user_id })
        }
        other => Some(other),
    }
}

async fn create_with_capacity_retry(
    service: &dyn ServiceHandle,
    temporary: &TemporarySkeletonRegistry,
    summary: &SetupSummary,
) -> Result<u32, ServiceError> {
    match service.create_setup(summary).await {
        Ok(index) => Ok(index),
        Err(ServiceError::Capacity) => {
            log::warn!(
                "setup table full while creating \"{}\", clearing temporaries and retrying",
                summary.name
            );
            temporary.clear_all(service).await?;
            service.create_setup(summary).await
        }
        Err(err) => Err(err),
    }
}

/// Uploads the structural pieces in their required order. The first failed
/// call aborts the remainder, so a partially accepted setup never gains
/// chains or colliders referencing nodes the service rejected.
async fn upload_structure(
    service: &dyn ServiceHandle,
    setup_index: u32,
    snapshot: &SkeletonDraft,
) -> Result<(), ServiceError> {
    for node in &snapshot.nodes {
        service.add_node(setup_index, node).await?;
    }
    if !snapshot.chains.is_empty() {
        service.allocate_chains(setup_index).await?;
        for chain in &snapshot.chains {
            service.add_chain(setup_index, chain).await?;
        }
    }
    for collider in &snapshot.colliders {
        service.add_collider(setup_index, collider).await?;
    }
    for mesh in &snapshot.meshes {
        service.add_mesh(setup_index, mesh).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::mock::MockService;
    use crate::skeleton::draft::{Chain, ChainKind, Collider, ColliderShape, Node, Side, SkeletonKind, Transform};

    fn node(id: u32, parent: u32) -> Node {
        Node {
            id,
            name: format!("n{id}"),
            parent_id: parent,
            transform: Transform::default(),
        }
    }

    fn draft_with_structure() -> DraftRef {
        let mut draft = SkeletonDraft::new(
            "figure",
            SkeletonKind::Body,
            TargetBinding::UserData { user_id: 5 },
        );
        draft.nodes = vec![node(1, 1), node(2, 1), node(3, 2)];
        draft.chains = vec![Chain {
            id: 1,
            kind: ChainKind::Spine,
            side: Side::Center,
            node_ids: vec![1, 2, 3],
        }];
        draft.colliders = vec![Collider {
            node_id: 2,
            local_position: [0.0; 3],
            local_rotation: [0.0, 0.0, 0.0, 1.0],
            shape: ColliderShape::Sphere { radius: 0.1 },
        }];
        draft.into_ref()
    }

    #[tokio::test]
    async fn successful_build_commits_identity_once() {
        let service = MockService::new();
        let temporary = TemporarySkeletonRegistry::new();
        let draft = draft_with_structure();

        let outcome = build_setup(&service, &temporary, &draft, None).await;
        let (setup_index, skeleton_id) = match outcome {
            BuildOutcome::Built {
                setup_index,
                skeleton_id,
            } => (setup_index, skeleton_id),
            other => panic!("expected Built, got {other:?}"),
        };

        let guard = draft.lock().unwrap();
        assert_eq!(guard.setup_index, Some(setup_index));
        assert_eq!(guard.remote_id, Some(skeleton_id));
    }

    #[tokio::test]
    async fn rebuild_overwrites_instead_of_creating_second_index() {
        let service = MockService::new();
        let temporary = TemporarySkeletonRegistry::new();
        let draft = draft_with_structure();

        build_setup(&service, &temporary, &draft, None).await;
        let first = draft.lock().unwrap().setup_index;
        build_setup(&service, &temporary, &draft, None).await;

        assert_eq!(draft.lock().unwrap().setup_index, first);
        assert_eq!(service.calls_named("create_setup"), 1);
        assert_eq!(service.calls_named("overwrite_setup"), 1);
    }

    #[tokio::test]
    async fn capacity_on_create_clears_temporaries_and_retries() {
        let service = MockService::new();
        let temporary = TemporarySkeletonRegistry::new();
        temporary.mark_loadable(9); // stale handle from an earlier save
        let draft = draft_with_structure();

        service.fail_next("create_setup", ServiceError::Capacity);
        let outcome = build_setup(&service, &temporary, &draft, None).await;

        assert!(matches!(outcome, BuildOutcome::Built { .. }));
        assert_eq!(service.calls_named("create_setup"), 2);
        assert_eq!(service.calls_named("clear_all_temporary_skeletons"), 1);
        assert!(temporary.loadable_indices().is_empty());
        assert!(draft.lock().unwrap().setup_index.is_some());
    }

    #[tokio::test]
    async fn failed_node_aborts_chains_and_colliders() {
        let service = MockService::new();
        let temporary = TemporarySkeletonRegistry::new();
        let draft = draft_with_structure();

        service.fail_next("add_node", ServiceError::transient("link hiccup"));
        // First add_node call fails; with three nodes the second is never sent.
        let outcome = build_setup(&service, &temporary, &draft, None).await;

        assert!(matches!(outcome, BuildOutcome::Queued(_)));
        assert_eq!(service.calls_named("add_node"), 1);
        assert_eq!(service.calls_named("add_chain"), 0);
        assert_eq!(service.calls_named("add_collider"), 0);
        assert_eq!(service.calls_named("load_setup"), 0);

        let guard = draft.lock().unwrap();
        assert_eq!(guard.setup_index, None);
        assert_eq!(guard.remote_id, None);
    }

    #[tokio::test]
    async fn structural_failure_is_not_queued() {
        let service = MockService::new();
        let temporary = TemporarySkeletonRegistry::new();
        let draft = draft_with_structure();

        service.fail_next("add_chain", ServiceError::structural("bad chain"));
        let outcome = build_setup(&service, &temporary, &draft, None).await;
        assert!(matches!(outcome, BuildOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn unresolved_user_target_queues_without_remote_calls() {
        let service = MockService::new();
        let temporary = TemporarySkeletonRegistry::new();
        let draft = SkeletonDraft::new(
            "figure",
            SkeletonKind::Body,
            TargetBinding::UserData { user_id: 0 },
        )
        .into_ref();

        let outcome = build_setup(&service, &temporary, &draft, None).await;
        assert!(matches!(outcome, BuildOutcome::Queued(_)));
        assert!(service.calls().is_empty());

        let outcome = build_setup(&service, &temporary, &draft, Some(7)).await;
        assert!(matches!(outcome, BuildOutcome::Built { .. }));
    }

    #[tokio::test]
    async fn unload_releases_identity() {
        let service = MockService::new();
        let temporary = TemporarySkeletonRegistry::new();
        let draft = draft_with_structure();

        build_setup(&service, &temporary, &draft, None).await;
        unload(&service, &draft).await.unwrap();

        let guard = draft.lock().unwrap();
        assert_eq!(guard.remote_id, None);
        assert_eq!(guard.setup_index, None);
        assert_eq!(service.calls_named("unload_skeleton"), 1);
    }
}
