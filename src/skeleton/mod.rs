//! Skeleton drafts, the transactional setup builder and the temporary
//! (host-parked) skeleton registry.

pub(crate) mod builder;
pub(crate) mod draft;
pub(crate) mod temporary;

pub use draft::{
    Chain, ChainKind, Collider, ColliderShape, DraftRef, MeshSetup, Node, SetupSummary, Side,
    SkeletonDraft, SkeletonKind, TargetBinding, Transform, Vertex,
};
pub use temporary::{TemporarySkeletonHandle, TemporarySkeletonRegistry};
