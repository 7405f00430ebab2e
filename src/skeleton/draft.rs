//! # Skeleton drafts: the local, application-owned skeleton description.
//!
//! A [`SkeletonDraft`] is authored by the application (nodes, chains,
//! colliders, optionally meshes) and turned into a remote *setup* by the
//! builder. The core only reads snapshots of a draft while building and writes
//! back the two identity fields:
//!
//! - `remote_id` — assigned once the setup is loaded on the service;
//! - `setup_index` — the live remote staging slot, assigned per build cycle
//!   and cleared on finalize/teardown.
//!
//! Drafts are shared as [`DraftRef`] (`Arc<Mutex<_>>`): the application owns
//! and mutates them between builds, the driver locks them only briefly to
//! snapshot or to write identity fields back.

use std::sync::{Arc, Mutex};

/// Shared handle to a draft, cloneable across the application and the driver.
pub type DraftRef = Arc<Mutex<SkeletonDraft>>;

/// Local transform of a node relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: [f32; 3],
    /// Quaternion (x, y, z, w).
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

/// One joint/bone of a skeleton. A root node has `parent_id == id`.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: u32,
    pub name: String,
    pub parent_id: u32,
    pub transform: Transform,
}

/// Functional classification of a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChainKind {
    Head,
    Neck,
    Spine,
    Arm,
    Leg,
    Hand,
    Foot,
    FingerThumb,
    FingerIndex,
    FingerMiddle,
    FingerRing,
    FingerPinky,
}

/// Which side of the body a chain's data comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Center,
    Left,
    Right,
}

/// An ordered run of nodes steered as one unit (an arm, a finger, a spine).
#[derive(Clone, Debug, PartialEq)]
pub struct Chain {
    pub id: u32,
    pub kind: ChainKind,
    pub side: Side,
    /// Node ids in root-to-tip order.
    pub node_ids: Vec<u32>,
}

/// Collider geometry attached to a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColliderShape {
    Sphere { radius: f32 },
    Capsule { radius: f32, length: f32 },
    Box { size: [f32; 3] },
}

/// Collision volume for a node, in the node's local space.
#[derive(Clone, Debug, PartialEq)]
pub struct Collider {
    pub node_id: u32,
    pub local_position: [f32; 3],
    pub local_rotation: [f32; 4],
    pub shape: ColliderShape,
}

/// One skinned vertex: position plus the node it is weighted to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub node_id: u32,
    pub weight: f32,
}

/// Visual mesh bound to a node, uploaded as one batch during a build.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshSetup {
    pub node_id: u32,
    pub vertices: Vec<Vertex>,
    /// Indices into `vertices`, one triple per triangle.
    pub triangles: Vec<[u32; 3]>,
}

impl MeshSetup {
    pub fn new(node_id: u32) -> Self {
        Self {
            node_id,
            vertices: Vec::new(),
            triangles: Vec::new(),
        }
    }

    /// Appends another mesh, re-basing its triangle indices.
    pub fn append(&mut self, other: &MeshSetup) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles
            .extend(other.triangles.iter().map(|t| [t[0] + base, t[1] + base, t[2] + base]));
    }
}

/// Body classification of the whole skeleton.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum SkeletonKind {
    #[default]
    Body,
    Hand,
    Both,
}

/// What the skeleton is animated from on the service side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum TargetBinding {
    /// Animate from a specific user's data; `user_id == 0` means "bind the
    /// first available user at build time".
    UserData { user_id: u32 },
    /// Animate from the user at a fixed index.
    UserIndex { index: u32 },
    /// Animate from recorded animation data.
    Animation,
    /// Animate from a specific glove.
    GloveData { glove_id: u32 },
}

/// Summary metadata identifying a setup, sent on create/overwrite.
#[derive(Clone, Debug, PartialEq)]
pub struct SetupSummary {
    pub name: String,
    pub kind: SkeletonKind,
    pub target: TargetBinding,
}

/// The local, mutable description of a skeleton.
#[derive(Clone, Debug)]
pub struct SkeletonDraft {
    pub name: String,
    pub kind: SkeletonKind,
    pub target: TargetBinding,
    pub nodes: Vec<Node>,
    pub chains: Vec<Chain>,
    pub colliders: Vec<Collider>,
    /// Meshes staged for the next build; cleared once uploaded.
    pub meshes: Vec<MeshSetup>,

    /// Remote skeleton id, assigned on first successful load.
    pub remote_id: Option<u32>,
    /// Live remote staging slot. Must be re-acquired whenever the structural
    /// content changes; never reused across unrelated drafts.
    pub setup_index: Option<u32>,
    /// Editing session the draft was saved under, if any.
    pub session_id: Option<u32>,
}

impl SkeletonDraft {
    pub fn new(name: impl Into<String>, kind: SkeletonKind, target: TargetBinding) -> Self {
        Self {
            name: name.into(),
            kind,
            target,
            nodes: Vec::new(),
            chains: Vec::new(),
            colliders: Vec::new(),
            meshes: Vec::new(),
            remote_id: None,
            setup_index: None,
            session_id: None,
        }
    }

    /// Wraps the draft in a shareable handle.
    pub fn into_ref(self) -> DraftRef {
        Arc::new(Mutex::new(self))
    }

    /// Summary metadata for create/overwrite calls.
    pub fn summary(&self) -> SetupSummary {
        SetupSummary {
            name: self.name.clone(),
            kind: self.kind,
            target: self.target,
        }
    }

    pub fn node_with_id(&self, id: u32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Replaces the structural content from a remote copy, keeping identity
    /// fields. Fails when a non-root node references a parent that is not
    /// among the supplied nodes.
    pub fn apply_structure(
        &mut self,
        nodes: Vec<Node>,
        chains: Vec<Chain>,
        colliders: Vec<Collider>,
    ) -> Result<(), crate::error::ServiceError> {
        for node in &nodes {
            if node.parent_id != node.id && !nodes.iter().any(|n| n.id == node.parent_id) {
                return Err(crate::error::ServiceError::structural(format!(
                    "node {} references unknown parent {}",
                    node.id, node.parent_id
                )));
            }
        }
        self.nodes = nodes;
        self.chains = chains;
        self.colliders = colliders;
        Ok(())
    }
}
