//! # Service seam: every remote operation the session performs.
//!
//! [`ServiceHandle`] is the single trait boundary between the session logic
//! and the transport implementation. Production code implements it over the
//! wire protocol; tests implement it with a scripted double. All methods are
//! fallible and classified through [`ServiceError`], so callers can decide
//! between re-queueing ([`ServiceError::is_retryable`]) and giving up.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::events::dispatcher::StreamSink;
use crate::service::types::{GestureInfo, HostDescriptor, SessionSummary, TrackerPose};
use crate::skeleton::draft::{Chain, Collider, MeshSetup, Node, SetupSummary};

/// Asynchronous interface to the motion service.
///
/// Implementations must be safe to call from concurrent tasks; the session
/// serializes state-changing sequences itself (one skeleton build at a time,
/// one driver tick at a time) but read-style calls may interleave freely.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    /// Brings up the transport. Called once before any other operation and
    /// again after [`shutdown`](Self::shutdown) when the session restarts.
    async fn initialize(&self) -> Result<(), ServiceError>;

    /// Tears the transport down, dropping any live connection.
    async fn shutdown(&self) -> Result<(), ServiceError>;

    /// Looks for reachable hosts, waiting up to `wait` for announcements.
    /// With `local_only`, only hosts on this machine are reported.
    async fn discover_hosts(
        &self,
        wait: Duration,
        local_only: bool,
    ) -> Result<Vec<HostDescriptor>, ServiceError>;

    /// Connects to `host` over its preferred transport.
    async fn connect(&self, host: &HostDescriptor) -> Result<(), ServiceError>;

    /// Connects over the portable default transport without a discovered
    /// host (typically loopback).
    async fn connect_default_transport(&self) -> Result<(), ServiceError>;

    /// Closes the current connection, if any.
    async fn disconnect(&self) -> Result<(), ServiceError>;

    /// Whether a connection is currently live. Polled by the driver as a
    /// fallback next to the connected/disconnected callbacks.
    async fn is_connected(&self) -> bool;

    /// Registers the stream sink; the transport feeds it until shutdown.
    async fn attach_streams(&self, sink: StreamSink) -> Result<(), ServiceError>;

    /// Id of this client's session on the connected host.
    async fn session_id(&self) -> Result<u32, ServiceError>;

    /// Sessions currently known to the connected host.
    async fn session_summaries(&self) -> Result<Vec<SessionSummary>, ServiceError>;

    /// Gesture ids and names known to the connected host.
    async fn gesture_catalog(&self) -> Result<Vec<GestureInfo>, ServiceError>;

    // ### Skeleton setup
    //
    // A build is a sequence of these calls against one setup index. The
    // builder aborts the sequence on the first failure.

    /// Creates an empty setup remotely and returns its setup index.
    async fn create_setup(&self, summary: &SetupSummary) -> Result<u32, ServiceError>;

    /// Replaces the definition of an existing setup, keeping its index.
    async fn overwrite_setup(
        &self,
        setup_index: u32,
        summary: &SetupSummary,
    ) -> Result<(), ServiceError>;

    async fn add_node(&self, setup_index: u32, node: &Node) -> Result<(), ServiceError>;

    async fn add_chain(&self, setup_index: u32, chain: &Chain) -> Result<(), ServiceError>;

    async fn add_collider(
        &self,
        setup_index: u32,
        collider: &Collider,
    ) -> Result<(), ServiceError>;

    async fn add_mesh(&self, setup_index: u32, mesh: &MeshSetup) -> Result<(), ServiceError>;

    /// Sizes the remote chain storage for the setup before chains are added.
    async fn allocate_chains(&self, setup_index: u32) -> Result<(), ServiceError>;

    /// Finalizes a fully uploaded setup so it can be loaded.
    async fn prepare_setup(&self, setup_index: u32) -> Result<(), ServiceError>;

    /// Instantiates the setup; returns the live skeleton id.
    async fn load_setup(&self, setup_index: u32) -> Result<u32, ServiceError>;

    /// Removes a live skeleton.
    async fn unload_skeleton(&self, skeleton_id: u32) -> Result<(), ServiceError>;

    // Read-back of a setup's current remote content; used to reconstruct a
    // draft after staging a temporary skeleton into the slot.

    async fn setup_nodes(&self, setup_index: u32) -> Result<Vec<Node>, ServiceError>;

    async fn setup_chains(&self, setup_index: u32) -> Result<Vec<Chain>, ServiceError>;

    async fn setup_colliders(&self, setup_index: u32) -> Result<Vec<Collider>, ServiceError>;

    // ### Temporary skeletons
    //
    // Setups parked on the host, keyed by (setup index, session id).

    /// Persists the setup on the host. `is_update` distinguishes a refresh
    /// of an already saved setup from a first save.
    async fn save_temporary_skeleton(
        &self,
        setup_index: u32,
        session_id: u32,
        is_update: bool,
    ) -> Result<(), ServiceError>;

    /// Stages the stored copy into its setup slot, from where the setup
    /// read-back calls can reconstruct it.
    async fn stage_temporary_skeleton(
        &self,
        setup_index: u32,
        session_id: u32,
    ) -> Result<(), ServiceError>;

    /// Removes every temporary skeleton this session stored on the host.
    async fn clear_all_temporary_skeletons(&self) -> Result<(), ServiceError>;

    /// Compressed representation of a stored temporary skeleton, suitable
    /// for writing to disk.
    async fn compress_temporary_skeleton(
        &self,
        setup_index: u32,
        session_id: u32,
    ) -> Result<Vec<u8>, ServiceError>;

    /// Loads compressed data back into the given setup index.
    async fn decompress_temporary_skeleton(
        &self,
        setup_index: u32,
        data: &[u8],
    ) -> Result<(), ServiceError>;

    // ### Custom trackers

    async fn register_tracker(&self, tracker_id: &str) -> Result<(), ServiceError>;

    async fn unregister_tracker(&self, tracker_id: &str) -> Result<(), ServiceError>;

    /// Pushes a batch of tracker poses upstream.
    async fn send_tracker_poses(&self, poses: &[TrackerPose]) -> Result<(), ServiceError>;
}
