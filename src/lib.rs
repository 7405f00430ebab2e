//! # poselink
//!
//! **Poselink** is the session layer of a motion-capture client: it keeps a
//! persistent link to a pose-streaming service alive, synchronizes locally
//! authored skeleton and tracker definitions to it, and hands live pose
//! streams to the application at well-defined synchronization points.
//!
//! The hard part is not the data but how it moves: a background driver runs
//! a small state machine against an unreliable, callback-based remote
//! service, while the foreground application mutates shared queues and
//! drains streams on its own schedule.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  application                      ┌─────────────────────────────┐
//!  ──────────── intents ──────────▶│  Supervisor                 │
//!   connect / setup_skeleton /     │  - StateCells (intents)     │
//!   register_custom_tracker / …    │  - PendingQueue x2          │
//!                                  │  - registries (trackers,    │
//!                                  │    temporary skeletons)     │
//!                                  └──────────┬──────────────────┘
//!                                             │ shared state
//!                                             ▼
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  driver task (tick = poll_interval)                          │
//!  │    Unknown → Disconnected → Connecting → Connected           │
//!  │    - auto-connect on its own cadence while Disconnected      │
//!  │    - drains queues through the setup builder while Connected │
//!  │    - panic boundary per tick (TickFaulted, keep running)     │
//!  └──────────┬───────────────────────────────────────────────────┘
//!             │ ServiceHandle (async trait)
//!             ▼
//!       remote service ── callbacks ──▶ StreamSink ──▶ StreamReceiver
//!                                        │                (application)
//!                                        └─▶ latest landscape/ergonomics
//!                                            (synchronous snapshots)
//! ```
//!
//! ### Skeleton build lifecycle
//! ```text
//! setup_skeleton(draft) ──▶ PendingQueue ──▶ driver tick (Connected)
//!
//!   build attempt:
//!     ├─► resolve user target (queue again if no user yet)
//!     ├─► create_setup   ── Capacity? ─► clear temporaries, retry once
//!     │   (or overwrite_setup when the draft is already live)
//!     ├─► nodes ▶ chains ▶ colliders ▶ meshes   (first failure aborts)
//!     ├─► prepare_setup ▶ load_setup
//!     └─► commit (setup_index, skeleton_id) to the draft
//!
//!   on disconnect: every built draft is re-queued with its identity
//!   invalidated, so the next connection rebuilds it from scratch.
//! ```
//!
//! ## Features
//! | Area                    | Description                                                      | Key types                                        |
//! |-------------------------|------------------------------------------------------------------|--------------------------------------------------|
//! | **Session lifecycle**   | Driver task, state machine, auto-connect, graceful stop.         | [`Supervisor`], [`ConnectionState`], [`Config`]  |
//! | **Service boundary**    | Async capability trait over the remote service.                  | [`ServiceHandle`], [`ServiceError`]              |
//! | **Skeleton authoring**  | Drafts, transactional builds, host-parked temporary skeletons.   | [`SkeletonDraft`], [`TemporarySkeletonRegistry`] |
//! | **Trackers**            | Custom tracker registry and user-attributed tracked objects.     | [`CustomTrackerRegistry`], [`TrackedObject`]     |
//! | **Streams**             | Ordered fan-in of pose/landscape/system streams, drop-on-full.   | [`StreamSink`], [`StreamReceiver`]               |
//! | **Events**              | Broadcast lifecycle events with global sequence numbers.         | [`Event`], [`EventKind`], [`Bus`]                |
//!
//! ## Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use poselink::{Config, SettingsStore, SkeletonDraft, SkeletonKind, Supervisor, TargetBinding};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // `transport` implements poselink::ServiceHandle over the wire.
//!     let transport = Arc::new(MyTransport::new());
//!
//!     let (session, mut streams) = Supervisor::builder(transport)
//!         .config(Config::default())
//!         .settings(SettingsStore::open("poselink-settings.json")?)
//!         .build();
//!     session.start().await?;
//!
//!     // Queue a skeleton; it is built once a connection is up and a user
//!     // is available to bind it to.
//!     let draft = SkeletonDraft::new(
//!         "avatar",
//!         SkeletonKind::Body,
//!         TargetBinding::UserData { user_id: 0 },
//!     )
//!     .into_ref();
//!     session.setup_skeleton(Arc::clone(&draft));
//!
//!     while let Some(update) = streams.recv().await {
//!         // … drive the application from the update …
//!     }
//!
//!     session.stop().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod service;
mod settings;
mod skeleton;
mod trackers;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{ConnectionState, PendingQueue, Supervisor, SupervisorBuilder};
pub use error::{ServiceError, SessionError};
pub use events::{
    Bus, DeviceSummary, ErgonomicsBatch, ErgonomicsEntry, Event, EventKind, GestureBatch,
    GestureEntry, GestureProbability, Landscape, NodePose, RawSkeletonPose, RawSkeletonPoseBatch,
    SkeletonPose, SkeletonPoseBatch, SkeletonSummary, StreamEnvelope, StreamReceiver, StreamSink,
    StreamUpdate, TrackerPoseBatch, TrackerSummary, UserSummary,
};
pub use service::{
    GestureInfo, HostDescriptor, ServiceHandle, SessionSummary, SystemMessage, SystemMessageKind,
    TrackerKind, TrackerPose, TrackingQuality,
};
pub use settings::{ConnectionSettings, SettingsStore};
pub use skeleton::{
    Chain, ChainKind, Collider, ColliderShape, DraftRef, MeshSetup, Node, SetupSummary, Side,
    SkeletonDraft, SkeletonKind, TargetBinding, TemporarySkeletonHandle,
    TemporarySkeletonRegistry, Transform, Vertex,
};
pub use trackers::{CustomTracker, CustomTrackerRegistry, TrackedObject, TrackedObjectSet};
