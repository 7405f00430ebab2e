//! # Stream dispatch: fan-in from the transport callbacks to the application.
//!
//! ```text
//!              transport callbacks (any thread)
//!      ┌──────────┬──────────┬───────────┬───────────┐
//!      ▼          ▼          ▼           ▼           ▼
//!  landscape   skeletons   trackers  ergonomics   system
//!      │          │          │           │           │
//!      └──────────┴────── StreamSink ────┴───────────┘
//!                             │ try_send (drop-on-full)
//!                             ▼
//!                   bounded FIFO channel
//!                             │
//!                             ▼
//!                      StreamReceiver  → application loop
//! ```
//!
//! All stream kinds share one bounded queue, so updates of different kinds
//! are observed in arrival order. `try_send` never blocks a transport
//! callback: when the application falls behind, the newest update is dropped
//! and a warning is logged.
//!
//! Two snapshot kinds are additionally retained **synchronously** under a
//! read-write lock ([`StreamSink::latest_landscape`],
//! [`StreamSink::latest_ergonomics`]), so the freshest value is available
//! even when the queued copy was dropped.

use std::sync::{Arc, OnceLock, RwLock};

use tokio::sync::mpsc;

use crate::core::state::{ConnectionState, StateCells};
use crate::events::bus::Bus;
use crate::events::envelope::{
    ErgonomicsBatch, GestureBatch, Landscape, RawSkeletonPoseBatch, SkeletonPoseBatch,
    StreamEnvelope, TrackerPoseBatch,
};
use crate::events::event::{Event, EventKind};
use crate::service::handle::ServiceHandle;
use crate::service::types::{SystemMessage, SystemMessageKind};
use crate::skeleton::temporary::TemporarySkeletonRegistry;

/// One update pulled from the stream queue.
///
/// Payloads are `Arc`-wrapped so receivers can retain them without copying
/// the (potentially large) batches.
#[derive(Clone, Debug)]
pub enum StreamUpdate {
    Landscape(Arc<StreamEnvelope<Landscape>>),
    SkeletonPoses(Arc<StreamEnvelope<SkeletonPoseBatch>>),
    RawSkeletonPoses(Arc<StreamEnvelope<RawSkeletonPoseBatch>>),
    TrackerPoses(Arc<StreamEnvelope<TrackerPoseBatch>>),
    Ergonomics(Arc<StreamEnvelope<ErgonomicsBatch>>),
    Gestures(Arc<StreamEnvelope<GestureBatch>>),
    System(SystemMessage),
}

impl StreamUpdate {
    /// Stable label for logs.
    pub fn kind_label(&self) -> &'static str {
        match self {
            StreamUpdate::Landscape(_) => "landscape",
            StreamUpdate::SkeletonPoses(_) => "skeleton_poses",
            StreamUpdate::RawSkeletonPoses(_) => "raw_skeleton_poses",
            StreamUpdate::TrackerPoses(_) => "tracker_poses",
            StreamUpdate::Ergonomics(_) => "ergonomics",
            StreamUpdate::Gestures(_) => "gestures",
            StreamUpdate::System(_) => "system",
        }
    }
}

struct SinkShared {
    tx: mpsc::Sender<StreamUpdate>,
    latest_landscape: RwLock<Option<Arc<StreamEnvelope<Landscape>>>>,
    latest_ergonomics: RwLock<Option<Arc<StreamEnvelope<ErgonomicsBatch>>>>,
    states: Arc<StateCells>,
    bus: Bus,
    temporary: Arc<TemporarySkeletonRegistry>,
    service: OnceLock<Arc<dyn ServiceHandle>>,
}

/// Ingestion side of the stream queue, handed to the transport layer.
///
/// Cheap to clone; all clones feed the same queue.
#[derive(Clone)]
pub struct StreamSink {
    inner: Arc<SinkShared>,
}

/// Consumption side of the stream queue. Single consumer.
pub struct StreamReceiver {
    rx: mpsc::Receiver<StreamUpdate>,
}

/// Creates a connected sink/receiver pair over a queue of `capacity` updates.
pub(crate) fn stream_channel(
    capacity: usize,
    states: Arc<StateCells>,
    bus: Bus,
    temporary: Arc<TemporarySkeletonRegistry>,
) -> (StreamSink, StreamReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sink = StreamSink {
        inner: Arc::new(SinkShared {
            tx,
            latest_landscape: RwLock::new(None),
            latest_ergonomics: RwLock::new(None),
            states,
            bus,
            temporary,
            service: OnceLock::new(),
        }),
    };
    (sink, StreamReceiver { rx })
}

impl StreamSink {
    /// Binds the service handle used for on-ingest lookups (gesture names).
    ///
    /// Later bindings are ignored; the sink outlives service rebinds and the
    /// driver re-binds streams instead of re-binding the sink.
    pub(crate) fn bind_service(&self, service: Arc<dyn ServiceHandle>) {
        let _ = self.inner.service.set(service);
    }

    fn push(&self, update: StreamUpdate) {
        match self.inner.tx.try_send(update) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(update)) => {
                log::warn!(
                    "stream queue full, dropping {} update",
                    update.kind_label()
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("stream receiver gone, discarding update");
            }
        }
    }

    /// Transport reported the session as connected to `host`.
    pub fn connected(&self, host: &str) {
        self.inner.states.go_to(ConnectionState::Connected);
        self.inner
            .bus
            .publish(Event::now(EventKind::ConnectedToHost).with_host(host));
    }

    /// Transport reported the session as closed.
    ///
    /// Locally held temporary-skeleton handles become meaningless once the
    /// link is gone, so they are invalidated here; the remote side is cleaned
    /// up when the driver enters the disconnected state.
    pub fn disconnected(&self, host: &str) {
        self.inner.states.go_to(ConnectionState::Disconnected);
        self.inner.temporary.invalidate_local();
        self.inner
            .bus
            .publish(Event::now(EventKind::DisconnectedFromHost).with_host(host));
    }

    /// Ingests a landscape snapshot.
    ///
    /// Gesture entries arrive as bare ids; the names are resolved through the
    /// service handle before the snapshot is retained and queued, so every
    /// observer sees a fully described catalog.
    pub async fn ingest_landscape(&self, mut env: StreamEnvelope<Landscape>) {
        if let Some(service) = self.inner.service.get() {
            match service.gesture_catalog().await {
                Ok(gestures) => env.payload.gestures = gestures,
                Err(err) => {
                    log::warn!("gesture catalog fetch failed: {err}");
                }
            }
        }
        let env = Arc::new(env);
        if let Ok(mut slot) = self.inner.latest_landscape.write() {
            *slot = Some(Arc::clone(&env));
        }
        self.push(StreamUpdate::Landscape(env));
    }

    pub fn ingest_skeleton_poses(&self, env: StreamEnvelope<SkeletonPoseBatch>) {
        self.push(StreamUpdate::SkeletonPoses(Arc::new(env)));
    }

    pub fn ingest_raw_skeleton_poses(&self, env: StreamEnvelope<RawSkeletonPoseBatch>) {
        self.push(StreamUpdate::RawSkeletonPoses(Arc::new(env)));
    }

    pub fn ingest_tracker_poses(&self, env: StreamEnvelope<TrackerPoseBatch>) {
        self.push(StreamUpdate::TrackerPoses(Arc::new(env)));
    }

    pub fn ingest_ergonomics(&self, env: StreamEnvelope<ErgonomicsBatch>) {
        let env = Arc::new(env);
        if let Ok(mut slot) = self.inner.latest_ergonomics.write() {
            *slot = Some(Arc::clone(&env));
        }
        self.push(StreamUpdate::Ergonomics(env));
    }

    pub fn ingest_gestures(&self, env: StreamEnvelope<GestureBatch>) {
        self.push(StreamUpdate::Gestures(Arc::new(env)));
    }

    /// Ingests a system message, reacting to the kinds the session tracks
    /// before forwarding the message downstream.
    pub fn ingest_system(&self, msg: SystemMessage) {
        match msg.kind {
            SystemMessageKind::TemporarySkeletonModified => {
                let index = msg.argument;
                self.inner.temporary.mark_loadable(index);
                self.inner.bus.publish(
                    Event::now(EventKind::TemporarySkeletonModified).with_setup_index(index),
                );
            }
            SystemMessageKind::SessionConnectionClosed => {
                self.inner.states.go_to(ConnectionState::Disconnected);
            }
            _ => {}
        }
        self.push(StreamUpdate::System(msg));
    }

    /// Most recent landscape snapshot, independent of queue consumption.
    pub fn latest_landscape(&self) -> Option<Arc<StreamEnvelope<Landscape>>> {
        self.inner
            .latest_landscape
            .read()
            .ok()
            .and_then(|slot| slot.clone())
    }

    /// Most recent ergonomics batch, independent of queue consumption.
    pub fn latest_ergonomics(&self) -> Option<Arc<StreamEnvelope<ErgonomicsBatch>>> {
        self.inner
            .latest_ergonomics
            .read()
            .ok()
            .and_then(|slot| slot.clone())
    }
}

impl StreamReceiver {
    /// Waits for the next update. Returns `None` once every sink is dropped.
    pub async fn recv(&mut self) -> Option<StreamUpdate> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<StreamUpdate> {
        self.rx.try_recv().ok()
    }

    /// Drains everything currently queued, in arrival order.
    pub fn drain(&mut self) -> Vec<StreamUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = self.rx.try_recv() {
            out.push(update);
        }
        out
    }
}
