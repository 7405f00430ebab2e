//! # Session supervisor: the application-facing surface.
//!
//! Owns the driver task and the shared session state. Applications build a
//! supervisor around a [`ServiceHandle`], start it, and then talk to the
//! session through its methods while consuming streams from the
//! [`StreamReceiver`] returned by the builder and lifecycle events from
//! [`Supervisor::subscribe`].
//!
//! Every method is safe from any task; operations that need the driver are
//! deferred into the pending queues, everything else hits the service
//! directly.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::driver::{self, Shared};
use crate::core::state::{ConnectionState, StateCells};
use crate::error::{ServiceError, SessionError};
use crate::events::bus::Bus;
use crate::events::dispatcher::{stream_channel, StreamReceiver};
use crate::events::envelope::{ErgonomicsBatch, Landscape, StreamEnvelope};
use crate::events::event::{Event, EventKind};
use crate::service::handle::ServiceHandle;
use crate::service::types::{HostDescriptor, SessionSummary, TrackerPose};
use crate::settings::{ConnectionSettings, SettingsStore};
use crate::skeleton::builder;
use crate::skeleton::draft::{DraftRef, MeshSetup};
use crate::skeleton::temporary::TemporarySkeletonRegistry;
use crate::trackers::{CustomTracker, TrackedObject};

/// Configures and assembles a [`Supervisor`].
pub struct SupervisorBuilder {
    service: Arc<dyn ServiceHandle>,
    config: Config,
    settings: SettingsStore,
}

impl SupervisorBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Uses a file-backed (or pre-seeded) settings store instead of
    /// in-memory defaults.
    pub fn settings(mut self, settings: SettingsStore) -> Self {
        self.settings = settings;
        self
    }

    /// Assembles the supervisor and the stream receiver the application
    /// consumes. The driver is not running yet; call
    /// [`Supervisor::start`].
    pub fn build(self) -> (Supervisor, StreamReceiver) {
        let states = Arc::new(StateCells::new(ConnectionState::Unknown));
        let bus = Bus::new(self.config.bus_capacity_clamped());
        let temporary = Arc::new(TemporarySkeletonRegistry::new());
        let (sink, receiver) = stream_channel(
            self.config.stream_capacity_clamped(),
            Arc::clone(&states),
            bus.clone(),
            Arc::clone(&temporary),
        );
        sink.bind_service(Arc::clone(&self.service));
        let shared = Arc::new(Shared::new(
            self.config,
            self.service,
            self.settings,
            states,
            bus,
            sink,
            temporary,
        ));
        let supervisor = Supervisor {
            shared,
            cancel: CancellationToken::new(),
            driver: Mutex::new(None),
        };
        (supervisor, receiver)
    }
}

/// Handle to one running session.
pub struct Supervisor {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Starts assembling a supervisor over `service`.
    pub fn builder(service: Arc<dyn ServiceHandle>) -> SupervisorBuilder {
        SupervisorBuilder {
            service,
            config: Config::default(),
            settings: SettingsStore::ephemeral(ConnectionSettings::default()),
        }
    }

    /// Brings up the transport, attaches the streams and spawns the driver.
    /// Idempotent while the driver is running.
    pub async fn start(&self) -> Result<(), SessionError> {
        {
            let driver = self.driver.lock().expect("driver slot poisoned");
            if driver.is_some() {
                return Ok(());
            }
        }
        self.shared.service.initialize().await.map_err(SessionError::from)?;
        self.shared
            .service
            .attach_streams(self.shared.sink.clone())
            .await
            .map_err(SessionError::from)?;
        self.shared.states.go_to(ConnectionState::Disconnected);

        let handle = tokio::spawn(driver::run(
            Arc::clone(&self.shared),
            self.cancel.child_token(),
        ));
        *self.driver.lock().expect("driver slot poisoned") = Some(handle);
        log::info!("session driver started");
        Ok(())
    }

    /// Stops the driver and releases the transport.
    ///
    /// Waits up to the configured grace for the current tick to finish;
    /// past that the task is detached and [`SessionError::GraceExceeded`]
    /// reported. The transport is shut down either way.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let handle = self
            .driver
            .lock()
            .expect("driver slot poisoned")
            .take()
            .ok_or(SessionError::DriverStopped)?;

        self.shared
            .bus
            .publish(Event::now(EventKind::ShutdownRequested));
        self.cancel.cancel();

        let grace = self.shared.config.grace;
        let graceful = tokio::time::timeout(grace, handle).await.is_ok();

        if let Err(err) = self.shared.service.disconnect().await {
            log::debug!("disconnect during shutdown failed: {err}");
        }
        if let Err(err) = self.shared.service.shutdown().await {
            log::warn!("transport shutdown failed: {err}");
        }
        if graceful {
            Ok(())
        } else {
            Err(SessionError::GraceExceeded { grace })
        }
    }

    // ### State

    /// Current session state (at most one tick stale).
    pub fn state(&self) -> ConnectionState {
        self.shared.states.current()
    }

    /// Files a user intent; applied once internal intents are satisfied.
    pub fn request_state(&self, state: ConnectionState) {
        self.shared.states.request(state);
    }

    /// Files an internal-priority intent, applied on the next tick.
    pub fn go_to_state(&self, state: ConnectionState) {
        self.shared.states.go_to(state);
    }

    /// Marks the foreground consumer active or paused. While paused, the
    /// driver keeps the link alive but leaves the queues alone.
    pub fn set_active(&self, active: bool) {
        self.shared
            .active
            .store(active, std::sync::atomic::Ordering::Release);
    }

    // ### Connection

    /// Connects to a specific host.
    pub async fn connect(&self, host: HostDescriptor) -> Result<(), ServiceError> {
        driver::connect_to(&self.shared, host).await
    }

    /// Drops the current connection and stays disconnected until asked (or
    /// auto-connect kicks in again).
    pub async fn disconnect(&self) -> Result<(), ServiceError> {
        self.shared.service.disconnect().await?;
        self.shared.states.go_to(ConnectionState::Disconnected);
        Ok(())
    }

    /// One discovery round plus a connection attempt against the preferred
    /// host. Returns whether a connection was initiated.
    pub async fn auto_connect(&self) -> Result<bool, ServiceError> {
        let _token = self
            .shared
            .discovery
            .try_begin()
            .ok_or_else(|| ServiceError::transient("discovery already in progress"))?;
        driver::auto_connect_once(&self.shared).await
    }

    /// Runs discovery and returns the announced hosts.
    pub async fn search_and_fetch_hosts(&self) -> Result<Vec<HostDescriptor>, ServiceError> {
        let _token = self
            .shared
            .discovery
            .try_begin()
            .ok_or_else(|| ServiceError::transient("discovery already in progress"))?;
        driver::discover_hosts(&self.shared).await
    }

    /// Hosts found by the most recent discovery round.
    pub fn discovered_hosts(&self) -> Vec<HostDescriptor> {
        self.shared
            .discovered
            .lock()
            .expect("hosts lock poisoned")
            .clone()
    }

    // ### Skeletons

    /// Queues a draft for building on the next connected tick. A draft
    /// already live is rebuilt in place (its setup index is kept).
    pub fn setup_skeleton(&self, draft: DraftRef) {
        self.shared.pending_skeletons.push(draft);
    }

    /// Unloads the draft's live skeleton and releases its identity.
    pub async fn unload_skeleton(&self, draft: &DraftRef) -> Result<(), ServiceError> {
        builder::unload(self.shared.service.as_ref(), draft).await?;
        self.shared
            .built
            .lock()
            .expect("built lock poisoned")
            .retain(|d| !Arc::ptr_eq(d, draft));
        Ok(())
    }

    /// Sizes the remote chain storage for a built draft.
    pub async fn allocate_chains(&self, draft: &DraftRef) -> Result<(), ServiceError> {
        let index = setup_index_of(draft)?;
        self.shared.service.allocate_chains(index).await
    }

    /// Finalizes a built draft so it can be loaded remotely.
    pub async fn prepare_skeleton(&self, draft: &DraftRef) -> Result<(), ServiceError> {
        let index = setup_index_of(draft)?;
        self.shared.service.prepare_setup(index).await
    }

    // ### Temporary skeletons

    /// Stores a built draft on the host for external editing.
    pub async fn save_temporary_skeleton(
        &self,
        draft: &DraftRef,
        modified: bool,
    ) -> Result<(), ServiceError> {
        self.shared
            .temporary
            .save(self.shared.service.as_ref(), draft, modified)
            .await?;
        let index = setup_index_of(draft)?;
        self.shared
            .bus
            .publish(Event::now(EventKind::TemporarySkeletonSaved).with_setup_index(index));
        Ok(())
    }

    /// Stores a built draft together with fresh mesh data. The meshes are
    /// uploaded to the draft's setup slot first so the stored copy carries
    /// them; a failed upload aborts before anything is saved.
    pub async fn save_temporary_skeleton_with_meshes(
        &self,
        draft: &DraftRef,
        meshes: Vec<MeshSetup>,
        modified: bool,
    ) -> Result<(), ServiceError> {
        let index = setup_index_of(draft)?;
        for mesh in &meshes {
            self.shared.service.add_mesh(index, mesh).await?;
        }
        self.save_temporary_skeleton(draft, modified).await
    }

    /// Pulls a stored temporary skeleton back into `draft`.
    pub async fn load_temporary_skeleton(
        &self,
        draft: &DraftRef,
        setup_index: u32,
        session_id: u32,
    ) -> Result<(), ServiceError> {
        self.shared
            .temporary
            .fetch(self.shared.service.as_ref(), draft, setup_index, session_id)
            .await
    }

    /// Sessions on the host and the temporary skeletons they hold.
    pub async fn list_temporary_skeletons(&self) -> Result<Vec<SessionSummary>, ServiceError> {
        self.shared
            .temporary
            .list(self.shared.service.as_ref())
            .await
    }

    /// Setup indices flagged modified by an external editor and not yet
    /// fetched back.
    pub fn loadable_temporary_skeletons(&self) -> Vec<u32> {
        self.shared.temporary.loadable_indices()
    }

    /// Whether an external editor has modified the temporary skeleton at
    /// `setup_index` since it was last fetched.
    pub fn has_loadable_skeleton(&self, setup_index: u32) -> bool {
        self.shared.temporary.is_loadable(setup_index)
    }

    /// Drops the modified flag for `setup_index` without fetching the
    /// stored copy back.
    pub fn acknowledge_loadable_skeleton(&self, setup_index: u32) {
        self.shared.temporary.acknowledge(setup_index);
    }

    /// Writes the compressed stored copy of `draft` to `path`.
    pub async fn save_temporary_skeleton_to_file(
        &self,
        draft: &DraftRef,
        path: &Path,
    ) -> Result<(), SessionError> {
        self.shared
            .temporary
            .export_to_file(self.shared.service.as_ref(), draft, path)
            .await
    }

    /// Loads a previously exported file into `draft`.
    pub async fn load_temporary_skeleton_from_file(
        &self,
        draft: &DraftRef,
        path: &Path,
    ) -> Result<(), SessionError> {
        self.shared
            .temporary
            .import_from_file(self.shared.service.as_ref(), draft, path)
            .await
    }

    // ### Trackers

    /// Registers a custom tracker. Fails synchronously on a duplicate id;
    /// the announcement to the service is best-effort and repeated on every
    /// (re-)connect.
    pub async fn register_custom_tracker(
        &self,
        tracker: CustomTracker,
    ) -> Result<(), ServiceError> {
        let id = tracker.tracker_id.clone();
        self.shared.custom_trackers.register(tracker)?;
        if self.state() == ConnectionState::Connected {
            if let Err(err) = self.shared.service.register_tracker(&id).await {
                log::warn!("announcing tracker {id} failed: {err}");
            }
        }
        Ok(())
    }

    /// Removes a custom tracker; `false` when the id was unknown.
    pub async fn unregister_custom_tracker(&self, tracker_id: &str) -> bool {
        let removed = self.shared.custom_trackers.unregister(tracker_id);
        if removed && self.state() == ConnectionState::Connected {
            if let Err(err) = self.shared.service.unregister_tracker(tracker_id).await {
                log::warn!("withdrawing tracker {tracker_id} failed: {err}");
            }
        }
        removed
    }

    /// Records the latest pose of a registered custom tracker; the driver
    /// pushes it upstream on the next connected tick.
    pub fn update_tracker_pose(&self, pose: TrackerPose) -> bool {
        self.shared.custom_trackers.update_pose(pose)
    }

    /// Queues a tracked object; it becomes active once its user is
    /// resolvable from the landscape.
    pub fn register_tracked_object(&self, object: TrackedObject) {
        self.shared.tracked.clear_tombstone(&object.object_id);
        self.shared.pending_tracked.push(object);
    }

    /// Removes a tracked object, whether still pending, already active, or
    /// mid-resolution in the driver (a tombstone discards that activation).
    pub fn unregister_tracked_object(&self, object_id: &str) -> bool {
        let mut removed = self.shared.tracked.remove(object_id);
        for object in self.shared.pending_tracked.drain() {
            if object.object_id == object_id {
                removed = true;
            } else {
                self.shared.pending_tracked.push(object);
            }
        }
        removed
    }

    // ### Streams and events

    /// Subscribes to lifecycle events (connects, builds, faults).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Most recent landscape snapshot, independent of stream consumption.
    pub fn latest_landscape(&self) -> Option<Arc<StreamEnvelope<Landscape>>> {
        self.shared.sink.latest_landscape()
    }

    /// Most recent ergonomics batch, independent of stream consumption.
    pub fn latest_ergonomics(&self) -> Option<Arc<StreamEnvelope<ErgonomicsBatch>>> {
        self.shared.sink.latest_ergonomics()
    }
}

fn setup_index_of(draft: &DraftRef) -> Result<u32, ServiceError> {
    draft
        .lock()
        .expect("draft lock poisoned")
        .setup_index
        .ok_or_else(|| ServiceError::structural("draft has no setup index; build it first"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::service::mock::MockService;
    use crate::service::types::TrackerKind;
    use crate::skeleton::draft::{SkeletonDraft, SkeletonKind, TargetBinding};

    fn supervisor() -> (Supervisor, StreamReceiver, Arc<MockService>) {
        let service = Arc::new(MockService::new());
        let (supervisor, receiver) = Supervisor::builder(
            Arc::clone(&service) as Arc<dyn ServiceHandle>,
        )
        .config(Config {
            poll_interval: Duration::from_millis(1),
            ..Config::default()
        })
        .build();
        (supervisor, receiver, service)
    }

    #[tokio::test]
    async fn start_and_stop_round_trip() {
        let (supervisor, _rx, service) = supervisor();
        supervisor.start().await.unwrap();
        supervisor.stop().await.unwrap();

        assert_eq!(service.calls_named("initialize"), 1);
        assert_eq!(service.calls_named("attach_streams"), 1);
        assert_eq!(service.calls_named("shutdown"), 1);
        assert!(matches!(
            supervisor.stop().await,
            Err(SessionError::DriverStopped)
        ));
    }

    #[tokio::test]
    async fn duplicate_tracker_is_rejected_without_announcement() {
        let (supervisor, _rx, service) = supervisor();
        let tracker = CustomTracker {
            tracker_id: "waist".to_owned(),
            kind: TrackerKind::Waist,
            user_id: 1,
        };
        supervisor.register_custom_tracker(tracker.clone()).await.unwrap();
        let err = supervisor
            .register_custom_tracker(tracker)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate { .. }));
        // Disconnected, so no announcements went out either way.
        assert_eq!(service.calls_named("register_tracker"), 0);
    }

    #[tokio::test]
    async fn unregister_tracked_object_covers_pending_entries() {
        let (supervisor, _rx, _service) = supervisor();
        supervisor.register_tracked_object(TrackedObject {
            object_id: "prop".to_owned(),
            kind: TrackerKind::Controller,
            user_id: None,
        });
        assert!(supervisor.unregister_tracked_object("prop"));
        assert!(!supervisor.unregister_tracked_object("prop"));
    }

    #[tokio::test]
    async fn save_with_meshes_uploads_before_saving() {
        let (supervisor, _rx, service) = supervisor();
        let mut draft = SkeletonDraft::new(
            "figure",
            SkeletonKind::Body,
            TargetBinding::Animation,
        );
        draft.setup_index = Some(4);
        let draft = draft.into_ref();

        supervisor
            .save_temporary_skeleton_with_meshes(&draft, vec![MeshSetup::new(0)], false)
            .await
            .unwrap();

        let calls = service.calls();
        let mesh_at = calls.iter().position(|c| c.starts_with("add_mesh")).unwrap();
        let save_at = calls
            .iter()
            .position(|c| c.starts_with("save_temporary_skeleton"))
            .unwrap();
        assert!(mesh_at < save_at);
    }

    #[tokio::test]
    async fn operations_on_unbuilt_draft_fail_structurally() {
        let (supervisor, _rx, _service) = supervisor();
        let draft = SkeletonDraft::new(
            "figure",
            SkeletonKind::Body,
            TargetBinding::Animation,
        )
        .into_ref();
        let err = supervisor.prepare_skeleton(&draft).await.unwrap_err();
        assert_eq!(err.as_label(), "service_structural");
    }
}
