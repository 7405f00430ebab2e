//! # The background driver: one task, one tick cadence, one state machine.
//!
//! ```text
//!        ┌────────────── tick (poll_interval) ──────────────┐
//!        │                                                  │
//!        ▼                                                  │
//!  consume intents ──▶ state changed? ──▶ entry actions     │
//!        │                                                  │
//!        ▼                                                  │
//!  per-state work:                                          │
//!    Unknown      → steer to Disconnected                   │
//!    Disconnected → auto-connect on its own cadence         │
//!    Connecting   → poll the link                           │
//!    Connected    → drain queues, push tracker poses ───────┘
//! ```
//!
//! Every tick runs behind a panic boundary: a fault is logged and published,
//! and the next tick proceeds. The driver is the only writer of the session
//! state; everyone else communicates through the intent cells and the
//! pending queues in [`Shared`].

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::discovery::{select_host, DiscoveryGuard};
use crate::core::queues::PendingQueue;
use crate::core::state::{ConnectionState, StateCells};
use crate::error::ServiceError;
use crate::events::bus::Bus;
use crate::events::dispatcher::StreamSink;
use crate::events::event::{Event, EventKind};
use crate::service::handle::ServiceHandle;
use crate::service::types::HostDescriptor;
use crate::settings::SettingsStore;
use crate::skeleton::builder::{self, BuildOutcome};
use crate::skeleton::draft::DraftRef;
use crate::skeleton::temporary::TemporarySkeletonRegistry;
use crate::trackers::{resolve_user_id, CustomTrackerRegistry, TrackedObject, TrackedObjectSet};

/// State shared between the driver task, the supervisor and the stream
/// layer. Each queue and registry carries its own lock; no two are ever
/// held at once.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) states: Arc<StateCells>,
    pub(crate) bus: Bus,
    pub(crate) service: Arc<dyn ServiceHandle>,
    pub(crate) sink: StreamSink,
    pub(crate) settings: Mutex<SettingsStore>,
    pub(crate) temporary: Arc<TemporarySkeletonRegistry>,
    pub(crate) custom_trackers: Arc<CustomTrackerRegistry>,
    pub(crate) tracked: Arc<TrackedObjectSet>,
    pub(crate) pending_skeletons: PendingQueue<DraftRef>,
    pub(crate) pending_tracked: PendingQueue<TrackedObject>,
    /// Drafts currently realized remotely; re-queued on disconnect.
    pub(crate) built: Mutex<Vec<DraftRef>>,
    pub(crate) discovery: DiscoveryGuard,
    pub(crate) discovered: Mutex<Vec<HostDescriptor>>,
    pub(crate) current_host: Mutex<Option<HostDescriptor>>,
    /// Whether the foreground consumer is running; Connected ticks are
    /// no-ops while it is not.
    pub(crate) active: AtomicBool,
    /// Set on the first entry into Disconnected, which is startup itself;
    /// the transport was just brought up and must not be restarted then.
    entered_disconnected: AtomicBool,
    last_auto_connect: Mutex<Option<Instant>>,
}

impl Shared {
    pub(crate) fn new(
        config: Config,
        service: Arc<dyn ServiceHandle>,
        settings: SettingsStore,
        states: Arc<StateCells>,
        bus: Bus,
        sink: StreamSink,
        temporary: Arc<TemporarySkeletonRegistry>,
    ) -> Self {
        Self {
            config,
            states,
            bus,
            service,
            sink,
            settings: Mutex::new(settings),
            temporary,
            custom_trackers: Arc::new(CustomTrackerRegistry::new()),
            tracked: Arc::new(TrackedObjectSet::new()),
            pending_skeletons: PendingQueue::new(),
            pending_tracked: PendingQueue::new(),
            built: Mutex::new(Vec::new()),
            discovery: DiscoveryGuard::default(),
            discovered: Mutex::new(Vec::new()),
            current_host: Mutex::new(None),
            active: AtomicBool::new(true),
            entered_disconnected: AtomicBool::new(false),
            last_auto_connect: Mutex::new(None),
        }
    }
}

/// Runs the driver until `cancel` fires.
pub(crate) async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut ticker = interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(panic) = AssertUnwindSafe(tick(&shared)).catch_unwind().await {
                    let reason = panic_reason(panic.as_ref());
                    log::error!("driver tick panicked: {reason}");
                    shared
                        .bus
                        .publish(Event::now(EventKind::TickFaulted).with_reason(reason));
                }
            }
        }
    }
    log::debug!("driver stopped");
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

async fn tick(shared: &Arc<Shared>) {
    let prev = shared.states.current();
    if let Some(state) = shared.states.step() {
        on_transition(shared, prev, state).await;
    }

    match shared.states.current() {
        ConnectionState::Unknown => {
            shared.states.go_to(ConnectionState::Disconnected);
        }
        ConnectionState::Disconnected => tick_disconnected(shared),
        ConnectionState::Connecting => {
            if shared.service.is_connected().await {
                shared.states.go_to(ConnectionState::Connected);
            }
        }
        ConnectionState::Connected => tick_connected(shared).await,
    }
}

async fn on_transition(shared: &Arc<Shared>, from: ConnectionState, to: ConnectionState) {
    log::info!("session state {} -> {}", from.as_label(), to.as_label());
    match to {
        ConnectionState::Connected => on_enter_connected(shared).await,
        ConnectionState::Disconnected => {
            if shared.entered_disconnected.swap(true, Ordering::AcqRel) {
                on_enter_disconnected(shared).await;
            }
        }
        _ => {}
    }
}

async fn on_enter_connected(shared: &Arc<Shared>) {
    let host_name = shared
        .current_host
        .lock()
        .expect("host lock poisoned")
        .as_ref()
        .map(|h| h.name.clone());
    if let Some(name) = host_name {
        let result = shared
            .settings
            .lock()
            .expect("settings lock poisoned")
            .update(|s| s.set_last_connected_host(&name));
        if let Err(err) = result {
            log::warn!("failed to persist connection settings: {err}");
        }
    }

    // Trackers survive disconnects locally; the service does not.
    for tracker in shared.custom_trackers.trackers() {
        if let Err(err) = shared.service.register_tracker(&tracker.tracker_id).await {
            log::warn!("re-announcing tracker {} failed: {err}", tracker.tracker_id);
        }
    }
}

/// Leaving a live (or half-open) link: every remotely realized draft goes
/// back to the pending queue with its identity invalidated, temporary
/// handles are dropped, and the transport is restarted so the next
/// connection starts clean.
async fn on_enter_disconnected(shared: &Arc<Shared>) {
    flush_registrations(shared);

    if let Err(err) = shared.temporary.clear_all(shared.service.as_ref()).await {
        log::debug!("remote temporary cleanup skipped: {err}");
        shared.temporary.invalidate_local();
    }

    if let Err(err) = shared.service.shutdown().await {
        log::warn!("transport shutdown failed: {err}");
    }
    if let Err(err) = shared.service.initialize().await {
        log::warn!("transport re-initialize failed: {err}");
    }
    if let Err(err) = shared.service.attach_streams(shared.sink.clone()).await {
        log::warn!("stream re-attach failed: {err}");
    }

    *shared.current_host.lock().expect("host lock poisoned") = None;
}

pub(crate) fn flush_registrations(shared: &Shared) {
    let built: Vec<DraftRef> = shared
        .built
        .lock()
        .expect("built lock poisoned")
        .drain(..)
        .collect();
    for draft in built {
        builder::invalidate_identity(&draft);
        shared.pending_skeletons.push(draft);
    }
}

fn tick_disconnected(shared: &Arc<Shared>) {
    let (auto_connect, due) = {
        let settings = shared.settings.lock().expect("settings lock poisoned");
        let auto_connect = settings.get().auto_connect;
        let mut last = shared
            .last_auto_connect
            .lock()
            .expect("cadence lock poisoned");
        let due = last
            .map(|at| at.elapsed() >= shared.config.reconnect_interval)
            .unwrap_or(true);
        if auto_connect && due {
            *last = Some(Instant::now());
        }
        (auto_connect, due)
    };
    if !(auto_connect && due) {
        return;
    }

    // Discovery waits on the network; run it off the tick path so the
    // cadence holds.
    let Some(token) = shared.discovery.try_begin() else {
        return;
    };
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let _token = token;
        match auto_connect_once(&shared).await {
            Ok(true) => {}
            Ok(false) => log::debug!("auto-connect found no host"),
            Err(err) => log::warn!("auto-connect failed: {err}"),
        }
    });
}

async fn tick_connected(shared: &Arc<Shared>) {
    if !shared.service.is_connected().await {
        shared.states.go_to(ConnectionState::Disconnected);
        return;
    }
    if !shared.active.load(Ordering::Acquire) {
        return;
    }

    drain_skeletons(shared).await;
    drain_tracked_objects(shared);
    push_tracker_poses(shared).await;
}

async fn drain_skeletons(shared: &Arc<Shared>) {
    let default_user = shared
        .sink
        .latest_landscape()
        .and_then(|env| env.payload.users.first().map(|u| u.user_id));

    for draft in shared.pending_skeletons.drain() {
        let outcome = builder::build_setup(
            shared.service.as_ref(),
            shared.temporary.as_ref(),
            &draft,
            default_user,
        )
        .await;
        match outcome {
            BuildOutcome::Built {
                setup_index,
                skeleton_id,
            } => {
                log::info!("skeleton setup {setup_index} loaded as {skeleton_id}");
                shared
                    .built
                    .lock()
                    .expect("built lock poisoned")
                    .push(Arc::clone(&draft));
                shared
                    .bus
                    .publish(Event::now(EventKind::SkeletonLoaded).with_setup_index(setup_index));
            }
            BuildOutcome::Queued(err) => {
                log::debug!("skeleton build deferred: {err}");
                shared
                    .bus
                    .publish(Event::now(EventKind::SkeletonQueued).with_reason(err.to_string()));
                shared.pending_skeletons.push(draft);
            }
            BuildOutcome::Failed(err) => {
                log::error!("skeleton build failed permanently: {err}");
            }
        }
    }
}

fn drain_tracked_objects(shared: &Arc<Shared>) {
    let Some(landscape) = shared.sink.latest_landscape() else {
        return;
    };
    for object in shared.pending_tracked.drain() {
        match resolve_user_id(object.user_id, &landscape.payload) {
            Some(user_id) => {
                log::debug!("tracked object {} bound to user {user_id}", object.object_id);
                shared.tracked.activate(object, user_id);
            }
            None => shared.pending_tracked.push(object),
        }
    }
}

async fn push_tracker_poses(shared: &Arc<Shared>) {
    let poses = shared.custom_trackers.collect_poses();
    if poses.is_empty() {
        return;
    }
    // Poses are perishable; a failed send is dropped, not retried.
    if let Err(err) = shared.service.send_tracker_poses(&poses).await {
        log::warn!("tracker pose push failed: {err}");
    }
}

/// One discovery round followed by a connection attempt against the
/// preferred host. Returns whether a connection was initiated.
pub(crate) async fn auto_connect_once(shared: &Arc<Shared>) -> Result<bool, ServiceError> {
    let hosts = discover_hosts(shared).await?;
    let settings = shared
        .settings
        .lock()
        .expect("settings lock poisoned")
        .get()
        .clone();
    let Some(host) = select_host(&hosts, &settings).cloned() else {
        if settings.connect_default_transport {
            connect_default(shared).await?;
            return Ok(true);
        }
        return Ok(false);
    };
    connect_to(shared, host).await?;
    Ok(true)
}

/// Runs discovery, retains the result and announces it on the bus.
pub(crate) async fn discover_hosts(
    shared: &Arc<Shared>,
) -> Result<Vec<HostDescriptor>, ServiceError> {
    let local_only = {
        let settings = shared.settings.lock().expect("settings lock poisoned");
        settings.get().local_only
    };
    let hosts = shared
        .service
        .discover_hosts(shared.config.discovery_wait, local_only)
        .await?;
    *shared.discovered.lock().expect("hosts lock poisoned") = hosts.clone();
    if !hosts.is_empty() {
        shared.bus.publish(Event::now(EventKind::HostsDiscovered));
    }
    Ok(hosts)
}

/// Issues a connection attempt and steers the state machine to Connecting.
/// Confirmation arrives through the connected callback or the link poll.
pub(crate) async fn connect_to(
    shared: &Arc<Shared>,
    host: HostDescriptor,
) -> Result<(), ServiceError> {
    shared.states.go_to(ConnectionState::Connecting);
    match shared.service.connect(&host).await {
        Ok(()) => {
            log::info!("connecting to {} ({})", host.name, host.address);
            *shared.current_host.lock().expect("host lock poisoned") = Some(host);
            Ok(())
        }
        Err(err) => {
            shared.states.go_to(ConnectionState::Disconnected);
            Err(err)
        }
    }
}

/// Connection attempt over the default transport when discovery produced
/// no usable host. Leaves `current_host` empty; the connected callback
/// reports the host the transport actually reached.
async fn connect_default(shared: &Arc<Shared>) -> Result<(), ServiceError> {
    shared.states.go_to(ConnectionState::Connecting);
    match shared.service.connect_default_transport().await {
        Ok(()) => {
            log::info!("connecting over default transport");
            Ok(())
        }
        Err(err) => {
            shared.states.go_to(ConnectionState::Disconnected);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::dispatcher::stream_channel;
    use crate::service::mock::MockService;
    use crate::settings::{ConnectionSettings, SettingsStore};
    use crate::skeleton::draft::{SkeletonDraft, SkeletonKind, TargetBinding};

    fn make_shared(service: Arc<MockService>) -> Arc<Shared> {
        make_shared_with(service, ConnectionSettings::default())
    }

    fn make_shared_with(service: Arc<MockService>, settings: ConnectionSettings) -> Arc<Shared> {
        let config = Config::default();
        let states = Arc::new(StateCells::new(ConnectionState::Unknown));
        let bus = Bus::new(16);
        let temporary = Arc::new(TemporarySkeletonRegistry::new());
        let (sink, _rx) = stream_channel(
            16,
            Arc::clone(&states),
            bus.clone(),
            Arc::clone(&temporary),
        );
        Arc::new(Shared::new(
            config,
            service,
            SettingsStore::ephemeral(settings),
            states,
            bus,
            sink,
            temporary,
        ))
    }

    fn built_draft(setup_index: u32, remote_id: u32) -> DraftRef {
        let mut draft = SkeletonDraft::new(
            "figure",
            SkeletonKind::Body,
            TargetBinding::Animation,
        );
        draft.setup_index = Some(setup_index);
        draft.remote_id = Some(remote_id);
        draft.into_ref()
    }

    #[tokio::test]
    async fn disconnect_requeues_each_built_draft_once() {
        let service = Arc::new(MockService::new());
        let shared = make_shared(Arc::clone(&service));

        let draft = built_draft(4, 1004);
        shared.built.lock().unwrap().push(Arc::clone(&draft));

        flush_registrations(&shared);

        let pending = shared.pending_skeletons.drain();
        assert_eq!(pending.len(), 1);
        assert!(shared.built.lock().unwrap().is_empty());

        let guard = draft.lock().unwrap();
        assert_eq!(guard.setup_index, None);
        assert_eq!(guard.remote_id, None);
    }

    #[tokio::test]
    async fn entering_disconnected_restarts_transport() {
        let service = Arc::new(MockService::new());
        let shared = make_shared(Arc::clone(&service));

        on_enter_disconnected(&shared).await;

        assert_eq!(service.calls_named("clear_all_temporary_skeletons"), 1);
        assert_eq!(service.calls_named("shutdown"), 1);
        assert_eq!(service.calls_named("initialize"), 1);
        assert_eq!(service.calls_named("attach_streams"), 1);
        assert!(shared.current_host.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn reentering_disconnected_restarts_transport_from_any_state() {
        let service = Arc::new(MockService::new());
        let shared = make_shared(Arc::clone(&service));

        // Startup entry: the supervisor just brought the transport up.
        on_transition(&shared, ConnectionState::Unknown, ConnectionState::Disconnected).await;
        assert_eq!(service.calls_named("initialize"), 0);

        // Any later entry restarts, even without a connection in between.
        on_transition(&shared, ConnectionState::Unknown, ConnectionState::Disconnected).await;
        assert_eq!(service.calls_named("shutdown"), 1);
        assert_eq!(service.calls_named("initialize"), 1);
    }

    #[tokio::test]
    async fn failed_connect_steers_back_to_disconnected() {
        let service = Arc::new(MockService::new());
        service.fail_next("connect", ServiceError::transient("refused"));
        let shared = make_shared(Arc::clone(&service));

        let host = HostDescriptor {
            name: "alpha".into(),
            address: "10.0.0.2".into(),
            service_version: "2.4.0".into(),
        };
        assert!(connect_to(&shared, host).await.is_err());
        // Connecting was requested, then withdrawn; net effect is none.
        shared.states.step();
        assert_ne!(shared.states.current(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn auto_connect_falls_back_to_default_transport() {
        let service = Arc::new(MockService::new());
        let settings = ConnectionSettings {
            connect_default_transport: true,
            ..ConnectionSettings::default()
        };
        let shared = make_shared_with(Arc::clone(&service), settings);

        // No hosts announced, so discovery finds nothing to select.
        assert!(auto_connect_once(&shared).await.unwrap());

        assert_eq!(service.calls_named("connect"), 0);
        assert_eq!(service.calls_named("connect_default_transport"), 1);
        // The transport reports which host it reached; none is assumed.
        assert!(shared.current_host.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn connected_tick_is_idle_while_inactive() {
        let service = Arc::new(MockService::new());
        let shared = make_shared(Arc::clone(&service));
        let host = HostDescriptor {
            name: "alpha".into(),
            address: "10.0.0.2".into(),
            service_version: "2.4.0".into(),
        };
        connect_to(&shared, host).await.unwrap();
        shared.states.go_to(ConnectionState::Connected);
        shared.states.step();

        shared.active.store(false, Ordering::Release);
        shared.pending_skeletons.push(built_draft(1, 1001));
        tick_connected(&shared).await;

        // Queue untouched: nothing was drained or built.
        assert_eq!(shared.pending_skeletons.len(), 1);
        assert_eq!(service.calls_named("create_setup"), 0);
    }
}
