//! # Lifecycle events emitted by the session runtime.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Connection events**: host discovery, connect/disconnect.
//! - **Skeleton events**: builds, queueing, temporary skeleton saves.
//! - **Runtime events**: driver shutdown, tick faults.
//!
//! The [`Event`] struct carries additional metadata such as timestamps, host
//! names, setup indices, and failure reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EventKind {
    // === Connection events ===
    /// Discovery finished and found at least one host.
    ///
    /// Sets: `at`, `seq`.
    HostsDiscovered,

    /// A connection to a host was established.
    ///
    /// Sets: `host`, `at`, `seq`.
    ConnectedToHost,

    /// The connection to a host was lost or closed.
    ///
    /// Sets: `host` (when known), `at`, `seq`.
    DisconnectedFromHost,

    // === Skeleton events ===
    /// A draft was built into a remote setup and loaded.
    ///
    /// Sets: `setup_index`, `at`, `seq`.
    SkeletonLoaded,

    /// A draft was (re-)queued for a later build attempt.
    ///
    /// Sets: `reason` (when the queueing followed a failure), `at`, `seq`.
    SkeletonQueued,

    /// A draft was saved as a temporary skeleton for external editing.
    ///
    /// Sets: `setup_index`, `at`, `seq`.
    TemporarySkeletonSaved,

    /// The service reported a temporary skeleton as externally modified.
    ///
    /// Sets: `setup_index`, `at`, `seq`.
    TemporarySkeletonModified,

    // === Runtime events ===
    /// Shutdown of the driver was requested.
    ///
    /// Sets: `at`, `seq`.
    ShutdownRequested,

    /// A driver tick faulted; the loop continues on the next tick.
    ///
    /// Sets: `reason`, `at`, `seq`.
    TickFaulted,
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Host name, if applicable.
    pub host: Option<Arc<str>>,
    /// Remote setup index, if applicable.
    pub setup_index: Option<u32>,
    /// Human-readable reason (failures, tick faults).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            host: None,
            setup_index: None,
            reason: None,
        }
    }

    /// Attaches a host name.
    #[inline]
    pub fn with_host(mut self, host: impl Into<Arc<str>>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Attaches a setup index.
    #[inline]
    pub fn with_setup_index(mut self, index: u32) -> Self {
        self.setup_index = Some(index);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
