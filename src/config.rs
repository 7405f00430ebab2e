//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the session runtime:
//! poll cadence, reconnect cadence, discovery wait, channel capacities, and
//! the shutdown grace window.
//!
//! ## Sentinel values
//! - `stream_capacity` and `bus_capacity` are clamped to a minimum of 1.
//! - `grace = 0s` → `stop()` does not wait for the driver at all.

use std::time::Duration;

/// Global configuration for the session runtime.
///
/// ## Field semantics
/// - `poll_interval`: driver tick cadence (state machine + queue drains)
/// - `reconnect_interval`: minimum gap between automatic discovery attempts
///   while disconnected
/// - `discovery_wait`: how long one discovery pass listens for hosts
/// - `grace`: maximum wait for the driver task to stop on shutdown
/// - `stream_capacity`: bounded FIFO between stream callbacks and the
///   foreground consumer; overflow drops updates for the consumer
/// - `bus_capacity`: lifecycle event bus ring buffer size
#[derive(Clone, Debug)]
pub struct Config {
    /// Driver tick cadence.
    pub poll_interval: Duration,

    /// Minimum gap between automatic discovery attempts while disconnected.
    ///
    /// Bounds discovery traffic: a failed auto-connect is not retried before
    /// this interval elapses.
    pub reconnect_interval: Duration,

    /// How long a single discovery pass waits for host announcements.
    ///
    /// Discovery blocks the calling task for up to this duration.
    pub discovery_wait: Duration,

    /// Maximum time `stop()` waits for the driver task before detaching it.
    ///
    /// The driver does not interrupt an in-flight remote call, so teardown
    /// latency is bounded by this window rather than by the call itself.
    pub grace: Duration,

    /// Capacity of the stream FIFO feeding the foreground consumer.
    ///
    /// When full, new stream updates are dropped for the consumer (the latest
    /// landscape/ergonomics snapshots are still updated).
    pub stream_capacity: usize,

    /// Capacity of the lifecycle event bus ring buffer.
    ///
    /// Slow subscribers that lag behind more than this many events observe
    /// `Lagged` and skip older items.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the stream FIFO capacity clamped to a minimum of 1.
    #[inline]
    pub fn stream_capacity_clamped(&self) -> usize {
        self.stream_capacity.max(1)
    }

    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `poll_interval = 10ms`
    /// - `reconnect_interval = 10s`
    /// - `discovery_wait = 1s`
    /// - `grace = 5s`
    /// - `stream_capacity = 256`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            reconnect_interval: Duration::from_secs(10),
            discovery_wait: Duration::from_secs(1),
            grace: Duration::from_secs(5),
            stream_capacity: 256,
            bus_capacity: 1024,
        }
    }
}
