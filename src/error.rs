//! Error types used by the session runtime and the remote service boundary.
//!
//! This module defines two main error enums:
//!
//! - [`ServiceError`] — failures reported by (or detected at) the remote
//!   motion-capture service boundary.
//! - [`SessionError`] — failures raised by the session runtime itself.
//!
//! Both types provide helper methods (`as_label`) for logging, and
//! [`ServiceError::is_retryable`] classifies which remote failures are worth
//! re-queueing work for.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced at the remote service boundary.
///
/// Expected remote failures never panic; every fallible call surfaces one of
/// these and the caller decides whether to re-queue, clear-and-retry, or drop.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// An operation was attempted while no live connection exists.
    ///
    /// Short-circuited locally where detectable, without touching the remote
    /// side.
    #[error("not connected to the service")]
    NotConnected,

    /// A remote call failed but is expected to resolve on retry
    /// (e.g. a build step raced a dropped link).
    #[error("transient service failure: {reason}")]
    Transient {
        /// What the remote side reported.
        reason: String,
    },

    /// A remote resource table is full (e.g. too many temporary setups).
    ///
    /// Distinguished so the caller can clear-all-and-retry instead of blindly
    /// retrying into the same full table.
    #[error("service capacity exhausted")]
    Capacity,

    /// Malformed local data (e.g. a node referencing an unknown parent while
    /// reconstructing a remote setup). Never retried automatically.
    #[error("structural error: {reason}")]
    Structural {
        /// Description of the inconsistency.
        reason: String,
    },

    /// A custom tracker id that is already registered. Rejected synchronously.
    #[error("duplicate tracker id: {id}")]
    Duplicate {
        /// The offending id.
        id: String,
    },
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::NotConnected => "service_not_connected",
            ServiceError::Transient { .. } => "service_transient",
            ServiceError::Capacity => "service_capacity",
            ServiceError::Structural { .. } => "service_structural",
            ServiceError::Duplicate { .. } => "service_duplicate",
        }
    }

    /// Indicates whether re-queueing the failed work is worthwhile.
    ///
    /// Returns `true` for [`ServiceError::Transient`] and
    /// [`ServiceError::NotConnected`] — both are expected to resolve once the
    /// link recovers. `Capacity` is *not* retryable as-is: the caller must
    /// free the remote table first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Transient { .. } | ServiceError::NotConnected
        )
    }

    /// Convenience constructor for transient failures.
    pub fn transient(reason: impl Into<String>) -> Self {
        ServiceError::Transient {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for structural failures.
    pub fn structural(reason: impl Into<String>) -> Self {
        ServiceError::Structural {
            reason: reason.into(),
        }
    }
}

/// # Errors produced by the session runtime itself.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SessionError {
    /// The driver task is not running while an operation required it.
    #[error("driver is not running")]
    DriverStopped,

    /// Shutdown grace period was exceeded; the driver task was detached.
    #[error("shutdown grace {grace:?} exceeded; driver detached")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
    },

    /// The settings file could not be parsed.
    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// File I/O failed (settings persistence, skeleton export/import).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A service-boundary failure bubbled through a runtime operation.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl SessionError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SessionError::DriverStopped => "session_driver_stopped",
            SessionError::GraceExceeded { .. } => "session_grace_exceeded",
            SessionError::Settings(_) => "session_settings",
            SessionError::Io(_) => "session_io",
            SessionError::Service(e) => e.as_label(),
        }
    }
}
