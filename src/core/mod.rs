//! The session core: state machine, pending queues, host discovery, the
//! background driver and the application-facing supervisor.

pub(crate) mod discovery;
pub(crate) mod driver;
pub(crate) mod queues;
pub(crate) mod state;
mod supervisor;

pub use queues::PendingQueue;
pub use state::ConnectionState;
pub use supervisor::{Supervisor, SupervisorBuilder};
