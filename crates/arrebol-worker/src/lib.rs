//! Arrebol Worker Library
//!
//! A node agent for the arrebol job-execution platform: it registers with a
//! central dispatcher, pulls one task at a time from its assigned queue,
//! runs the task's commands inside a freshly provisioned container, and
//! reports progress until the task finishes or fails.

pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod docker;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod task;

// Re-export main types
pub use agent::WorkerAgent;
pub use config::{Settings, WorkerConfig};
pub use dispatcher::{Dispatcher, HttpDispatcher, JoinOutcome};
pub use docker::{ContainerDriver, DockerDriver};
pub use error::{Result, WorkerError};
pub use executor::TaskExecutor;
pub use lifecycle::LifecycleEngine;
pub use task::{Task, TaskState, Worker};

/// Worker version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Timeout applied to every dispatcher request, in seconds
    pub const HTTP_TIMEOUT_SECS: u64 = 30;

    /// Pause between fetch attempts when the queue has nothing for us
    pub const FETCH_BACKOFF_SECS: u64 = 1;

    /// Keystore directory used when KEYS_PATH is not set
    pub const KEYS_PATH: &str = "./keys";

    /// Keystore entry holding the dispatcher's verification key
    pub const DISPATCHER_KEY_NAME: &str = "dispatcher";
}
