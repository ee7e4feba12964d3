//! Shared fixtures for integration tests.

pub mod mock_dispatcher;
pub mod mock_driver;

use arrebol_worker::config::WorkerConfig;
use arrebol_worker::task::{Task, TaskState, Worker};
use uuid::Uuid;

/// A task with the given commands, reporting every second.
pub fn test_task(id: u64, commands: &[&str]) -> Task {
    Task {
        id,
        image: "library/ubuntu:latest".to_string(),
        commands: commands.iter().map(|s| s.to_string()).collect(),
        report_interval: 1,
        state: TaskState::Pending,
        progress: 0,
    }
}

/// A worker already bound to a queue with a placeholder token.
pub fn test_worker() -> Worker {
    let mut worker = Worker::from_config(&test_config());
    worker.queue_id = 1;
    worker.token = "test-token".to_string();
    worker
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        id: Uuid::new_v4(),
        vcpu: 1.0,
        ram_mb: 1024,
        queue_id: 0,
    }
}
