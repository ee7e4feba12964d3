//! Task and worker records exchanged with the dispatcher.

use crate::config::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a task. Serialized as its integer discriminant on the
/// wire. States only move forward: Pending, Running, then one of the two
/// terminal states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Finished,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed)
    }
}

impl From<TaskState> for u8 {
    fn from(state: TaskState) -> u8 {
        match state {
            TaskState::Pending => 0,
            TaskState::Running => 1,
            TaskState::Finished => 2,
            TaskState::Failed => 3,
        }
    }
}

impl TryFrom<u8> for TaskState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TaskState::Pending),
            1 => Ok(TaskState::Running),
            2 => Ok(TaskState::Finished),
            3 => Ok(TaskState::Failed),
            other => Err(format!("unknown task state {other}")),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "Pending",
            TaskState::Running => "Running",
            TaskState::Finished => "Finished",
            TaskState::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

/// One unit of work: an ordered command list run inside a container image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "Id")]
    pub id: u64,
    /// Container image reference, e.g. `library/ubuntu:latest`.
    #[serde(rename = "DockerImage")]
    pub image: String,
    /// Shell commands, executed in order by the in-container script.
    #[serde(rename = "Commands")]
    pub commands: Vec<String>,
    /// Seconds between progress reports.
    #[serde(rename = "ReportInterval")]
    pub report_interval: i64,
    #[serde(rename = "State", default)]
    pub state: TaskState,
    /// Completion indicator, 0 to 100.
    #[serde(rename = "Progress", default)]
    pub progress: u8,
}

impl Task {
    /// Progress value for `executed` completed commands, clamped to 100.
    /// A task with no commands is complete by definition.
    pub fn progress_for(&self, executed: usize) -> u8 {
        if self.commands.is_empty() {
            return 100;
        }
        (executed * 100 / self.commands.len()).min(100) as u8
    }
}

/// The worker's identity as the dispatcher sees it. Serialized as the join
/// request body; the token and queue are filled in by a successful join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    #[serde(rename = "Id")]
    pub id: Uuid,
    #[serde(rename = "Vcpu")]
    pub vcpu: f32,
    #[serde(rename = "Ram")]
    pub ram_mb: u32,
    #[serde(rename = "QueueId")]
    pub queue_id: u64,
    #[serde(rename = "Token")]
    pub token: String,
}

impl Worker {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            id: config.id,
            vcpu: config.vcpu,
            ram_mb: config.ram_mb,
            queue_id: config.queue_id,
            token: String::new(),
        }
    }

    /// A task may only be requested once a queue and token are assigned.
    pub fn can_fetch(&self) -> bool {
        self.queue_id != 0 && !self.token.is_empty()
    }
}
