//! Task execution inside a container.
//!
//! One [`TaskExecutor`] owns one container for the life of one task. The
//! sequence is: provision the container (pull the image if needed, create,
//! start, stage the helper script), write the task's commands to a file
//! inside it, then invoke the in-container script that runs them. The script
//! appends each command's exit code to a side file, which [`TaskExecutor::track`]
//! reads concurrently to measure progress without interrupting execution.

use crate::docker::{ContainerDriver, ContainerSpec};
use crate::error::{Result, WorkerError};
use crate::task::{Task, TaskState};
use chrono::{Timelike, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};

/// Helper script staged into every task container.
pub const TASK_SCRIPT_EXECUTOR: &str = "task-script-executor.sh";
/// Working directory inside the container.
const WORK_DIR: &str = "/arrebol";
/// File the task's commands are written to, one per line.
const TASK_SCRIPT_FILE: &str = "task-id.ts";
/// File the in-container script appends exit codes to, CRLF-separated.
const EXIT_CODE_FILE: &str = "task-id.ts.ec";

/// Container owned by the executor for the current task.
struct ContainerSession {
    cid: String,
    name: String,
}

/// Runs one task in one container and emits exactly one terminal state.
pub struct TaskExecutor {
    driver: Arc<dyn ContainerDriver>,
    bin_path: PathBuf,
    session: RwLock<Option<ContainerSession>>,
}

impl TaskExecutor {
    pub fn new(driver: Arc<dyn ContainerDriver>, bin_path: impl Into<PathBuf>) -> Self {
        Self { driver, bin_path: bin_path.into(), session: RwLock::new(None) }
    }

    /// Run `task` to completion and send the terminal state on `state_tx`.
    ///
    /// Every failure path resolves to `Failed`; the sender fires exactly
    /// once either way. The container is torn down best-effort before the
    /// state is emitted.
    pub async fn execute(&self, task: &Task, state_tx: oneshot::Sender<TaskState>) {
        let state = self.run_to_completion(task).await;
        self.teardown().await;
        if state_tx.send(state).is_err() {
            warn!(task_id = task.id, "terminal state receiver dropped before completion");
        }
    }

    /// Count how many commands have completed so far.
    ///
    /// Touches the exit-code file first so the read cannot race the script's
    /// first append, then counts the parseable entries. Errors mean "no new
    /// information"; the caller keeps its previous progress value and probes
    /// again on the next tick. Safe to call before the container exists.
    pub async fn track(&self) -> Result<usize> {
        let cid = self.cid().await?;

        let ec_path = format!("{WORK_DIR}/{EXIT_CODE_FILE}");
        if let Err(e) = self.driver.exec(&cid, &format!("touch {ec_path}")).await {
            debug!(error = %e, "exit-code file touch failed");
        }

        let data = self.driver.read_file(&cid, &ec_path).await?;
        Ok(parse_exit_codes(&data).len())
    }

    async fn run_to_completion(&self, task: &Task) -> TaskState {
        if let Err(e) = self.init(task).await {
            warn!(task_id = task.id, error = %e, "container provisioning failed");
            return TaskState::Failed;
        }
        if let Err(e) = self.send_commands(task).await {
            warn!(task_id = task.id, error = %e, "staging task commands failed");
            return TaskState::Failed;
        }
        if let Err(e) = self.run_script(task).await {
            warn!(task_id = task.id, error = %e, "task execution failed");
            return TaskState::Failed;
        }
        TaskState::Finished
    }

    /// Provision the task container: image, container, work dir, helper
    /// script.
    async fn init(&self, task: &Task) -> Result<()> {
        if !self.driver.image_exists(&task.image).await? {
            self.driver.pull_image(&task.image).await?;
        }

        let name = format!("{}-{}", task.id, Utc::now().second());
        info!(task_id = task.id, image = %task.image, container = %name, "creating task container");
        let spec = ContainerSpec { name: name.clone(), image: task.image.clone(), binds: Vec::new() };
        let cid = self.driver.create_container(&spec).await?;
        // Session is recorded before start so a failed start still tears
        // the container down.
        *self.session.write().await = Some(ContainerSession { cid: cid.clone(), name });

        self.driver.start_container(&cid).await?;
        self.driver.exec(&cid, &format!("mkdir {WORK_DIR}")).await?;

        let script = self.bin_path.join(TASK_SCRIPT_EXECUTOR);
        self.driver
            .copy_into(&cid, &script, &format!("{WORK_DIR}/{TASK_SCRIPT_EXECUTOR}"))
            .await?;
        Ok(())
    }

    /// Stage the task's commands, one raw command per line.
    async fn send_commands(&self, task: &Task) -> Result<()> {
        let cid = self.cid().await?;
        self.driver
            .write_file(&cid, &task.commands, &format!("{WORK_DIR}/{TASK_SCRIPT_FILE}"))
            .await
    }

    /// Invoke the in-container script and block until it returns.
    async fn run_script(&self, task: &Task) -> Result<()> {
        let cid = self.cid().await?;
        debug!(task_id = task.id, "running task script");
        let command = format!(
            "/bin/bash {WORK_DIR}/{TASK_SCRIPT_EXECUTOR} -d -tsf={WORK_DIR}/{TASK_SCRIPT_FILE}"
        );
        self.driver.exec(&cid, &command).await
    }

    /// Best-effort stop and remove; failures are logged, never propagated.
    async fn teardown(&self) {
        let session = self.session.write().await.take();
        if let Some(session) = session {
            if let Err(e) = self.driver.stop_container(&session.cid).await {
                warn!(container = %session.name, error = %e, "container stop failed");
            }
            if let Err(e) = self.driver.remove_container(&session.cid).await {
                warn!(container = %session.name, error = %e, "container remove failed");
            }
        }
    }

    async fn cid(&self) -> Result<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.cid.clone())
            .ok_or_else(|| WorkerError::Container("no active container session".to_string()))
    }
}

/// Parse the exit-code side file.
///
/// The in-container script appends `<code>\r\n` per finished command, so the
/// file may end mid-line and carry stray bytes at either end. Non-digit
/// bytes are trimmed from both ends and fragments that do not parse as
/// integers are skipped.
pub(crate) fn parse_exit_codes(data: &[u8]) -> Vec<i8> {
    let is_digit = |b: &u8| b.is_ascii_digit() || *b == b'-';
    let start = match data.iter().position(is_digit) {
        Some(i) => i,
        None => return Vec::new(),
    };
    let end = data.iter().rposition(is_digit).map(|i| i + 1).unwrap_or(data.len());

    String::from_utf8_lossy(&data[start..end])
        .split("\r\n")
        .filter_map(|line| line.trim().parse::<i64>().ok().map(|code| code as i8))
        .collect()
}
