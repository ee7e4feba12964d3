//! Task lifecycle engine.
//!
//! Drives one task at a time from Pending through Running to a terminal
//! state. The executor runs as a background future; the engine multiplexes a
//! report ticker against the executor's single-shot completion signal and is
//! the only writer of the task's state and progress. The terminal report is
//! always sent after the last periodic one.

use crate::dispatcher::Dispatcher;
use crate::docker::ContainerDriver;
use crate::error::Result;
use crate::executor::TaskExecutor;
use crate::task::{Task, TaskState, Worker};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Owns the executor/reporter coordination for one task at a time.
pub struct LifecycleEngine {
    driver: Arc<dyn ContainerDriver>,
    dispatcher: Arc<dyn Dispatcher>,
    bin_path: PathBuf,
}

impl LifecycleEngine {
    pub fn new(
        driver: Arc<dyn ContainerDriver>,
        dispatcher: Arc<dyn Dispatcher>,
        bin_path: impl Into<PathBuf>,
    ) -> Self {
        Self { driver, dispatcher, bin_path: bin_path.into() }
    }

    /// Run `task` to a terminal state, reporting progress to the dispatcher
    /// every `report_interval` seconds along the way.
    ///
    /// Dispatcher unreachability never fails a task: report errors are
    /// logged and the state machine carries on.
    pub async fn run_task(&self, worker: &Worker, mut task: Task) -> Result<TaskState> {
        if task.report_interval <= 0 {
            warn!(
                task_id = task.id,
                interval = task.report_interval,
                "rejecting task with non-positive report interval"
            );
            task.state = TaskState::Failed;
            self.report(worker, &task).await;
            return Ok(TaskState::Failed);
        }

        info!(task_id = task.id, image = %task.image, "task accepted");
        task.state = TaskState::Running;

        let executor = Arc::new(TaskExecutor::new(self.driver.clone(), &self.bin_path));
        let (state_tx, mut state_rx) = oneshot::channel();
        let execution = tokio::spawn({
            let executor = executor.clone();
            let task = task.clone();
            async move { executor.execute(&task, state_tx).await }
        });

        let mut progress = task.progress_for(0);
        let mut ticker = interval(Duration::from_secs(task.report_interval as u64));
        // The first tick of an interval completes immediately; consume it so
        // reports start one period in.
        ticker.tick().await;

        let terminal = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match executor.track().await {
                        Ok(executed) => progress = task.progress_for(executed),
                        Err(e) => {
                            debug!(task_id = task.id, error = %e, "progress probe failed, keeping previous value");
                        }
                    }
                    task.progress = progress;
                    self.report(worker, &task).await;
                }
                state = &mut state_rx => {
                    // The executor sends exactly once; a dropped sender can
                    // only mean it died, which is a failure too.
                    break state.unwrap_or(TaskState::Failed);
                }
            }
        };

        task.state = terminal;
        task.progress = if terminal == TaskState::Finished { 100 } else { progress };
        self.report(worker, &task).await;

        let _ = execution.await;
        info!(task_id = task.id, state = %terminal, progress = task.progress, "task released");
        Ok(terminal)
    }

    async fn report(&self, worker: &Worker, task: &Task) {
        debug!(task_id = task.id, progress = task.progress, state = %task.state, "reporting task");
        if let Err(e) = self.dispatcher.report_task(worker, task).await {
            warn!(task_id = task.id, error = %e, "progress report failed");
        }
    }
}
