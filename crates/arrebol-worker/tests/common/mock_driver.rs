//! Mock container driver.
//!
//! Runs no containers: behavior is scripted per test. The exit-code file is
//! fed as a sequence of read results so progress can be made to accumulate
//! tick by tick, and the task-script invocation blocks for a configurable
//! (tokio-virtual) duration before succeeding or failing.

use arrebol_worker::docker::{ContainerDriver, ContainerSpec};
use arrebol_worker::error::{Result, WorkerError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted behavior for one task execution.
pub struct MockBehavior {
    /// Whether `image_exists` reports the image as present.
    pub image_present: bool,
    /// Error injected into `pull_image`.
    pub pull_error: Option<String>,
    /// How long the task-script invocation blocks.
    pub run_duration: Duration,
    /// Error returned by the task-script invocation after `run_duration`.
    pub run_error: Option<String>,
    /// Successive `read_file` outcomes for the exit-code file; the last one
    /// repeats once exhausted.
    pub reads: Vec<std::result::Result<Vec<u8>, String>>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            image_present: true,
            pull_error: None,
            run_duration: Duration::ZERO,
            run_error: None,
            reads: Vec::new(),
        }
    }
}

impl MockBehavior {
    /// Exit-code file snapshots from strings, in read order.
    pub fn with_reads(mut self, reads: &[&str]) -> Self {
        self.reads = reads.iter().map(|s| Ok(s.as_bytes().to_vec())).collect();
        self
    }
}

pub struct MockContainerDriver {
    behavior: MockBehavior,
    read_cursor: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MockContainerDriver {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior, read_cursor: AtomicUsize::new(0), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl ContainerDriver for MockContainerDriver {
    async fn image_exists(&self, _image: &str) -> Result<bool> {
        self.record("image_exists");
        Ok(self.behavior.image_present)
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record("pull_image");
        match &self.behavior.pull_error {
            Some(e) => Err(WorkerError::Container(format!("pull of {image} failed: {e}"))),
            None => Ok(()),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.record("create_container");
        Ok(format!("cid-{}", spec.name))
    }

    async fn start_container(&self, _cid: &str) -> Result<()> {
        self.record("start_container");
        Ok(())
    }

    async fn stop_container(&self, _cid: &str) -> Result<()> {
        self.record("stop_container");
        Ok(())
    }

    async fn remove_container(&self, _cid: &str) -> Result<()> {
        self.record("remove_container");
        Ok(())
    }

    async fn copy_into(&self, _cid: &str, _host_path: &Path, _container_path: &str) -> Result<()> {
        self.record("copy_into");
        Ok(())
    }

    async fn write_file(&self, _cid: &str, _lines: &[String], _container_path: &str) -> Result<()> {
        self.record("write_file");
        Ok(())
    }

    async fn exec(&self, _cid: &str, shell_line: &str) -> Result<()> {
        if shell_line.starts_with("/bin/bash") {
            self.record("exec_task_script");
            tokio::time::sleep(self.behavior.run_duration).await;
            return match &self.behavior.run_error {
                Some(e) => Err(WorkerError::Container(e.clone())),
                None => Ok(()),
            };
        }
        self.record("exec");
        Ok(())
    }

    async fn read_file(&self, _cid: &str, _container_path: &str) -> Result<Vec<u8>> {
        self.record("read_file");
        if self.behavior.reads.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self.read_cursor.fetch_add(1, Ordering::SeqCst);
        let index = cursor.min(self.behavior.reads.len() - 1);
        match &self.behavior.reads[index] {
            Ok(bytes) => Ok(bytes.clone()),
            Err(e) => Err(WorkerError::Container(e.clone())),
        }
    }
}
