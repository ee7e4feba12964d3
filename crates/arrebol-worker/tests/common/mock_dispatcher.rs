//! Recording dispatcher.
//!
//! Issues real signed tokens so the agent's token validation runs for real,
//! records every report in arrival order, and serves a scripted queue of
//! tasks.

use arrebol_crypto::{KeyPair, PublicKey, TokenClaims, WorkerToken};
use arrebol_worker::dispatcher::{Dispatcher, JoinOutcome};
use arrebol_worker::error::{Result, WorkerError};
use arrebol_worker::task::{Task, Worker};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct MockDispatcher {
    issuer: KeyPair,
    queue_id: u64,
    register_error: bool,
    join_error: bool,
    tasks: Mutex<VecDeque<Task>>,
    reports: Mutex<Vec<Task>>,
    fetch_snapshots: Mutex<Vec<Worker>>,
    register_calls: AtomicUsize,
    join_calls: AtomicUsize,
}

impl MockDispatcher {
    pub fn new(queue_id: u64) -> Self {
        Self {
            issuer: KeyPair::generate(),
            queue_id,
            register_error: false,
            join_error: false,
            tasks: Mutex::new(VecDeque::new()),
            reports: Mutex::new(Vec::new()),
            fetch_snapshots: Mutex::new(Vec::new()),
            register_calls: AtomicUsize::new(0),
            join_calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting_registration(mut self) -> Self {
        self.register_error = true;
        self
    }

    pub fn rejecting_join(mut self) -> Self {
        self.join_error = true;
        self
    }

    /// Queue a task for `fetch_task` to hand out.
    pub fn enqueue(&self, task: Task) {
        self.tasks.lock().unwrap().push_back(task);
    }

    /// The key the agent should verify tokens against.
    pub fn issuer_public_key(&self) -> PublicKey {
        self.issuer.public_key()
    }

    /// Reports received so far, in arrival order.
    pub fn reports(&self) -> Vec<Task> {
        self.reports.lock().unwrap().clone()
    }

    /// Worker records as seen by `fetch_task`, in call order.
    pub fn fetch_snapshots(&self) -> Vec<Worker> {
        self.fetch_snapshots.lock().unwrap().clone()
    }

    /// Tasks still waiting to be handed out.
    pub fn queued(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn join_calls(&self) -> usize {
        self.join_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn register_public_key(&self, _key: &PublicKey) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.register_error {
            return Err(WorkerError::Dispatcher("public key upload rejected with status 500".to_string()));
        }
        Ok(())
    }

    async fn join(&self, _worker: &Worker, _keypair: &KeyPair) -> Result<JoinOutcome> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        if self.join_error {
            return Err(WorkerError::JoinProtocol("token missing from join response".to_string()));
        }
        let token = WorkerToken::issue(TokenClaims::new(self.queue_id), &self.issuer)
            .map_err(WorkerError::Credential)?;
        Ok(JoinOutcome { token: token.as_str().to_string(), queue_id: self.queue_id })
    }

    async fn fetch_task(&self, worker: &Worker) -> Result<Task> {
        self.fetch_snapshots.lock().unwrap().push(worker.clone());
        match self.tasks.lock().unwrap().pop_front() {
            Some(task) => Ok(task),
            None => Err(WorkerError::Dispatcher("queue is empty".to_string())),
        }
    }

    async fn report_task(&self, _worker: &Worker, task: &Task) -> Result<()> {
        self.reports.lock().unwrap().push(task.clone());
        Ok(())
    }
}
