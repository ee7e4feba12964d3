//! The worker agent loop.
//!
//! Strictly sequential: join when the token is missing or no longer
//! verifies, fetch one task, drive it through the lifecycle engine, repeat.
//! A new task is never requested while one is running. Fetch errors are
//! expected (an empty queue answers with one) and only slow the loop down;
//! join failures end the process.

use crate::config::WorkerConfig;
use crate::dispatcher::Dispatcher;
use crate::docker::ContainerDriver;
use crate::error::Result;
use crate::lifecycle::LifecycleEngine;
use crate::task::Worker;
use arrebol_crypto::{KeyPair, PublicKey, WorkerToken};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Long-running worker process: identity, credentials, and the loop.
pub struct WorkerAgent {
    worker: Worker,
    keypair: KeyPair,
    dispatcher_key: PublicKey,
    dispatcher: Arc<dyn Dispatcher>,
    engine: LifecycleEngine,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WorkerAgent {
    pub fn new(
        config: &WorkerConfig,
        keypair: KeyPair,
        dispatcher_key: PublicKey,
        dispatcher: Arc<dyn Dispatcher>,
        driver: Arc<dyn ContainerDriver>,
        bin_path: impl Into<PathBuf>,
    ) -> Self {
        let engine = LifecycleEngine::new(driver, dispatcher.clone(), bin_path);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            worker: Worker::from_config(config),
            keypair,
            dispatcher_key,
            dispatcher,
            engine,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Handle for requesting a clean stop; honored between tasks.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// One-time registration: upload the public key to the dispatcher.
    /// Anything but success is fatal for the process.
    pub async fn setup(&self) -> Result<()> {
        info!(worker_id = %self.worker.id, "registering public key with dispatcher");
        self.dispatcher.register_public_key(&self.keypair.public_key()).await
    }

    /// Run the agent loop until shutdown is requested.
    pub async fn run(mut self) -> Result<()> {
        info!(worker_id = %self.worker.id, "worker agent started");
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if !self.token_valid() {
                self.join().await?;
            }

            let fetched = tokio::select! {
                fetched = self.dispatcher.fetch_task(&self.worker) => fetched,
                _ = shutdown_rx.changed() => break,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    let _ = self.shutdown_tx.send(true);
                    break;
                }
            };

            match fetched {
                Ok(task) => {
                    debug!(task_id = task.id, "task fetched");
                    if let Err(e) = self.engine.run_task(&self.worker, task).await {
                        warn!(error = %e, "task lifecycle ended with an error");
                    }
                }
                Err(e) if e.is_recoverable() => {
                    debug!(error = %e, "no task this round");
                    tokio::time::sleep(Duration::from_secs(crate::defaults::FETCH_BACKOFF_SECS))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }

        info!(worker_id = %self.worker.id, "worker agent shut down");
        Ok(())
    }

    /// The token is usable when it decodes and verifies against the
    /// dispatcher's key and has not expired.
    fn token_valid(&self) -> bool {
        !self.worker.token.is_empty()
            && WorkerToken::decode(&self.worker.token, &self.dispatcher_key).is_ok()
    }

    async fn join(&mut self) -> Result<()> {
        info!(worker_id = %self.worker.id, "joining dispatcher");
        let outcome = self.dispatcher.join(&self.worker, &self.keypair).await?;
        self.worker.token = outcome.token;
        self.worker.queue_id = outcome.queue_id;
        info!(queue_id = self.worker.queue_id, "joined dispatcher queue");
        Ok(())
    }
}
