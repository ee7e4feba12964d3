//! Dispatcher client.
//!
//! Two authentication mechanisms, used at different times: registration and
//! join carry an Ed25519-signed body plus a `Public-Key` header, while every
//! call after a successful join carries the bearer token the dispatcher
//! issued. The queue assignment is read from the verified token's `QueueId`
//! claim, not from the response body.

use crate::error::{Result, WorkerError};
use crate::task::{Task, Worker};
use arrebol_crypto::{KeyPair, PublicKey, WorkerToken};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Header carrying the bearer token after join.
pub const TOKEN_HEADER: &str = "arrebol-worker-token";
/// Header carrying the worker's base64 public key on signed requests.
pub const PUBLIC_KEY_HEADER: &str = "Public-Key";

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// The issued bearer token, verbatim.
    pub token: String,
    /// Queue assignment from the token's `QueueId` claim.
    pub queue_id: u64,
}

/// The calls the agent makes against the dispatcher.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Upload the worker's public key. Required once at startup; anything
    /// but 201 is fatal.
    async fn register_public_key(&self, key: &PublicKey) -> Result<()>;

    /// Join the dispatcher: signed worker record in, bearer token out.
    async fn join(&self, worker: &Worker, keypair: &KeyPair) -> Result<JoinOutcome>;

    /// Ask the assigned queue for a task.
    async fn fetch_task(&self, worker: &Worker) -> Result<Task>;

    /// Report the task's current state and progress.
    async fn report_task(&self, worker: &Worker, task: &Task) -> Result<()>;
}

/// HTTP implementation of [`Dispatcher`].
pub struct HttpDispatcher {
    base_url: String,
    client: reqwest::Client,
    dispatcher_key: PublicKey,
}

impl HttpDispatcher {
    /// Client for the dispatcher at `base_url`, verifying issued tokens
    /// against `dispatcher_key`.
    pub fn new(base_url: impl Into<String>, dispatcher_key: PublicKey) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(crate::defaults::HTTP_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");
        Self { base_url: base_url.into(), client, dispatcher_key }
    }

    fn tasks_url(&self, worker: &Worker) -> String {
        format!("{}/workers/{}/queues/{}/tasks", self.base_url, worker.id, worker.queue_id)
    }

    /// Turn a join response into an outcome. Split out so the token-missing
    /// and bad-claim paths are testable without a live server.
    fn parse_join_response(
        status: u16,
        body: &[u8],
        dispatcher_key: &PublicKey,
    ) -> Result<JoinOutcome> {
        if status != 201 {
            return Err(WorkerError::JoinProtocol(format!("join failed with status {status}")));
        }

        let response: JoinResponse = serde_json::from_slice(body)
            .map_err(|e| WorkerError::JoinProtocol(format!("unreadable join response: {e}")))?;
        let token = response
            .token
            .ok_or_else(|| WorkerError::JoinProtocol("token missing from join response".to_string()))?;

        let claims = WorkerToken::decode(&token, dispatcher_key)
            .map_err(|e| WorkerError::InvalidToken(e.to_string()))?;

        Ok(JoinOutcome { token, queue_id: claims.queue_id })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn register_public_key(&self, key: &PublicKey) -> Result<()> {
        let url = format!("{}/workers/publicKey", self.base_url);
        let response =
            self.client.post(&url).json(&PublicKeyUpload { key: key.to_base64() }).send().await?;

        if response.status().as_u16() != 201 {
            return Err(WorkerError::Dispatcher(format!(
                "public key upload rejected with status {}",
                response.status()
            )));
        }
        debug!("public key registered with dispatcher");
        Ok(())
    }

    async fn join(&self, worker: &Worker, keypair: &KeyPair) -> Result<JoinOutcome> {
        let url = format!("{}/workers", self.base_url);
        let payload = serde_json::to_vec(worker)?;
        let envelope = SignedEnvelope::seal(&payload, keypair);

        let response = self
            .client
            .post(&url)
            .header(PUBLIC_KEY_HEADER, keypair.public_key().to_base64())
            .json(&envelope)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Self::parse_join_response(status, &body, &self.dispatcher_key)
    }

    async fn fetch_task(&self, worker: &Worker) -> Result<Task> {
        if !worker.can_fetch() {
            return Err(WorkerError::Dispatcher(
                "queue and token must be assigned before fetching tasks".to_string(),
            ));
        }

        let response = self
            .client
            .get(self.tasks_url(worker))
            .header(TOKEN_HEADER, &worker.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WorkerError::Dispatcher(format!(
                "task fetch failed with status {}",
                response.status()
            )));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| WorkerError::TaskParse(e.to_string()))
    }

    async fn report_task(&self, worker: &Worker, task: &Task) -> Result<()> {
        let response = self
            .client
            .put(self.tasks_url(worker))
            .header(TOKEN_HEADER, &worker.token)
            .json(task)
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            return Err(WorkerError::Dispatcher(format!(
                "report rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Signed request body: the payload bytes and their signature, both base64.
#[derive(Debug, Serialize, Deserialize)]
struct SignedEnvelope {
    data: String,
    #[serde(rename = "hashSum")]
    hash_sum: String,
}

impl SignedEnvelope {
    fn seal(payload: &[u8], keypair: &KeyPair) -> Self {
        let signature = keypair.sign(payload);
        Self { data: STANDARD.encode(payload), hash_sum: signature.to_base64() }
    }
}

#[derive(Debug, Serialize)]
struct PublicKeyUpload {
    key: String,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    #[serde(rename = "arrebol-worker-token")]
    token: Option<String>,
}
