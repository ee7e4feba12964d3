//! Error types for the worker agent

use thiserror::Error;

/// Result type for worker operations
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Worker error types
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("credential error: {0}")]
    Credential(#[from] arrebol_crypto::CryptoError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dispatcher error: {0}")]
    Dispatcher(String),

    #[error("join rejected: {0}")]
    JoinProtocol(String),

    #[error("invalid worker token: {0}")]
    InvalidToken(String),

    #[error("container error: {0}")]
    Container(String),

    #[error("docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    #[error("malformed task: {0}")]
    TaskParse(String),
}

impl WorkerError {
    /// Whether the agent loop may carry on after this error. Startup,
    /// credential, and join failures are fatal; everything the dispatcher
    /// or container runtime throws at a running agent is not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WorkerError::Network(_)
                | WorkerError::Dispatcher(_)
                | WorkerError::TaskParse(_)
                | WorkerError::Container(_)
                | WorkerError::DockerApi(_)
        )
    }
}
