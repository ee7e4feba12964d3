//! Error types for credential operations

use thiserror::Error;

/// Result type for credential operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Credential error types
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("no key named '{0}' in the keystore")]
    KeyNotFound(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token expired")]
    TokenExpired,
}
