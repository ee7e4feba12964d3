//! Credential service for arrebol workers.
//!
//! Covers the three credential concerns of a worker node: an Ed25519 key
//! pair used to sign dispatcher-bound requests, a file-based keystore so
//! keys survive restarts, and the compact signed token the dispatcher
//! issues when a worker joins a queue.

pub mod error;
pub mod keystore;
pub mod signing;
pub mod token;

pub use error::{CryptoError, Result};
pub use keystore::Keystore;
pub use signing::{KeyPair, PublicKey, Signature};
pub use token::{TokenClaims, WorkerToken};
