//! Ed25519 key pairs and detached signatures.
//!
//! The dispatcher identifies workers by their public key: registration
//! uploads it once, and every join request is signed with the matching
//! secret key. Keys travel base64-encoded on the wire.

use crate::error::{CryptoError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

/// Ed25519 public key (32 bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Build a public key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        VerifyingKey::from_bytes(&array)
            .map(|key| PublicKey { key })
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Build a public key from its base64 encoding.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.key.as_bytes())
    }

    /// Verify a detached signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.key
            .verify(message, &signature.to_dalek())
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey").field("bytes", &hex::encode(self.key.as_bytes())).finish()
    }
}

/// Ed25519 signature (64 bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: [u8; 64],
}

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 64] = bytes.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Signature { bytes })
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    fn to_dalek(&self) -> DalekSignature {
        DalekSignature::from_bytes(&self.bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature").field("bytes", &hex::encode(self.bytes)).finish()
    }
}

/// Ed25519 key pair (secret + public half).
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS random number generator.
    pub fn generate() -> Self {
        KeyPair { signing_key: SigningKey::generate(&mut OsRng) }
    }

    /// Restore a key pair from its 32 secret-key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSecretKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(KeyPair { signing_key: SigningKey::from_bytes(&array) })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey { key: self.signing_key.verifying_key() }
    }

    /// Sign a message, returning a detached signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature { bytes: self.signing_key.sign(message).to_bytes() }
    }

    /// Export the secret key bytes. The caller owns the sensitive material.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.signing_key.verifying_key().as_bytes()))
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
