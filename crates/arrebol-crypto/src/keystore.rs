//! File-based key persistence.
//!
//! Each named key pair lives as two files under the keystore directory:
//! `<name>.key` holds the base64 secret key, `<name>.pub` the base64 public
//! key. Workers keep their own pair under their agent id; the dispatcher's
//! verification key is provisioned as a `.pub` file with no secret half.

use crate::error::{CryptoError, Result};
use crate::signing::{KeyPair, PublicKey};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory of named key files.
#[derive(Debug, Clone)]
pub struct Keystore {
    dir: PathBuf,
}

impl Keystore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the key pair named `name`, generating and persisting a fresh one
    /// if none exists yet.
    pub fn ensure_keypair(&self, name: &str) -> Result<KeyPair> {
        if self.secret_path(name).exists() {
            return self.load_keypair(name);
        }
        let keypair = KeyPair::generate();
        self.save_keypair(name, &keypair)?;
        Ok(keypair)
    }

    /// Load an existing key pair from its secret-key file.
    pub fn load_keypair(&self, name: &str) -> Result<KeyPair> {
        let path = self.secret_path(name);
        if !path.exists() {
            return Err(CryptoError::KeyNotFound(name.to_string()));
        }
        let encoded = fs::read_to_string(&path)?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        KeyPair::from_bytes(&bytes)
    }

    /// Load a public key only. Used for keys whose secret half belongs to
    /// someone else, such as the dispatcher's verification key.
    pub fn load_public_key(&self, name: &str) -> Result<PublicKey> {
        let path = self.public_path(name);
        if !path.exists() {
            return Err(CryptoError::KeyNotFound(name.to_string()));
        }
        let encoded = fs::read_to_string(&path)?;
        PublicKey::from_base64(&encoded)
    }

    /// Persist a foreign public key under `name`.
    pub fn save_public_key(&self, name: &str, key: &PublicKey) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.public_path(name), key.to_base64())?;
        Ok(())
    }

    fn save_keypair(&self, name: &str, keypair: &KeyPair) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.secret_path(name), STANDARD.encode(keypair.to_bytes()))?;
        fs::write(self.public_path(name), keypair.public_key().to_base64())?;
        Ok(())
    }

    fn secret_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.key"))
    }

    fn public_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.pub"))
    }
}
