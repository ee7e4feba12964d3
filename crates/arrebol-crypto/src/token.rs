//! Signed worker tokens.
//!
//! The dispatcher answers a successful join with a compact token of the
//! form `base64url(header).base64url(claims).base64url(signature)`, signed
//! with its Ed25519 key. The worker verifies the signature with the
//! dispatcher's public key and reads its queue assignment from the claims;
//! the `QueueId` claim is the authoritative queue binding.

use crate::error::{CryptoError, Result};
use crate::signing::{KeyPair, PublicKey, Signature};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const TOKEN_ALG: &str = "EdDSA";
const TOKEN_TYP: &str = "JWT";

/// Claims carried by a worker token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Queue the worker is bound to.
    #[serde(rename = "QueueId")]
    pub queue_id: u64,
    /// Issued-at timestamp.
    pub iat: DateTime<Utc>,
    /// Expiration timestamp; tokens without one never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<DateTime<Utc>>,
}

impl TokenClaims {
    /// Claims binding a worker to `queue_id`, issued now.
    pub fn new(queue_id: u64) -> Self {
        Self { queue_id, iat: Utc::now(), exp: None }
    }

    /// Add an expiration `ttl` from the issue time.
    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.exp = Some(self.iat + ttl);
        self
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.exp, Some(exp) if Utc::now() >= exp)
    }
}

/// Token header identifying the signature algorithm.
#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// A signed worker token.
#[derive(Debug, Clone)]
pub struct WorkerToken {
    claims: TokenClaims,
    encoded: String,
}

impl WorkerToken {
    /// Sign `claims` into an encoded token. This is the issuing side of the
    /// protocol; workers only ever call [`WorkerToken::decode`].
    pub fn issue(claims: TokenClaims, keypair: &KeyPair) -> Result<Self> {
        let header = TokenHeader { alg: TOKEN_ALG.to_string(), typ: TOKEN_TYP.to_string() };
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);

        let signing_input = format!("{header_b64}.{claims_b64}");
        let sig_b64 = URL_SAFE_NO_PAD.encode(keypair.sign(signing_input.as_bytes()).as_bytes());

        Ok(Self { claims, encoded: format!("{signing_input}.{sig_b64}") })
    }

    /// Verify `token` against the issuer's public key and return its claims.
    ///
    /// Fails on structural problems, an unknown algorithm, a bad signature,
    /// or an expired token.
    pub fn decode(token: &str, issuer_key: &PublicKey) -> Result<TokenClaims> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, sig_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(c), Some(s), None) => (h, c, s),
            _ => return Err(CryptoError::MalformedToken("expected three dot-separated segments".to_string())),
        };

        let header: TokenHeader = serde_json::from_slice(&decode_segment(header_b64)?)?;
        if header.alg != TOKEN_ALG {
            return Err(CryptoError::MalformedToken(format!("unsupported algorithm '{}'", header.alg)));
        }

        let signature = Signature::from_bytes(&decode_segment(sig_b64)?)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        issuer_key.verify(signing_input.as_bytes(), &signature)?;

        let claims: TokenClaims = serde_json::from_slice(&decode_segment(claims_b64)?)?;
        if claims.is_expired() {
            return Err(CryptoError::TokenExpired);
        }
        Ok(claims)
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// The encoded token string.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(segment).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
}
