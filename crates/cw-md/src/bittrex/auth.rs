//! Bittrex hub authentication signing.
//!
//! The `Authenticate` invocation carries `(apiKey, timestamp, nonce,
//! signature)` where the signature is HMAC-SHA512 over `timestamp + nonce`,
//! hex encoded.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use uuid::Uuid;

use cw_core::error::CwError;
use cw_core::time_util;

type HmacSha512 = Hmac<Sha512>;

/// Compute an HMAC-SHA512 signature and return it as a lowercase hex string.
pub fn hmac_sha512_sign(secret: &str, message: &str) -> Result<String, CwError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).map_err(|e| CwError::Auth(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// A signed authentication challenge, ready to be sent as invoke arguments.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

impl AuthChallenge {
    /// Sign with the current wall-clock time and a fresh random nonce.
    pub fn sign(api_secret: &str) -> Result<Self, CwError> {
        Self::sign_at(api_secret, time_util::now_ms(), &Uuid::new_v4().to_string())
    }

    pub fn sign_at(api_secret: &str, timestamp_ms: u64, nonce: &str) -> Result<Self, CwError> {
        let timestamp = timestamp_ms.to_string();
        let signature = hmac_sha512_sign(api_secret, &format!("{timestamp}{nonce}"))?;
        Ok(Self { timestamp, nonce: nonce.to_string(), signature })
    }

    pub fn invoke_args(&self, api_key: &str) -> Vec<serde_json::Value> {
        vec![
            api_key.into(),
            self.timestamp.clone().into(),
            self.nonce.clone().into(),
            self.signature.clone().into(),
        ]
    }
}
