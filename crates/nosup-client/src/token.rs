//! NOS upload token construction.
//!
//! Policy: `base64(json {Bucket, Object, Expires})`.
//! Signature: `base64(HMAC-SHA256(policy, access_secret))`.
//! Token: `UPLOAD {access_key}:{signature}:{policy}`.
//!
//! Deployments normally obtain tokens from a signing endpoint (see
//! [`crate::sign::SigningClient`]); this module covers the case where the
//! caller holds its own access keys, and backs the signing tests.

use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

const TOKEN_PREFIX: &str = "UPLOAD ";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token is not in UPLOAD ak:sign:policy form")]
    Malformed,

    #[error("Token signature does not verify")]
    BadSignature,

    #[error("Token policy is not valid JSON: {0}")]
    BadPolicy(#[from] serde_json::Error),
}

/// The signed upload policy carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Object")]
    pub object: String,
    /// Unix timestamp after which the token is no longer accepted.
    #[serde(rename = "Expires")]
    pub expires: u64,
}

/// Build an `x-nos-token` value for the given policy.
pub fn create_upload_token(access_key: &str, access_secret: &[u8], policy: &UploadPolicy) -> String {
    let policy_json = serde_json::to_string(policy).expect("policy serializes to JSON");
    let encoded_policy = base64::engine::general_purpose::STANDARD.encode(policy_json);

    let mut mac =
        Hmac::<Sha256>::new_from_slice(access_secret).expect("HMAC accepts any key size");
    mac.update(encoded_policy.as_bytes());
    let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    format!("{TOKEN_PREFIX}{access_key}:{signature}:{encoded_policy}")
}

/// Verify a token against the secret and return its access key and policy.
pub fn verify_upload_token(
    token: &str,
    access_secret: &[u8],
) -> Result<(String, UploadPolicy), TokenError> {
    let rest = token.strip_prefix(TOKEN_PREFIX).ok_or(TokenError::Malformed)?;
    let mut parts = rest.splitn(3, ':');
    let access_key = parts.next().ok_or(TokenError::Malformed)?;
    let signature = parts.next().ok_or(TokenError::Malformed)?;
    let encoded_policy = parts.next().ok_or(TokenError::Malformed)?;

    let mut mac =
        Hmac::<Sha256>::new_from_slice(access_secret).expect("HMAC accepts any key size");
    mac.update(encoded_policy.as_bytes());
    let expected = base64::engine::general_purpose::STANDARD
        .decode(signature)
        .map_err(|_| TokenError::Malformed)?;
    mac.verify_slice(&expected)
        .map_err(|_| TokenError::BadSignature)?;

    let policy_json = base64::engine::general_purpose::STANDARD
        .decode(encoded_policy)
        .map_err(|_| TokenError::Malformed)?;
    let policy: UploadPolicy = serde_json::from_slice(&policy_json)?;
    Ok((access_key.to_string(), policy))
}
