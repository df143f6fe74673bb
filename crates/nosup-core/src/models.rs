//! Domain and wire models for the upload engine.
//!
//! Wire types mirror the storage protocol exactly; two fields need lenient
//! deserialization because the live services are loose about JSON types:
//! `directUpload` arrives as either a bool or the strings `"true"`/`"false"`,
//! and chunk-ack `context` may be a string, a number, or null.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Immutable description of the file being uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
}

impl FileDescriptor {
    /// File extension (text after the last dot), `None` when the name has no
    /// dot or nothing follows it.
    pub fn extension(&self) -> Option<&str> {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }
}

/// Session lifecycle states. Terminal states accept no further operations;
/// retrying means constructing a new session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Waiting,
    Validating,
    Hashing,
    Authorizing,
    Transferring,
    Completed,
    Failed,
    Aborted,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Failed | UploadStatus::Aborted
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Waiting => "waiting",
            UploadStatus::Validating => "validating",
            UploadStatus::Hashing => "hashing",
            UploadStatus::Authorizing => "authorizing",
            UploadStatus::Transferring => "transferring",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
            UploadStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Lowercase hex digest of a file's byte content; the resume-state key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted resume bookkeeping for one content digest.
///
/// Only ever a hint: the server's offset probe decides where the transfer
/// actually resumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumeRecord {
    /// Opaque server-issued context identifying the partial upload.
    pub context: String,
    /// Remote object name the partial upload was addressed to.
    pub object_name: String,
}

/// Request body for the signing endpoint.
#[derive(Debug, Serialize)]
pub struct SignRequest {
    #[serde(rename = "uploadType")]
    pub upload_type: String,
    /// Remote object name from a resume hint, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(rename = "originName")]
    pub origin_name: String,
}

/// Signing endpoint response envelope; `code == 200` is the only success.
#[derive(Debug, Deserialize)]
pub struct SignEnvelope {
    pub code: u16,
    #[serde(default)]
    pub result: Option<AuthGrant>,
    #[serde(default)]
    pub msg: Option<String>,
}

/// Successful authorization: token, target bucket and object, and the
/// content-addressed short-circuit flag.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthGrant {
    pub token: String,
    pub bucket: String,
    pub object: String,
    /// True when the server already holds this content; no bytes need be sent.
    #[serde(rename = "directUpload", default, deserialize_with = "loose_bool")]
    pub direct_upload: bool,
}

/// Offset-probe response; 0 means the server has no record of the upload.
#[derive(Debug, Deserialize)]
pub struct OffsetProbe {
    pub offset: u64,
}

/// Chunk upload acknowledgment. `offset` is the authoritative count of bytes
/// the server has durably accepted.
#[derive(Debug, Deserialize)]
pub struct ChunkAck {
    pub offset: u64,
    #[serde(default, deserialize_with = "loose_context")]
    pub context: Option<String>,
}

fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn loose_context<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) if s.is_empty() => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(_) => None,
    })
}
