//! Error types module
//!
//! All engine failures are unified under the [`UploadError`] enum. Each
//! variant maps to one of the stable wire codes surfaced to callers, so a
//! session's terminal error can be matched programmatically regardless of
//! which component produced it.

use std::io;

/// Stable wire code: the file to upload does not exist.
pub const CODE_FILE_MISSING: u16 = 1000;
/// Stable wire code: the file size exceeds the configured limit.
pub const CODE_SIZE_EXCEEDED: u16 = 1001;
/// Stable wire code: the file extension is not permitted.
pub const CODE_EXTENSION_REJECTED: u16 = 1002;
/// Stable wire code: network failure (transport errors, unreadable input,
/// and malformed server responses all surface here).
pub const CODE_NETWORK: u16 = 1003;
/// Stable wire code: the storage service rejected the content.
pub const CODE_REMOTE_VERIFICATION: u16 = 1004;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File does not exist")]
    FileMissing,

    #[error("File size {size} exceeds limit of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("File extension not permitted: {0}")]
    ExtensionRejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote content verification failed: {0}")]
    RemoteVerification(String),

    #[error("Authorization rejected with code {code}: {message}")]
    Authorization { code: u16, message: String },

    #[error("Malformed server response: {0}")]
    MalformedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl UploadError {
    /// Stable code reported through the session's failure event.
    ///
    /// Authorization failures pass the signing endpoint's application code
    /// through unchanged; everything else maps onto the 1000-series table.
    pub fn error_code(&self) -> u16 {
        match self {
            UploadError::FileMissing => CODE_FILE_MISSING,
            UploadError::SizeExceeded { .. } => CODE_SIZE_EXCEEDED,
            UploadError::ExtensionRejected(_) => CODE_EXTENSION_REJECTED,
            UploadError::Network(_) | UploadError::MalformedResponse(_) | UploadError::Io(_) => {
                CODE_NETWORK
            }
            UploadError::RemoteVerification(_) => CODE_REMOTE_VERIFICATION,
            UploadError::Authorization { code, .. } => *code,
        }
    }

    /// Whether reconstructing a session may succeed (the designed mitigation
    /// for transient failures; resume state is kept on failure).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            UploadError::Network(_) | UploadError::Io(_) | UploadError::RemoteVerification(_)
        )
    }

    /// Client-facing message for the failure event.
    pub fn client_message(&self) -> String {
        match self {
            UploadError::Authorization { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}
