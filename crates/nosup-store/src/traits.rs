//! Resume store abstraction trait

use async_trait::async_trait;
use nosup_core::models::{ContentDigest, ResumeRecord};
use thiserror::Error;

/// Resume store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid store key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value persistence for resume bookkeeping, keyed by content digest.
///
/// Pure overwrite semantics: `save` replaces any existing record, `clear` is
/// idempotent. A record being present says nothing about whether the server
/// still accepts it; that is discovered through the offset probe.
#[async_trait]
pub trait ResumeStore: Send + Sync {
    /// Fetch the record for a digest, if one exists.
    async fn lookup(&self, digest: &ContentDigest) -> StoreResult<Option<ResumeRecord>>;

    /// Create or overwrite the record for a digest.
    async fn save(&self, digest: &ContentDigest, record: ResumeRecord) -> StoreResult<()>;

    /// Remove the record for a digest. Removing an absent record is not an
    /// error.
    async fn clear(&self, digest: &ContentDigest) -> StoreResult<()>;
}
