use crate::traits::{ResumeStore, StoreError, StoreResult};
use async_trait::async_trait;
use nosup_core::models::{ContentDigest, ResumeRecord};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File-backed resume store.
///
/// Each record is two files under the base directory, named with the
/// protocol's persisted-key scheme: `<digest>_context` and
/// `<digest>_objectName`. A record exists only when both files are present
/// and readable; a half-written pair reads as absent, which at worst costs a
/// restart from offset 0.
pub struct LocalResumeStore {
    base_path: PathBuf,
}

impl LocalResumeStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            StoreError::ConfigError(format!(
                "Failed to create resume store directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self { base_path })
    }

    /// Convert a digest to the two key paths, refusing anything that could
    /// escape the base directory. Digests are hex strings; everything else is
    /// rejected.
    fn key_paths(&self, digest: &ContentDigest) -> StoreResult<(PathBuf, PathBuf)> {
        let key = digest.as_str();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StoreError::InvalidKey(format!(
                "Digest is not a hex string: {:?}",
                key
            )));
        }
        Ok((
            self.base_path.join(format!("{key}_context")),
            self.base_path.join(format!("{key}_objectName")),
        ))
    }
}

async fn read_key(path: &Path) -> StoreResult<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_key(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ResumeStore for LocalResumeStore {
    async fn lookup(&self, digest: &ContentDigest) -> StoreResult<Option<ResumeRecord>> {
        let (context_path, object_path) = self.key_paths(digest)?;
        let context = read_key(&context_path).await?;
        let object_name = read_key(&object_path).await?;
        match (context, object_name) {
            (Some(context), Some(object_name)) => Ok(Some(ResumeRecord {
                context,
                object_name,
            })),
            _ => Ok(None),
        }
    }

    async fn save(&self, digest: &ContentDigest, record: ResumeRecord) -> StoreResult<()> {
        let (context_path, object_path) = self.key_paths(digest)?;
        fs::write(&context_path, record.context.as_bytes()).await?;
        fs::write(&object_path, record.object_name.as_bytes()).await?;
        tracing::debug!(
            digest = %digest,
            object_name = %record.object_name,
            "Resume record saved"
        );
        Ok(())
    }

    async fn clear(&self, digest: &ContentDigest) -> StoreResult<()> {
        let (context_path, object_path) = self.key_paths(digest)?;
        remove_key(&context_path).await?;
        remove_key(&object_path).await?;
        Ok(())
    }
}
