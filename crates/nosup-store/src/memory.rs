use crate::traits::{ResumeStore, StoreResult};
use async_trait::async_trait;
use nosup_core::models::{ContentDigest, ResumeRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory resume store.
///
/// Resume state kept here does not survive the process, so interrupted
/// uploads restart from offset 0 after a restart. Useful as a test double and
/// for embedders that manage persistence themselves.
#[derive(Default)]
pub struct MemoryResumeStore {
    records: RwLock<HashMap<String, ResumeRecord>>,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResumeStore for MemoryResumeStore {
    async fn lookup(&self, digest: &ContentDigest) -> StoreResult<Option<ResumeRecord>> {
        Ok(self.records.read().await.get(digest.as_str()).cloned())
    }

    async fn save(&self, digest: &ContentDigest, record: ResumeRecord) -> StoreResult<()> {
        self.records
            .write()
            .await
            .insert(digest.as_str().to_string(), record);
        Ok(())
    }

    async fn clear(&self, digest: &ContentDigest) -> StoreResult<()> {
        self.records.write().await.remove(digest.as_str());
        Ok(())
    }
}
