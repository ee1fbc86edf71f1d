use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::knowledge_base::{IngestionJob, KnowledgeBase};
use super::storage::ObjectStore;
use crate::error::PipelineError;

/// Object store that keeps uploads in memory. Used when no AWS credentials
/// are configured, and by tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, String>>,
    fail_uploads: AtomicBool,
}

impl MemoryObjectStore {
    #[cfg(test)]
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_uploads.store(true, Ordering::Relaxed);
        store
    }

    #[cfg(test)]
    pub fn get(&self, uri: &str) -> anyhow::Result<Option<String>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("memory object store lock poisoned"))?;
        Ok(objects.get(uri).cloned())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        local_file: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<String, PipelineError> {
        if self.fail_uploads.load(Ordering::Relaxed) {
            return Err(PipelineError::remote("upload", "memory store configured to fail"));
        }

        let body = tokio::fs::read_to_string(local_file)
            .await
            .map_err(|err| PipelineError::io(local_file, err))?;
        let uri = format!("s3://{bucket}/{key}");
        self.objects
            .lock()
            .map_err(|_| PipelineError::remote("upload", "memory store lock poisoned"))?
            .insert(uri.clone(), body);
        Ok(uri)
    }
}

/// Knowledge base that hands out sequential job ids without indexing anything.
#[derive(Default)]
pub struct MockKnowledgeBase {
    job_counter: AtomicU64,
    started: Mutex<Vec<(String, String)>>,
}

impl MockKnowledgeBase {
    #[cfg(test)]
    pub fn started_jobs(&self) -> Vec<(String, String)> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl KnowledgeBase for MockKnowledgeBase {
    async fn start_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> Result<IngestionJob, PipelineError> {
        let id = self.job_counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.started
            .lock()
            .map_err(|_| PipelineError::remote("StartIngestionJob", "mock lock poisoned"))?
            .push((knowledge_base_id.to_string(), data_source_id.to_string()));
        Ok(IngestionJob {
            job_id: format!("mock-job-{id}"),
            status: "STARTING".to_string(),
        })
    }
}
