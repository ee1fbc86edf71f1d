pub mod knowledge_base;
pub mod mock;
pub mod sigv4;
pub mod storage;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{AppConfig, PersistTarget};
use crate::error::PipelineError;
pub use knowledge_base::{BedrockKnowledgeBase, KnowledgeBase, SharedKnowledgeBase};
pub use mock::{MemoryObjectStore, MockKnowledgeBase};
pub use sigv4::AwsCredentials;
pub use storage::{ObjectStore, S3ObjectStore, SharedObjectStore};

/// Outcome of a successful upload plus ingestion kick-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceResult {
    pub storage_uri: String,
    pub job_id: String,
    pub job_status: String,
}

/// Pushes normalized text to object storage and starts the indexing job
/// that makes it searchable.
pub struct PersistenceTrigger {
    store: SharedObjectStore,
    knowledge_base: SharedKnowledgeBase,
    scratch_dir: PathBuf,
}

impl PersistenceTrigger {
    pub fn new(store: SharedObjectStore, knowledge_base: SharedKnowledgeBase) -> Self {
        Self {
            store,
            knowledge_base,
            scratch_dir: std::env::temp_dir(),
        }
    }

    #[cfg(test)]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    #[instrument(skip(self, text, target), fields(bucket = %target.bucket))]
    pub async fn persist(
        &self,
        text: &str,
        label: &str,
        target: &PersistTarget,
    ) -> Result<PersistenceResult, PipelineError> {
        let key = object_key(label);
        let storage_uri = {
            let transient = TransientFile::write(&self.scratch_dir, &key, text)?;
            self.store
                .upload(transient.path(), &target.bucket, &key)
                .await?
        };

        let job = self
            .knowledge_base
            .start_ingestion_job(&target.knowledge_base_id, &target.data_source_id)
            .await?;

        info!(%storage_uri, job_id = %job.job_id, status = %job.status, "Persisted artifact");
        Ok(PersistenceResult {
            storage_uri,
            job_id: job.job_id,
            job_status: job.status,
        })
    }
}

/// Object key for a label: its file name with the extension replaced by `.md`.
pub fn object_key(label: &str) -> String {
    let name = Path::new(label)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| label.to_string());
    let stem = Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}.md")
}

/// Local copy of the text being uploaded; removed when dropped, whether or
/// not the upload succeeded.
struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    fn write(dir: &Path, key: &str, text: &str) -> Result<Self, PipelineError> {
        fs::create_dir_all(dir).map_err(|err| PipelineError::io(dir, err))?;
        let digest = blake3::hash(text.as_bytes()).to_hex();
        let path = dir.join(format!("kb-chat-{}-{}", &digest.as_str()[..16], key));
        fs::write(&path, text).map_err(|err| PipelineError::io(&path, err))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(?err, path = %self.path.display(), "Failed to remove transient upload file");
        }
    }
}

/// Build the persistence trigger from config. Without AWS credentials the
/// trigger writes to an in-memory store so the relay still works locally.
pub fn build_persistence_from_env(
    config: &AppConfig,
    default_to_memory: bool,
) -> anyhow::Result<PersistenceTrigger> {
    match AwsCredentials::from_env() {
        Ok(credentials) => {
            let store = S3ObjectStore::new(
                credentials.clone(),
                &config.aws.region,
                config.aws.s3_endpoint_url.clone(),
            );
            let knowledge_base = BedrockKnowledgeBase::new(
                credentials,
                &config.aws.region,
                config.aws.bedrock_endpoint_url.clone(),
            );
            Ok(PersistenceTrigger::new(
                Arc::new(store),
                Arc::new(knowledge_base),
            ))
        }
        Err(err) if default_to_memory => {
            warn!(?err, "AWS credentials missing; saves go to an in-memory store");
            Ok(PersistenceTrigger::new(
                Arc::new(MemoryObjectStore::default()),
                Arc::new(MockKnowledgeBase::default()),
            ))
        }
        Err(err) => Err(err),
    }
}
