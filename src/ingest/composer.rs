use std::ops::ControlFlow;

use tracing::{info, instrument, warn};

use super::intent::{PersistIntent, TriggerPhrases};
use super::pdf::PdfNormalizer;
use super::repository::RepositoryNormalizer;
use super::{pdf_attachments, urls, NormalizedArtifact};
use crate::chat::ChatTurn;
use crate::config::PersistTarget;
use crate::error::PipelineError;
use crate::persist::{PersistenceResult, PersistenceTrigger};

/// A save attempt that ended the turn, successful or not.
#[derive(Debug)]
pub struct PersistReport {
    pub label: String,
    pub outcome: Result<PersistenceResult, PipelineError>,
}

impl PersistReport {
    pub fn message(&self) -> String {
        match &self.outcome {
            Ok(result) => format!(
                "Successfully uploaded and synced: {} (ingestion job {}: {})",
                result.storage_uri, result.job_id, result.job_status
            ),
            Err(_) => format!("Failed to upload and sync: {}", self.label),
        }
    }
}

#[derive(Debug)]
pub enum TurnOutcome {
    /// Text to send to the agent.
    Forward(String),
    /// A save was triggered; its status is the whole reply.
    Persisted(PersistReport),
}

/// Destinations and trigger phrases for each artifact kind.
#[derive(Debug, Clone)]
pub struct PersistPolicy {
    pub pdf_target: PersistTarget,
    pub pdf_triggers: TriggerPhrases,
    pub repo_target: PersistTarget,
    pub repo_triggers: TriggerPhrases,
}

pub struct TurnComposer {
    pdf: PdfNormalizer,
    repositories: RepositoryNormalizer,
    persistence: PersistenceTrigger,
    policy: PersistPolicy,
}

impl TurnComposer {
    pub fn new(
        pdf: PdfNormalizer,
        repositories: RepositoryNormalizer,
        persistence: PersistenceTrigger,
        policy: PersistPolicy,
    ) -> Self {
        Self {
            pdf,
            repositories,
            persistence,
            policy,
        }
    }

    /// Convert the turn's PDFs and linked repositories, then either build the
    /// outbound text or stop at the first triggered save.
    #[instrument(skip_all, fields(attachments = turn.attachments.len()))]
    pub async fn compose(&self, turn: &ChatTurn) -> TurnOutcome {
        match self.collect_sections(turn).await {
            ControlFlow::Break(report) => {
                info!(label = %report.label, ok = report.outcome.is_ok(), "Save request ended the turn");
                TurnOutcome::Persisted(report)
            }
            ControlFlow::Continue(sections) => {
                let mut parts = Vec::with_capacity(sections.len() + 1);
                parts.push(turn.text.clone());
                parts.extend(sections);
                TurnOutcome::Forward(parts.join("\n\n"))
            }
        }
    }

    async fn collect_sections(&self, turn: &ChatTurn) -> ControlFlow<PersistReport, Vec<String>> {
        let mut sections = Vec::new();

        let pdf_intent = self.policy.pdf_triggers.classify(&turn.text);
        for attachment in pdf_attachments(turn) {
            let artifact = self.pdf.normalize(&attachment).await;
            if let Some(section) = self
                .step(artifact, pdf_intent, &self.policy.pdf_target)
                .await?
            {
                sections.push(section);
            }
        }

        let repo_intent = self.policy.repo_triggers.classify(&turn.text);
        for url in urls::detect_repository_urls(Some(&turn.text)) {
            let artifact = self.repositories.normalize(&url).await;
            if let Some(section) = self
                .step(artifact, repo_intent, &self.policy.repo_target)
                .await?
            {
                sections.push(section);
            }
        }

        ControlFlow::Continue(sections)
    }

    /// One artifact: skip it if normalization failed, persist it and stop if
    /// the message asked for a save, otherwise hand back its section.
    async fn step(
        &self,
        artifact: Result<NormalizedArtifact, PipelineError>,
        intent: PersistIntent,
        target: &PersistTarget,
    ) -> ControlFlow<PersistReport, Option<String>> {
        let artifact = match artifact {
            Ok(artifact) => artifact,
            Err(err) => {
                warn!(%err, kind = ?err.kind(), "Artifact skipped");
                return ControlFlow::Continue(None);
            }
        };

        match intent {
            PersistIntent::Persist => {
                let outcome = self
                    .persistence
                    .persist(&artifact.body, &artifact.label, target)
                    .await;
                if let Err(err) = &outcome {
                    warn!(%err, label = %artifact.label, "Save failed");
                }
                ControlFlow::Break(PersistReport {
                    label: artifact.label,
                    outcome,
                })
            }
            PersistIntent::Converse => ControlFlow::Continue(Some(artifact.section())),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::ingest::pdf::testing::StaticPdfConverter;
    use crate::ingest::pdf::SharedPdfConverter;
    use crate::ingest::repository::fetch::testing::FixtureFetcher;
    use crate::ingest::repository::{RepoCache, SourceLanguage};
    use crate::persist::{MemoryObjectStore, MockKnowledgeBase, ObjectStore};

    pub fn policy() -> PersistPolicy {
        PersistPolicy {
            pdf_target: PersistTarget {
                bucket: "pdf-bucket".into(),
                knowledge_base_id: "PDFKB".into(),
                data_source_id: "PDFDS".into(),
            },
            pdf_triggers: TriggerPhrases::pdf_default(),
            repo_target: PersistTarget {
                bucket: "repo-bucket".into(),
                knowledge_base_id: "REPOKB".into(),
                data_source_id: "REPODS".into(),
            },
            repo_triggers: TriggerPhrases::repository_default(),
        }
    }

    pub struct Harness {
        pub composer: TurnComposer,
        pub kb: Arc<MockKnowledgeBase>,
        pub root: tempfile::TempDir,
    }

    pub fn harness(pdf_text: Option<&str>, store: Arc<dyn ObjectStore>) -> Harness {
        harness_with(StaticPdfConverter::shared(pdf_text), store)
    }

    pub fn harness_with(converter: SharedPdfConverter, store: Arc<dyn ObjectStore>) -> Harness {
        let root = tempfile::tempdir().expect("tempdir");
        let kb = Arc::new(MockKnowledgeBase::default());
        let composer = TurnComposer::new(
            PdfNormalizer::new(converter),
            RepositoryNormalizer::new(
                RepoCache::new(root.path().join("repos")),
                FixtureFetcher::shared(&[("lib/core.py", "class Engine:\n    \"\"\"Runs.\"\"\"\n")]),
                SourceLanguage::Python,
            ),
            PersistenceTrigger::new(store, kb.clone()).with_scratch_dir(root.path().join("scratch")),
            policy(),
        );
        Harness { composer, kb, root }
    }

    pub fn memory_store() -> Arc<MemoryObjectStore> {
        Arc::new(MemoryObjectStore::default())
    }

    pub fn write_pdf(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"%PDF-1.4").expect("write pdf");
        path
    }
}
