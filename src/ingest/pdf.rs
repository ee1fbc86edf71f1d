use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{ArtifactKind, NormalizedArtifact};
use crate::chat::AttachmentRef;
use crate::error::PipelineError;

pub type SharedPdfConverter = Arc<dyn PdfConverter>;

/// Byte-level PDF to text conversion backend.
#[async_trait]
pub trait PdfConverter: Send + Sync {
    async fn convert(&self, path: &Path) -> Result<String, PipelineError>;
}

/// Converter backed by the `pdf-extract` crate.
#[derive(Debug, Default, Clone)]
pub struct PdfExtractConverter;

#[async_trait]
impl PdfConverter for PdfExtractConverter {
    async fn convert(&self, path: &Path) -> Result<String, PipelineError> {
        let owned = path.to_path_buf();
        // pdf-extract is CPU bound and has been known to panic on odd inputs;
        // a panic surfaces here as a JoinError.
        tokio::task::spawn_blocking(move || extract_blocking(&owned))
            .await
            .map_err(|err| PipelineError::ConversionFailed {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?
    }
}

#[cfg(feature = "pdf")]
fn extract_blocking(path: &Path) -> Result<String, PipelineError> {
    let bytes = std::fs::read(path).map_err(|err| PipelineError::io(path, err))?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|err| PipelineError::ConversionFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

#[cfg(not(feature = "pdf"))]
fn extract_blocking(_path: &Path) -> Result<String, PipelineError> {
    Err(PipelineError::ToolUnavailable {
        tool: "pdf-extract",
        reason: "built without the `pdf` feature".to_string(),
    })
}

/// Turns a PDF attachment into a text artifact.
pub struct PdfNormalizer {
    converter: SharedPdfConverter,
}

impl PdfNormalizer {
    pub fn new(converter: SharedPdfConverter) -> Self {
        Self { converter }
    }

    #[instrument(skip_all, fields(path = %attachment.path.display()))]
    pub async fn normalize(
        &self,
        attachment: &AttachmentRef,
    ) -> Result<NormalizedArtifact, PipelineError> {
        let path = &attachment.path;
        if !path.is_file() {
            warn!("PDF attachment is missing on disk");
            return Err(PipelineError::NotFound(path.clone()));
        }

        let raw = match self.converter.convert(path).await {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, kind = ?err.kind(), "PDF conversion failed");
                return Err(err);
            }
        };

        let body = normalize_text(&raw);
        info!(chars = body.chars().count(), "Converted PDF to text");

        Ok(NormalizedArtifact {
            kind: ArtifactKind::Pdf,
            label: attachment.display_name(),
            locator: path.display().to_string(),
            body,
        })
    }
}

/// Unix newlines, no trailing whitespace, and at most one blank line in a row.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;

    for line in unified.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Converter double: returns fixed text, or a conversion failure when empty.
    pub struct StaticPdfConverter {
        pub text: Option<String>,
    }

    impl StaticPdfConverter {
        pub fn shared(text: Option<&str>) -> SharedPdfConverter {
            Arc::new(Self {
                text: text.map(str::to_string),
            })
        }
    }

    #[async_trait]
    impl PdfConverter for StaticPdfConverter {
        async fn convert(&self, path: &Path) -> Result<String, PipelineError> {
            self.text
                .clone()
                .ok_or_else(|| PipelineError::ConversionFailed {
                    path: path.to_path_buf(),
                    reason: "scripted failure".to_string(),
                })
        }
    }

    /// Converter double keyed on the file name: names containing `bad` fail,
    /// everything else converts to `text of <name>`.
    pub struct PerPathPdfConverter;

    impl PerPathPdfConverter {
        pub fn shared() -> SharedPdfConverter {
            Arc::new(Self)
        }
    }

    #[async_trait]
    impl PdfConverter for PerPathPdfConverter {
        async fn convert(&self, path: &Path) -> Result<String, PipelineError> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.contains("bad") {
                return Err(PipelineError::ConversionFailed {
                    path: path.to_path_buf(),
                    reason: "scripted failure".to_string(),
                });
            }
            Ok(format!("text of {name}"))
        }
    }
}
