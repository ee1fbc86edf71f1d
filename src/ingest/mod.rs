pub mod attachments;
pub mod composer;
pub mod intent;
pub mod pdf;
pub mod repository;
pub mod urls;

pub use attachments::pdf_attachments;
pub use composer::{PersistPolicy, TurnComposer, TurnOutcome};
pub use pdf::{PdfExtractConverter, PdfNormalizer};
pub use repository::{GitCliFetcher, RepoCache, RepositoryNormalizer, SourceLanguage};
pub use urls::detect_repository_urls;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Pdf,
    Repository,
}

/// Text produced from one attachment or linked repository during a turn.
#[derive(Debug, Clone)]
pub struct NormalizedArtifact {
    pub kind: ArtifactKind,
    /// File name or repository name.
    pub label: String,
    /// Original path or URL.
    pub locator: String,
    pub body: String,
}

impl NormalizedArtifact {
    /// Fenced block appended to the outbound message.
    pub fn section(&self) -> String {
        match self.kind {
            ArtifactKind::Pdf => format!(
                "--- PDF Content: {label} ---\n{body}\n--- End of PDF Content: {label} ---",
                label = self.label,
                body = self.body
            ),
            ArtifactKind::Repository => format!(
                "--- Repository Documentation: {label} ({url}) ---\n{body}\n--- End of Repository Documentation: {label} ---",
                label = self.label,
                url = self.locator,
                body = self.body.trim_end()
            ),
        }
    }
}
