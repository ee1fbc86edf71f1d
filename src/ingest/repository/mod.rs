//! Repository normalization: shallow-clone a GitHub repository into a local
//! cache, pull class and method signatures out of its sources with
//! tree-sitter, and render them as a markdown reference document.

pub mod fetch;
pub mod parse;
pub mod render;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use super::{ArtifactKind, NormalizedArtifact};
use crate::error::PipelineError;
pub use fetch::{GitCliFetcher, RepoFetcher, SharedRepoFetcher};

/// Source language whose class definitions get documented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceLanguage {
    #[default]
    Python,
    JavaScript,
    TypeScript,
}

impl SourceLanguage {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            SourceLanguage::Python => &["py"],
            SourceLanguage::JavaScript => &["js", "jsx", "mjs", "cjs"],
            SourceLanguage::TypeScript => &["ts", "tsx"],
        }
    }

    fn matches(self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions().contains(&ext.as_str())
            })
            .unwrap_or(false)
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceLanguage::Python => "python",
            SourceLanguage::JavaScript => "javascript",
            SourceLanguage::TypeScript => "typescript",
        };
        f.write_str(name)
    }
}

impl FromStr for SourceLanguage {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(SourceLanguage::Python),
            "javascript" | "js" => Ok(SourceLanguage::JavaScript),
            "typescript" | "ts" => Ok(SourceLanguage::TypeScript),
            other => Err(format!(
                "unsupported source language '{other}' (expected python, javascript or typescript)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDoc {
    pub name: String,
    pub params: Vec<String>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDoc {
    pub name: String,
    pub bases: Vec<String>,
    pub doc: Option<String>,
    pub methods: Vec<MethodDoc>,
}

/// Type definitions found in a repository, keyed by relative file path.
#[derive(Debug, Clone, Default)]
pub struct RepositoryDoc {
    pub name: String,
    pub url: String,
    pub files: BTreeMap<String, Vec<TypeDoc>>,
}

impl RepositoryDoc {
    pub fn type_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

/// Repository name from a URL: last path segment without `.git`.
pub fn repository_name(url: &str) -> Option<String> {
    let last = url.trim_end_matches('/').rsplit('/').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name == "." || name == ".." || name.contains(':') {
        return None;
    }
    Some(name.to_string())
}

/// On-disk working set of cloned repositories, one directory per name.
///
/// Directories survive after documentation is generated; fetching the same
/// name again replaces the previous checkout.
#[derive(Debug, Clone)]
pub struct RepoCache {
    root: PathBuf,
}

impl RepoCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Clear any previous checkout for `name` and return the empty slot.
    pub fn prepare(&self, name: &str) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(&self.root).map_err(|err| PipelineError::io(&self.root, err))?;
        let dest = self.path_for(name);
        if dest.exists() {
            debug!(path = %dest.display(), "Removing previous checkout");
            fs::remove_dir_all(&dest).map_err(|err| PipelineError::io(&dest, err))?;
        }
        Ok(dest)
    }

    pub fn discard(&self, name: &str) {
        let dest = self.path_for(name);
        if dest.exists() {
            if let Err(err) = fs::remove_dir_all(&dest) {
                warn!(?err, path = %dest.display(), "Failed to remove partial checkout");
            }
        }
    }
}

pub struct RepositoryNormalizer {
    cache: RepoCache,
    fetcher: SharedRepoFetcher,
    language: SourceLanguage,
}

impl RepositoryNormalizer {
    pub fn new(cache: RepoCache, fetcher: SharedRepoFetcher, language: SourceLanguage) -> Self {
        Self {
            cache,
            fetcher,
            language,
        }
    }

    #[instrument(skip(self), fields(language = %self.language))]
    pub async fn normalize(&self, url: &str) -> Result<NormalizedArtifact, PipelineError> {
        let name = repository_name(url).ok_or_else(|| PipelineError::InvalidInput {
            input: url.to_string(),
            reason: "no usable repository name".to_string(),
        })?;

        let dest = self.cache.prepare(&name)?;
        if let Err(err) = self.fetcher.fetch(url, &dest).await {
            warn!(%err, kind = ?err.kind(), "Repository fetch failed");
            self.cache.discard(&name);
            return Err(err);
        }

        // Walking and parsing a checkout is CPU and disk bound.
        let doc = {
            let (task_name, task_url, task_dest, language) =
                (name.clone(), url.to_string(), dest.clone(), self.language);
            tokio::task::spawn_blocking(move || {
                collect_repository_doc(&task_name, &task_url, &task_dest, language)
            })
            .await
            .map_err(|err| PipelineError::ParseFailed {
                path: dest,
                reason: err.to_string(),
            })?
        };
        info!(
            files = doc.files.len(),
            types = doc.type_count(),
            "Generated repository documentation"
        );

        Ok(NormalizedArtifact {
            kind: ArtifactKind::Repository,
            label: name,
            locator: url.to_string(),
            body: render::render_markdown(&doc),
        })
    }
}

/// Walk `root` for source files of `language` and extract their type definitions.
/// Files that cannot be parsed are logged and left out.
pub fn collect_repository_doc(
    name: &str,
    url: &str,
    root: &Path,
    language: SourceLanguage,
) -> RepositoryDoc {
    let mut doc = RepositoryDoc {
        name: name.to_string(),
        url: url.to_string(),
        files: BTreeMap::new(),
    };

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(?err, "Skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_file() || !language.matches(entry.path()) {
            continue;
        }

        let rel = relative_path(root, entry.path());
        match parse::parse_file(entry.path(), language) {
            Ok(types) if types.is_empty() => {}
            Ok(types) => {
                doc.files.insert(rel, types);
            }
            Err(err) => warn!(%err, file = %rel, "Skipping file that failed to parse"),
        }
    }

    doc
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::fetch::testing::{FailingFetcher, FixtureFetcher};
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn names_come_from_last_segment() {
        assert_eq!(
            repository_name("https://github.com/acme/widgets").as_deref(),
            Some("widgets")
        );
        assert_eq!(
            repository_name("https://github.com/acme/widgets.git/").as_deref(),
            Some("widgets")
        );
        assert_eq!(repository_name("https://github.com/acme/.."), None);
    }

    #[test]
    fn language_parses_aliases() {
        assert_eq!("PY".parse::<SourceLanguage>(), Ok(SourceLanguage::Python));
        assert_eq!("ts".parse::<SourceLanguage>(), Ok(SourceLanguage::TypeScript));
        assert!("cobol".parse::<SourceLanguage>().is_err());
    }

    #[tokio::test]
    async fn single_undocumented_class_renders_minimal_section() {
        let root = tempfile::tempdir().expect("tempdir");
        let fetcher = FixtureFetcher::shared(&[("pkg/models.py", "class Empty:\n    pass\n")]);
        let normalizer = RepositoryNormalizer::new(
            RepoCache::new(root.path()),
            fetcher,
            SourceLanguage::Python,
        );

        let artifact = normalizer
            .normalize("https://github.com/acme/widgets")
            .await
            .expect("normalized");

        assert_eq!(artifact.kind, ArtifactKind::Repository);
        assert_eq!(artifact.label, "widgets");
        assert!(artifact.body.starts_with("# widgets Documentation"));
        assert!(artifact.body.contains("### class Empty"));
        assert!(!artifact.body.contains("Inherits from"));
        assert!(!artifact.body.contains("#### Methods"));
        // Checkout stays behind as the cache for this name.
        assert!(root.path().join("widgets/pkg/models.py").is_file());
    }

    #[tokio::test]
    async fn refetch_replaces_previous_checkout() {
        let root = tempfile::tempdir().expect("tempdir");
        let stale = root.path().join("widgets/stale.py");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "class Stale:\n    pass\n").unwrap();

        let normalizer = RepositoryNormalizer::new(
            RepoCache::new(root.path()),
            FixtureFetcher::shared(&[("fresh.py", "class Fresh:\n    pass\n")]),
            SourceLanguage::Python,
        );
        let artifact = normalizer
            .normalize("https://github.com/acme/widgets")
            .await
            .expect("normalized");

        assert!(!stale.exists());
        assert!(artifact.body.contains("class Fresh"));
        assert!(!artifact.body.contains("class Stale"));
    }

    #[tokio::test]
    async fn failed_fetch_removes_partial_checkout() {
        let root = tempfile::tempdir().expect("tempdir");
        let normalizer = RepositoryNormalizer::new(
            RepoCache::new(root.path()),
            Arc::new(FailingFetcher::timeout()),
            SourceLanguage::Python,
        );

        let err = normalizer
            .normalize("https://github.com/acme/slow")
            .await
            .expect_err("fetch fails");
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(!root.path().join("slow").exists());
    }

    #[tokio::test]
    async fn unnamed_url_is_invalid_input_without_fetching() {
        let root = tempfile::tempdir().expect("tempdir");
        let normalizer = RepositoryNormalizer::new(
            RepoCache::new(root.path()),
            Arc::new(FailingFetcher::timeout()),
            SourceLanguage::Python,
        );

        let err = normalizer
            .normalize("https://github.com/acme/..")
            .await
            .expect_err("no repository name");
        assert_eq!(err.kind(), FailureKind::InvalidInput);
        assert!(fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[test]
    fn broken_files_are_skipped_not_fatal() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::write(root.path().join("a_good.py"), "class Good:\n    pass\n").unwrap();
        fs::write(root.path().join("b_bad.py"), "class Broken(:\n    def\n").unwrap();
        fs::write(root.path().join("notes.md"), "class NotCode: pass").unwrap();
        fs::create_dir_all(root.path().join(".git")).unwrap();
        fs::write(root.path().join(".git/hook.py"), "class Hidden:\n    pass\n").unwrap();

        let doc = collect_repository_doc("demo", "https://github.com/x/demo", root.path(), SourceLanguage::Python);
        let files: Vec<_> = doc.files.keys().cloned().collect();
        assert_eq!(files, ["a_good.py"]);
        assert_eq!(doc.type_count(), 1);
    }
}
