use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::ingest::intent::TriggerPhrases;
use crate::ingest::repository::SourceLanguage;

/// Where a persisted artifact goes: the bucket it lands in and the
/// knowledge-base data source that indexes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistTarget {
    pub bucket: String,
    pub knowledge_base_id: String,
    pub data_source_id: String,
}

#[derive(Debug, Clone)]
pub struct CloneSettings {
    pub saved_repos_dir: PathBuf,
    pub timeout: Duration,
    pub language: SourceLanguage,
}

#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: String,
    pub s3_endpoint_url: Option<String>,
    pub bedrock_endpoint_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pdf_target: PersistTarget,
    pub repo_target: PersistTarget,
    pub pdf_triggers: TriggerPhrases,
    pub repo_triggers: TriggerPhrases,
    pub clone: CloneSettings,
    pub aws: AwsSettings,
}

impl AppConfig {
    pub const DEFAULT_PDF_BUCKET: &'static str = "ai-agent-knowledge-documents";
    pub const DEFAULT_REPO_BUCKET: &'static str = "ai-agent-knowledge-repositories";
    pub const DEFAULT_CLONE_TIMEOUT_SECS: u64 = 300;

    const REGION_VARS: [&'static str; 2] = ["AWS_REGION", "AWS_DEFAULT_REGION"];
    const PDF_BUCKET_VARS: [&'static str; 1] = ["KB_CHAT_PDF_BUCKET"];
    const PDF_KB_VARS: [&'static str; 1] = ["KB_CHAT_PDF_KNOWLEDGE_BASE_ID"];
    const PDF_DS_VARS: [&'static str; 1] = ["KB_CHAT_PDF_DATA_SOURCE_ID"];
    const REPO_BUCKET_VARS: [&'static str; 1] = ["KB_CHAT_REPO_BUCKET"];
    const REPO_KB_VARS: [&'static str; 1] = ["KB_CHAT_REPO_KNOWLEDGE_BASE_ID"];
    const REPO_DS_VARS: [&'static str; 1] = ["KB_CHAT_REPO_DATA_SOURCE_ID"];
    const SAVED_REPOS_VARS: [&'static str; 1] = ["KB_CHAT_SAVED_REPOS_DIR"];
    const CLONE_TIMEOUT_VARS: [&'static str; 1] = ["KB_CHAT_CLONE_TIMEOUT_SECS"];
    const LANGUAGE_VARS: [&'static str; 1] = ["KB_CHAT_REPO_LANGUAGE"];
    const S3_ENDPOINT_VARS: [&'static str; 2] = ["KB_CHAT_S3_ENDPOINT_URL", "AWS_ENDPOINT_URL_S3"];
    const BEDROCK_ENDPOINT_VARS: [&'static str; 1] = ["KB_CHAT_BEDROCK_ENDPOINT_URL"];
    const PDF_TRIGGER_VARS: [&'static str; 1] = ["KB_CHAT_PDF_TRIGGERS"];
    const REPO_TRIGGER_VARS: [&'static str; 1] = ["KB_CHAT_REPO_TRIGGERS"];

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let read_env = |candidates: &[&'static str]| read_first(candidates, &lookup);
        let region = read_env(&Self::REGION_VARS).unwrap_or_else(|| "us-east-1".to_string());

        let pdf_target = PersistTarget {
            bucket: read_env(&Self::PDF_BUCKET_VARS)
                .unwrap_or_else(|| Self::DEFAULT_PDF_BUCKET.to_string()),
            knowledge_base_id: read_env(&Self::PDF_KB_VARS)
                .unwrap_or_else(|| "pdf-knowledge-base".to_string()),
            data_source_id: read_env(&Self::PDF_DS_VARS)
                .unwrap_or_else(|| "pdf-data-source".to_string()),
        };
        let repo_target = PersistTarget {
            bucket: read_env(&Self::REPO_BUCKET_VARS)
                .unwrap_or_else(|| Self::DEFAULT_REPO_BUCKET.to_string()),
            knowledge_base_id: read_env(&Self::REPO_KB_VARS)
                .unwrap_or_else(|| "repo-knowledge-base".to_string()),
            data_source_id: read_env(&Self::REPO_DS_VARS)
                .unwrap_or_else(|| "repo-data-source".to_string()),
        };

        let timeout_secs = read_env(&Self::CLONE_TIMEOUT_VARS)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_CLONE_TIMEOUT_SECS);
        let language = match read_env(&Self::LANGUAGE_VARS) {
            Some(raw) => raw
                .parse::<SourceLanguage>()
                .map_err(anyhow::Error::msg)
                .context("KB_CHAT_REPO_LANGUAGE")?,
            None => SourceLanguage::default(),
        };

        Ok(Self {
            pdf_target,
            repo_target,
            pdf_triggers: read_env(&Self::PDF_TRIGGER_VARS)
                .map(|raw| TriggerPhrases::new(raw.split(',')))
                .unwrap_or_else(TriggerPhrases::pdf_default),
            repo_triggers: read_env(&Self::REPO_TRIGGER_VARS)
                .map(|raw| TriggerPhrases::new(raw.split(',')))
                .unwrap_or_else(TriggerPhrases::repository_default),
            clone: CloneSettings {
                saved_repos_dir: read_env(&Self::SAVED_REPOS_VARS)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("saved_repos")),
                timeout: Duration::from_secs(timeout_secs.max(1)),
                language,
            },
            aws: AwsSettings {
                region,
                s3_endpoint_url: read_env(&Self::S3_ENDPOINT_VARS),
                bedrock_endpoint_url: read_env(&Self::BEDROCK_ENDPOINT_VARS),
            },
        })
    }
}

/// First non-blank value among `candidates` in the process environment.
pub fn read_env(candidates: &[&'static str]) -> Option<String> {
    read_first(candidates, &|key: &str| env::var(key).ok())
}

/// First non-blank value among `candidates`; a blank entry does not hide later ones.
pub fn read_first(
    candidates: &[&'static str],
    lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    candidates
        .iter()
        .copied()
        .filter_map(lookup)
        .find(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ingest::intent::PersistIntent;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let cfg = config(&[]).expect("config");
        assert_eq!(cfg.pdf_target.bucket, AppConfig::DEFAULT_PDF_BUCKET);
        assert_eq!(cfg.repo_target.bucket, AppConfig::DEFAULT_REPO_BUCKET);
        assert_eq!(cfg.clone.timeout, Duration::from_secs(300));
        assert_eq!(cfg.clone.saved_repos_dir, PathBuf::from("saved_repos"));
        assert_eq!(cfg.clone.language, SourceLanguage::Python);
        assert_eq!(cfg.aws.region, "us-east-1");
        assert_eq!(cfg.pdf_triggers, TriggerPhrases::pdf_default());
    }

    #[test]
    fn candidates_fall_back_in_order() {
        let cfg = config(&[
            ("AWS_REGION", "  "),
            ("AWS_DEFAULT_REGION", "eu-central-1"),
            ("KB_CHAT_REPO_LANGUAGE", "ts"),
            ("KB_CHAT_CLONE_TIMEOUT_SECS", "45"),
        ])
        .expect("config");
        // A blank first candidate does not shadow the next one.
        assert_eq!(cfg.aws.region, "eu-central-1");
        assert_eq!(cfg.clone.language, SourceLanguage::TypeScript);
        assert_eq!(cfg.clone.timeout, Duration::from_secs(45));
    }

    #[test]
    fn trigger_overrides_are_comma_separated() {
        let cfg = config(&[("KB_CHAT_PDF_TRIGGERS", "archive this, keep it")]).expect("config");
        assert_eq!(cfg.pdf_triggers.classify("please KEEP IT"), PersistIntent::Persist);
        assert_eq!(cfg.pdf_triggers.classify("save the file"), PersistIntent::Converse);
    }

    #[test]
    fn unknown_language_is_an_error() {
        let err = config(&[("KB_CHAT_REPO_LANGUAGE", "cobol")]).expect_err("bad language");
        assert!(format!("{err:#}").contains("cobol"));
    }
}
