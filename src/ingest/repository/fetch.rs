use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::PipelineError;

pub type SharedRepoFetcher = Arc<dyn RepoFetcher>;

/// Materializes a repository snapshot at `dest`.
#[async_trait]
pub trait RepoFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), PipelineError>;
}

/// Shallow `git clone` through the host's git binary.
#[derive(Debug, Clone)]
pub struct GitCliFetcher {
    timeout: Duration,
}

impl GitCliFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn shared(timeout: Duration) -> SharedRepoFetcher {
        Arc::new(Self::new(timeout))
    }
}

#[async_trait]
impl RepoFetcher for GitCliFetcher {
    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), PipelineError> {
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--depth", "1", "--quiet"])
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(PipelineError::Timeout {
                    operation: "git clone",
                    seconds: self.timeout.as_secs(),
                })
            }
            Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::ToolUnavailable {
                    tool: "git",
                    reason: "git executable not found on PATH".to_string(),
                })
            }
            Ok(Err(err)) => return Err(PipelineError::remote("git clone", err)),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::remote(
                "git clone",
                format!("exit status {}: {}", output.status, stderr.trim()),
            ));
        }

        debug!("Clone complete");
        Ok(())
    }
}
