use std::path::PathBuf;

/// Failure taxonomy for attachment normalization and persistence.
///
/// None of these abort a turn: the composer logs them and either drops the
/// artifact or, for a triggered save, reports the failure as the reply.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid input {input:?}: {reason}")]
    InvalidInput { input: String, reason: String },

    #[error("{tool} is unavailable: {reason}")]
    ToolUnavailable { tool: &'static str, reason: String },

    #[error("{operation} failed: {reason}")]
    RemoteCallFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("failed to parse {}: {reason}", path.display())]
    ParseFailed { path: PathBuf, reason: String },

    #[error("conversion of {} failed: {reason}", path.display())]
    ConversionFailed { path: PathBuf, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Coarse failure kind, mostly useful for logging fields and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    InvalidInput,
    ToolUnavailable,
    RemoteCallFailed,
    Timeout,
    ParseFailed,
    ConversionFailed,
    Io,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::InvalidInput { .. } => FailureKind::InvalidInput,
            Self::ToolUnavailable { .. } => FailureKind::ToolUnavailable,
            Self::RemoteCallFailed { .. } => FailureKind::RemoteCallFailed,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::ParseFailed { .. } => FailureKind::ParseFailed,
            Self::ConversionFailed { .. } => FailureKind::ConversionFailed,
            Self::Io { .. } => FailureKind::Io,
        }
    }

    pub fn remote(operation: &'static str, reason: impl ToString) -> Self {
        Self::RemoteCallFailed {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
