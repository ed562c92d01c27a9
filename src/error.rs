use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type StageResult<T> = Result<T, StageError>;

/// The six stable error codes surfaced to callers in a [`RunResult`].
///
/// Every [`StageError`] variant collapses into exactly one of these via
/// [`StageError::kind`]. The codes are part of the external contract and
/// must not change meaning between releases.
///
/// [`RunResult`]: crate::model::RunResult
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Another run holds the busy gate; the caller must retry later.
    Busy,
    /// A collaborator exceeded its expected bound.
    Timeout,
    /// No usable frame was produced by the capture collaborator.
    CaptureFailed,
    /// Malformed or undecodable image bytes.
    DecodeFailed,
    /// Fewer than two calibrated reference labels.
    InsufficientReferences,
    /// Any other failure; the original message is preserved in the logs.
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Timeout => "timeout",
            Self::CaptureFailed => "capture_failed",
            Self::DecodeFailed => "decode_failed",
            Self::InsufficientReferences => "insufficient_references",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("another run is in progress")]
    Busy,

    #[error("`{operation}` timed out{detail_suffix}")]
    Timeout {
        operation: String,
        detail_suffix: String,
    },

    #[error("arm error during `{gesture}`: {message}")]
    Arm { gesture: String, message: String },

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("only {have} reference label(s) calibrated, need {need}")]
    InsufficientReferences { have: usize, need: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("missing reference artifact at `{0}`")]
    MissingArtifact(PathBuf),
}

impl StageError {
    #[must_use]
    pub fn timeout(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let detail_suffix = if detail.trim().is_empty() {
            String::new()
        } else {
            format!(": {}", detail.trim())
        };
        Self::Timeout {
            operation: operation.into(),
            detail_suffix,
        }
    }

    #[must_use]
    pub fn arm(gesture: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Arm {
            gesture: gesture.into(),
            message: message.into(),
        }
    }

    /// Collapse this error into its caller-facing [`ErrorKind`].
    ///
    /// Grouping rule: anything without a dedicated code reports `Unknown`,
    /// with the full message preserved in the ledger log.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Busy => ErrorKind::Busy,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CaptureFailed(_) => ErrorKind::CaptureFailed,
            Self::DecodeFailed(_) => ErrorKind::DecodeFailed,
            Self::InsufficientReferences { .. } => ErrorKind::InsufficientReferences,
            Self::Io(_)
            | Self::Json(_)
            | Self::Arm { .. }
            | Self::InvalidRequest(_)
            | Self::Storage(_)
            | Self::MissingArtifact(_) => ErrorKind::Unknown,
        }
    }
}
