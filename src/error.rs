//! Error types for the analysis pipeline orchestrator

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{ErrorInfo, ErrorKind};
use crate::recorder::TaskRecorder;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Phase Failures
    // =============================

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Reporting error: {0}")]
    Reporting(String),

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Unknown worker role: {0}")]
    UnknownWorkerRole(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Brain invocation error: {0}")]
    BrainInvocation(String),

    #[error("Run cancelled")]
    Cancelled,

    // =============================
    // Invariant Violations (never retried)
    // =============================

    #[error("Out-of-order result: {0}")]
    OutOfOrderResult(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    // =============================
    // Terminal Run Failure
    // =============================

    /// Surfaced by the blocking and streaming entry points when a run ends
    /// with status `Failed`: wraps the failing phase's [`ErrorInfo`] together
    /// with the final recorder so partial results stay inspectable.
    #[error("Run {} failed: {}", .recorder.trace_id, .info.message)]
    RunFailed {
        info: ErrorInfo,
        recorder: Box<TaskRecorder>,
    },

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl OrchestrationError {
    /// Classify the error for the retry policy. Parsing, timeout and
    /// transport failures are transient; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Parsing(_) | Self::Timeout(_) | Self::BrainInvocation(_) | Self::Http(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Planning(_) => ErrorKind::Planning,
            Self::Reporting(_) => ErrorKind::Reporting,
            Self::Parsing(_) | Self::Serialization(_) => ErrorKind::Parsing,
            Self::UnknownWorkerRole(_) => ErrorKind::UnknownWorkerRole,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::BrainInvocation(_) | Self::Http(_) => ErrorKind::BrainInvocation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::OutOfOrderResult(_) => ErrorKind::OutOfOrderResult,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::RunFailed { info, .. } => info.kind,
        }
    }

    /// Build an [`ErrorInfo`] carrying diagnostic context pairs
    /// (phase, subtask index, attempt count, ...).
    pub fn to_info<I, K, V>(&self, context: I) -> ErrorInfo
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ErrorInfo {
            kind: self.kind(),
            message: self.to_string(),
            context: context
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect::<HashMap<String, String>>(),
        }
    }
}
