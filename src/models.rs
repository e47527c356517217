//! Core data model for the analysis pipeline

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

//
// ================= Enums =================
//

/// Lifecycle of a single run. Transitions are enforced by the
/// [`TaskRecorder`](crate::recorder::TaskRecorder); `Done` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Planning,
    Executing,
    Reporting,
    Done,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Planning => "planning",
            RunStatus::Executing => "executing",
            RunStatus::Reporting => "reporting",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Failure classification carried by [`ErrorInfo`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Planning,
    Reporting,
    Parsing,
    UnknownWorkerRole,
    Timeout,
    BrainInvocation,
    OutOfOrderResult,
    InvalidTransition,
    Cancelled,
}

//
// ================= Plan =================
//

/// A single unit of work, tagged with the worker role responsible for it.
/// Immutable after planning except for `completed`, which flips once a
/// [`WorkerResult`] for it is recorded (success or failure alike).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub worker_role: String,
    pub instruction: String,
    #[serde(default)]
    pub completed: bool,
}

impl Subtask {
    pub fn new(worker_role: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            worker_role: worker_role.into(),
            instruction: instruction.into(),
            completed: false,
        }
    }
}

/// Ordered execution plan produced once per run. Subtask order is the
/// execution order; there is no dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Free-text rationale preceding the subtask list.
    pub analysis: String,
    pub subtasks: Vec<Subtask>,
}

impl Plan {
    pub fn new(analysis: impl Into<String>, subtasks: Vec<Subtask>) -> Self {
        Self {
            analysis: analysis.into(),
            subtasks,
        }
    }

    /// An empty plan is valid: the planner decided no further action is
    /// needed and the run proceeds straight to reporting.
    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }
}

//
// ================= Worker Results =================
//

/// Outcome of one attempted subtask, appended in plan order, exactly once
/// per subtask. A failure is captured in `error`, never thrown away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub subtask_index: usize,
    pub worker_role: String,
    pub output: String,
    /// Opaque record of the worker's internal steps. Never forwarded to
    /// later subtasks or the reporter; only `output` propagates.
    pub trajectory: serde_json::Value,
    pub error: Option<ErrorInfo>,
    pub duration_ms: u64,
    pub attempts: u32,
}

impl WorkerResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

//
// ================= Errors =================
//

/// Enough context to diagnose a failure without re-running: which phase,
/// which subtask, which worker, how many attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
