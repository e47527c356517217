//! Analysis Agent Orchestrator
//!
//! A plan → execute → report engine for multi-stage analysis pipelines:
//! - Decomposes a free-form request into an ordered, role-tagged subtask list
//! - Executes subtasks strictly sequentially, feeding each worker a digest
//!   of all prior outputs
//! - Synthesizes one final report from the complete run record
//! - Tracks every run in a guarded state machine with per-call timeouts,
//!   bounded retries, and structured run events
//!
//! The reasoning backends (planner, workers, reporter) are opaque async
//! collaborators behind narrow traits; the engine never depends on what
//! produces their text.
//!
//! PIPELINE:
//! REQUEST → PLAN → EXECUTE (subtask 1..N, in order) → REPORT

pub mod brains;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod recorder;
pub mod reporter;
pub mod retry;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use config::{ExecutionConfig, FailurePolicy};
pub use models::*;
pub use orchestrator::{CancelFlag, Orchestrator, StreamingRun};
pub use recorder::TaskRecorder;
