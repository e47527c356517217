//! Run-scoped task recorder
//!
//! Pure state container with guarded mutation. One recorder per run, owned
//! by the orchestrator; no logging or side effects in here — observability
//! is layered on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrchestrationError;
use crate::models::{ErrorInfo, Plan, RunStatus, WorkerResult};
use crate::Result;

/// Mutable record of one run: the plan, per-subtask results, and the final
/// output. Created at run start, mutated in place as each phase completes,
/// immutable once the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecorder {
    pub request: String,
    pub trace_id: String,
    pub plan: Option<Plan>,
    pub results: Vec<WorkerResult>,
    pub final_output: Option<String>,
    pub status: RunStatus,
    pub failure: Option<ErrorInfo>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecorder {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            trace_id: format!("run-{}", Uuid::new_v4().simple()),
            plan: None,
            results: Vec::new(),
            final_output: None,
            status: RunStatus::Pending,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn with_trace_id(request: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            ..Self::new(request)
        }
    }

    /// Pending → Planning.
    pub fn start_planning(&mut self) -> Result<()> {
        self.transition(RunStatus::Pending, RunStatus::Planning, "start_planning")
    }

    /// Planning → Executing. Fails if called twice or before planning started.
    pub fn attach_plan(&mut self, plan: Plan) -> Result<()> {
        self.transition(RunStatus::Planning, RunStatus::Executing, "attach_plan")?;
        self.plan = Some(plan);
        Ok(())
    }

    /// Strict append: `result.subtask_index` must equal `results.len()`.
    /// No gaps, no out-of-order insertion. Flips the subtask's `completed`
    /// flag whether the result carries an error or not.
    pub fn append_result(&mut self, result: WorkerResult) -> Result<()> {
        // Order check comes first: a gap or out-of-order insertion is an
        // OutOfOrderResult in every state, not just outside Executing.
        if result.subtask_index != self.results.len() {
            return Err(OrchestrationError::OutOfOrderResult(format!(
                "expected subtask_index {}, got {}",
                self.results.len(),
                result.subtask_index
            )));
        }
        if self.status != RunStatus::Executing {
            return Err(OrchestrationError::InvalidTransition(format!(
                "append_result requires status executing, run {} is {}",
                self.trace_id, self.status
            )));
        }
        let subtask_count = self.subtask_count();
        if result.subtask_index >= subtask_count {
            return Err(OrchestrationError::OutOfOrderResult(format!(
                "subtask_index {} beyond plan of {} subtasks",
                result.subtask_index, subtask_count
            )));
        }

        if let Some(plan) = self.plan.as_mut() {
            plan.subtasks[result.subtask_index].completed = true;
        }
        self.results.push(result);
        Ok(())
    }

    /// Executing → Reporting. Requires every planned subtask attempted
    /// (with success or recorded failure).
    pub fn start_reporting(&mut self) -> Result<()> {
        if self.results.len() != self.subtask_count() {
            return Err(OrchestrationError::InvalidTransition(format!(
                "start_reporting with {}/{} subtasks attempted",
                self.results.len(),
                self.subtask_count()
            )));
        }
        self.transition(RunStatus::Executing, RunStatus::Reporting, "start_reporting")
    }

    /// Reporting → Done.
    pub fn finalize(&mut self, output: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::Reporting, RunStatus::Done, "finalize")?;
        self.final_output = Some(output.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Any non-terminal state → Failed.
    pub fn abort(&mut self, failure: ErrorInfo) -> Result<()> {
        if self.status.is_terminal() {
            return Err(OrchestrationError::InvalidTransition(format!(
                "abort on terminal run {} ({})",
                self.trace_id, self.status
            )));
        }
        self.status = RunStatus::Failed;
        self.failure = Some(failure);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn subtask_count(&self) -> usize {
        self.plan.as_ref().map(|p| p.subtasks.len()).unwrap_or(0)
    }

    /// Compressed prior-output summary for the next worker: final outputs
    /// only, never trajectories. Failed subtasks appear as bracketed notes
    /// so downstream workers know about the gap.
    pub fn context_digest(&self) -> String {
        let mut digest = String::new();
        for result in &self.results {
            digest.push_str(&format!(
                "## Subtask {} ({})\n",
                result.subtask_index + 1,
                result.worker_role
            ));
            match &result.error {
                None => digest.push_str(&result.output),
                Some(info) => digest.push_str(&format!("[failed: {}]", info.message)),
            }
            digest.push_str("\n\n");
        }
        digest
    }

    /// Full record handed to the reporter: the plan's analysis plus every
    /// result in order, including failure notes. Outputs only.
    pub fn report_input(&self) -> String {
        let analysis = self
            .plan
            .as_ref()
            .map(|p| p.analysis.as_str())
            .unwrap_or_default();

        let mut input = format!(
            "# Original request\n{}\n\n# Plan analysis\n{}\n\n# Subtask results\n",
            self.request, analysis
        );
        if self.results.is_empty() {
            input.push_str("(no subtasks were executed)\n");
        }
        input.push_str(&self.context_digest());
        input
    }

    fn transition(&mut self, from: RunStatus, to: RunStatus, op: &str) -> Result<()> {
        if self.status != from {
            return Err(OrchestrationError::InvalidTransition(format!(
                "{} requires status {}, run {} is {}",
                op, from, self.trace_id, self.status
            )));
        }
        self.status = to;
        Ok(())
    }
}
