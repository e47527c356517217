//! Reporting stage
//!
//! Synthesizes the final output from the complete run record. The reporter
//! always sees everything — every subtask result in order, failures
//! included — and owes the caller a narrative that accounts for gaps.

use std::sync::Arc;

use tracing::info;

use crate::brains::Brain;
use crate::config::ExecutionConfig;
use crate::error::OrchestrationError;
use crate::recorder::TaskRecorder;
use crate::retry::{with_retries, with_timeout};
use crate::Result;

#[derive(Clone)]
pub struct Reporter {
    brain: Arc<dyn Brain>,
    config: ExecutionConfig,
}

impl Reporter {
    pub fn new(brain: Arc<dyn Brain>, config: ExecutionConfig) -> Self {
        Self { brain, config }
    }

    /// Produce the final synthesized output. Retries transient failures;
    /// exhaustion escalates to a `Reporting` failure, which the caller must
    /// treat as fatal for the run — a missing report is never swallowed.
    pub async fn report(&self, recorder: &TaskRecorder) -> Result<String> {
        let prompt = build_report_prompt(recorder);

        let prompt_ref: &str = &prompt;
        let output = with_retries(&self.config, "reporter", |_attempt| async move {
            with_timeout(
                self.config.call_timeout,
                "reporter brain call",
                self.brain.invoke(prompt_ref),
            )
            .await
        })
        .await
        .map_err(|e| {
            if e.is_retryable() {
                OrchestrationError::Reporting(format!("retries exhausted: {}", e))
            } else {
                e
            }
        })?;

        if output.trim().is_empty() {
            return Err(OrchestrationError::Reporting(
                "reporter returned empty output".into(),
            ));
        }

        info!(
            trace_id = %recorder.trace_id,
            output_len = output.len(),
            "Report synthesized"
        );

        Ok(output)
    }
}

fn build_report_prompt(recorder: &TaskRecorder) -> String {
    format!(
        r#"You are the reporting stage of a multi-step analysis pipeline.
Synthesize one coherent final report for the original request from the
subtask results below. Results appear in execution order; a result marked
[failed: ...] produced no output, and your report must state what is missing
because of it rather than papering over the gap.

{}"#,
        recorder.report_input()
    )
}
