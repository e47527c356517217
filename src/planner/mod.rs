//! Planning stage
//!
//! Turns a free-form request into an ordered, role-tagged subtask list by
//! invoking the planning brain and parsing its delimited response. Role
//! validation happens here, before anything executes: a plan that names an
//! unregistered worker is a terminal planning failure, never a guess.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::brains::Brain;
use crate::config::ExecutionConfig;
use crate::error::OrchestrationError;
use crate::models::{Plan, Subtask};
use crate::retry::{with_retries, with_timeout};
use crate::Result;

pub mod examples;
pub use examples::{ExampleRetriever, StaticExampleLibrary};

/// A worker role visible to the planner: name plus a one-line capability
/// description for the prompt.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub name: String,
    pub description: String,
}

/// One entry of the plan section: which worker, what to do.
#[derive(Debug, Clone, Deserialize)]
struct PlannedStep {
    agent_name: String,
    task: String,
}

const CLARIFIER: &str = "\n\nIMPORTANT: your previous response could not be parsed. \
Respond with exactly one <analysis>...</analysis> section followed by one \
<plan>...</plan> section. The plan section must contain nothing but a JSON array \
of {\"agent_name\": \"...\", \"task\": \"...\"} objects (the array may be empty).";

#[derive(Clone)]
pub struct Planner {
    brain: Arc<dyn Brain>,
    retriever: Option<Arc<dyn ExampleRetriever>>,
    config: ExecutionConfig,
}

impl Planner {
    pub fn new(brain: Arc<dyn Brain>, config: ExecutionConfig) -> Self {
        Self {
            brain,
            retriever: None,
            config,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn ExampleRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Create a plan for the request. Parsing, timeout and transport
    /// failures are retried (with a clarifying re-prompt after a parse
    /// failure); an unknown worker role in the response is terminal.
    pub async fn create_plan(
        &self,
        request: &str,
        trace_id: &str,
        roles: &[RoleSpec],
    ) -> Result<Plan> {
        let example = self
            .retriever
            .as_ref()
            .and_then(|r| r.lookup(request));
        if example.is_some() {
            debug!(trace_id, "Planning prompt enriched with a worked example");
        }

        let base_prompt = build_planning_prompt(request, roles, example.as_deref());

        let outcome = with_retries(&self.config, "planner", |attempt| {
            let prompt = if attempt == 1 {
                base_prompt.clone()
            } else {
                format!("{}{}", base_prompt, CLARIFIER)
            };
            async move {
                let raw = with_timeout(
                    self.config.call_timeout,
                    "planner brain call",
                    self.brain.invoke(&prompt),
                )
                .await?;
                let (analysis, steps) = parse_plan_response(&raw)?;
                validate_roles(&steps, roles)?;
                Ok((analysis, steps))
            }
        })
        .await;

        let (analysis, steps) = outcome.map_err(|e| {
            if e.is_retryable() {
                OrchestrationError::Planning(format!("retries exhausted: {}", e))
            } else {
                e
            }
        })?;

        let subtasks: Vec<Subtask> = steps
            .into_iter()
            .map(|s| Subtask::new(s.agent_name, s.task))
            .collect();

        info!(
            trace_id,
            subtask_count = subtasks.len(),
            "Plan created"
        );

        Ok(Plan::new(analysis, subtasks))
    }
}

/// Build the planning prompt: request, worker catalog, optional worked
/// example, and the two-section response contract.
fn build_planning_prompt(request: &str, roles: &[RoleSpec], example: Option<&str>) -> String {
    let catalog = roles
        .iter()
        .map(|r| format!("- {} – {}", r.name, r.description))
        .collect::<Vec<_>>()
        .join("\n");

    let example_block = match example {
        Some(text) => format!("\nA worked example for a similar request:\n{}\n", text),
        None => String::new(),
    };

    format!(
        r#"You are the planning stage of a multi-step analysis pipeline.

REQUEST:
{request}

Available workers:
{catalog}
{example_block}
Decompose the request into an ordered list of subtasks. Each subtask is
handled by exactly one of the available workers; subtasks run strictly in
order and later subtasks can build on earlier outputs. If the request needs
no action, return an empty list.

Respond with exactly two sections:

<analysis>
Your reasoning about how to decompose the request.
</analysis>
<plan>
[
  {{"agent_name": "<worker name>", "task": "<what this subtask must do>"}}
]
</plan>
"#
    )
}

/// Extract the body of `<tag>...</tag>` from the response.
fn extract_section(input: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = input.find(&open)? + open.len();
    let end = input[start..].find(&close)? + start;
    Some(input[start..end].trim().to_string())
}

/// Parse the brain response into (analysis text, planned steps).
fn parse_plan_response(response: &str) -> Result<(String, Vec<PlannedStep>)> {
    let analysis = extract_section(response, "analysis").ok_or_else(|| {
        OrchestrationError::Parsing("response has no <analysis> section".into())
    })?;
    let plan_block = extract_section(response, "plan").ok_or_else(|| {
        OrchestrationError::Parsing("response has no <plan> section".into())
    })?;

    // Brains like to wrap the array in a markdown fence.
    let cleaned = plan_block
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let steps: Vec<PlannedStep> = serde_json::from_str(cleaned).map_err(|e| {
        OrchestrationError::Parsing(format!(
            "plan section is not a JSON list of {{agent_name, task}}: {}",
            e
        ))
    })?;

    for (i, step) in steps.iter().enumerate() {
        if step.agent_name.trim().is_empty() || step.task.trim().is_empty() {
            return Err(OrchestrationError::Parsing(format!(
                "plan entry {} has an empty agent_name or task",
                i
            )));
        }
    }

    Ok((analysis, steps))
}

/// Every planned agent_name must be a registered role. No silent fallback.
fn validate_roles(steps: &[PlannedStep], roles: &[RoleSpec]) -> Result<()> {
    for step in steps {
        if !roles.iter().any(|r| r.name == step.agent_name) {
            let known = roles
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(OrchestrationError::UnknownWorkerRole(format!(
                "{} (known roles: {})",
                step.agent_name, known
            )));
        }
    }
    Ok(())
}
