//! Worker capability trait, registry, and dispatcher
//!
//! One worker per role, bound in a registry that is closed for mutation
//! once the orchestrator is built. The dispatcher invokes workers strictly
//! in plan order with a per-call timeout and bounded retries, and records
//! an outcome for every attempted subtask — failures included.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::brains::Brain;
use crate::config::ExecutionConfig;
use crate::error::OrchestrationError;
use crate::models::{Subtask, WorkerResult};
use crate::planner::RoleSpec;
use crate::retry::{with_retries, with_timeout};
use crate::Result;

/// Input context for one worker invocation: the original request, the
/// subtask instruction, and the compressed digest of all prior outputs.
#[derive(Debug, Clone)]
pub struct WorkerInput {
    pub request: String,
    pub instruction: String,
    pub context_digest: String,
}

#[derive(Debug, Clone)]
pub struct WorkerOutput {
    pub output: String,
    /// Opaque record of the worker's internal steps, kept for diagnostics
    /// only — never propagated to later subtasks.
    pub trajectory: serde_json::Value,
}

/// A single worker capability. Implementations must be stateless with
/// respect to run data so one registry can serve concurrent runs.
#[async_trait]
pub trait Worker: Send + Sync {
    /// One-line capability description, surfaced to the planner prompt.
    fn description(&self) -> &str {
        ""
    }

    async fn invoke(&self, input: &WorkerInput) -> Result<WorkerOutput>;
}

/// Role name → worker handle. Populated at startup, then handed to the
/// orchestrator by value; nothing mutates it afterwards.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
        }
    }

    pub fn register(&mut self, role: impl Into<String>, worker: Arc<dyn Worker>) {
        self.workers.insert(role.into(), worker);
    }

    pub fn get(&self, role: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(role).cloned()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Role catalog for the planner prompt, sorted for a stable prompt.
    pub fn role_specs(&self) -> Vec<RoleSpec> {
        let mut specs: Vec<RoleSpec> = self
            .workers
            .iter()
            .map(|(name, worker)| RoleSpec {
                name: name.clone(),
                description: worker.description().to_string(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

/// Short stable fingerprint of a context digest, so logs can correlate
/// inputs without carrying the full text.
pub fn digest_fingerprint(digest: &str) -> String {
    let hash = Sha256::digest(digest.as_bytes());
    hex::encode(hash)[..12].to_string()
}

/// Dispatches one subtask at a time to the worker registered for its role.
#[derive(Clone)]
pub struct WorkerDispatcher {
    registry: WorkerRegistry,
    config: ExecutionConfig,
}

impl WorkerDispatcher {
    pub fn new(registry: WorkerRegistry, config: ExecutionConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Invoke the worker for `subtask`, with timeout and retries. A brain
    /// failure after exhausted retries is captured inside the returned
    /// [`WorkerResult`]; only a missing role is an error here (the planner
    /// already validated roles — this is defense in depth).
    pub async fn dispatch(
        &self,
        trace_id: &str,
        request: &str,
        index: usize,
        subtask: &Subtask,
        context_digest: String,
    ) -> Result<WorkerResult> {
        let worker = self.registry.get(&subtask.worker_role).ok_or_else(|| {
            OrchestrationError::UnknownWorkerRole(format!(
                "no worker registered for role {}",
                subtask.worker_role
            ))
        })?;

        debug!(
            trace_id,
            subtask_index = index,
            worker_role = %subtask.worker_role,
            digest_fp = %digest_fingerprint(&context_digest),
            "Dispatching subtask"
        );

        let input = WorkerInput {
            request: request.to_string(),
            instruction: subtask.instruction.clone(),
            context_digest,
        };

        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let worker_ref = &worker;
        let input_ref = &input;
        let outcome = with_retries(&self.config, "worker", |attempt| {
            attempts.store(attempt, Ordering::SeqCst);
            async move {
                with_timeout(
                    self.config.call_timeout,
                    "worker brain call",
                    worker_ref.invoke(input_ref),
                )
                .await
            }
        })
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let attempts = attempts.load(Ordering::SeqCst);

        let result = match outcome {
            Ok(out) => WorkerResult {
                subtask_index: index,
                worker_role: subtask.worker_role.clone(),
                output: out.output,
                trajectory: out.trajectory,
                error: None,
                duration_ms,
                attempts,
            },
            Err(e) => {
                warn!(
                    trace_id,
                    subtask_index = index,
                    worker_role = %subtask.worker_role,
                    attempts,
                    error = %e,
                    "Subtask failed, recording error"
                );
                WorkerResult {
                    subtask_index: index,
                    worker_role: subtask.worker_role.clone(),
                    output: String::new(),
                    trajectory: serde_json::Value::Null,
                    error: Some(e.to_info([
                        ("phase", "executing".to_string()),
                        ("subtask_index", index.to_string()),
                        ("worker_role", subtask.worker_role.clone()),
                        ("attempts", attempts.to_string()),
                        ("trace_id", trace_id.to_string()),
                    ])),
                    duration_ms,
                    attempts,
                }
            }
        };

        Ok(result)
    }
}

/// Worker backed by a reasoning brain: composes a prompt from the request,
/// instruction, and prior-output digest, and returns the brain's text.
pub struct BrainWorker {
    brain: Arc<dyn Brain>,
    description: String,
}

impl BrainWorker {
    pub fn new(brain: Arc<dyn Brain>, description: impl Into<String>) -> Self {
        Self {
            brain,
            description: description.into(),
        }
    }
}

#[async_trait]
impl Worker for BrainWorker {
    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: &WorkerInput) -> Result<WorkerOutput> {
        let previous = if input.context_digest.is_empty() {
            "(none)\n"
        } else {
            input.context_digest.as_str()
        };
        let prompt = format!(
            "ORIGINAL REQUEST:\n{}\n\nFINDINGS FROM EARLIER SUBTASKS:\n{}\nYOUR SUBTASK:\n{}\n",
            input.request, previous, input.instruction
        );

        let output = self.brain.invoke(&prompt).await?;
        let trajectory = json!([{
            "step": "brain_call",
            "prompt_chars": prompt.len(),
            "output_chars": output.len(),
        }]);

        Ok(WorkerOutput { output, trajectory })
    }
}

/// Fixed-output worker for demos and tests.
pub struct StaticWorker {
    output: String,
    description: String,
}

impl StaticWorker {
    pub fn new(output: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            description: description.into(),
        }
    }
}

#[async_trait]
impl Worker for StaticWorker {
    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, _input: &WorkerInput) -> Result<WorkerOutput> {
        Ok(WorkerOutput {
            output: self.output.clone(),
            trajectory: serde_json::Value::Null,
        })
    }
}
