//! Execution configuration
//!
//! Explicit configuration object built once and handed to the orchestrator;
//! no ambient globals. Values can come from the environment or be set in
//! code for tests.

use std::env;
use std::time::Duration;

/// What the run does when a subtask exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure and keep executing so the reporter can still
    /// synthesize a best-effort report noting the gap. Default.
    ContinueWithPartial,
    /// Fail the run on the first subtask failure without invoking the
    /// reporter.
    AbortOnFirstFailure,
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Retries after the first attempt for planner, worker and reporter
    /// brain calls.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub retry_delay: Duration,
    /// Multiplier applied to the delay after each retry. 1.0 gives a fixed
    /// delay.
    pub backoff_multiplier: f64,
    /// Per-brain-call timeout. A timed-out call counts as a retryable
    /// failure.
    pub call_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_secs(300),
            failure_policy: FailurePolicy::ContinueWithPartial,
        }
    }
}

impl ExecutionConfig {
    /// Load overrides from `ORCHESTRATOR_*` environment variables, keeping
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_retries = env_parse("ORCHESTRATOR_MAX_RETRIES").unwrap_or(defaults.max_retries);
        let retry_delay = env_parse::<f64>("ORCHESTRATOR_RETRY_DELAY_SECS")
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.retry_delay);
        let backoff_multiplier =
            env_parse("ORCHESTRATOR_BACKOFF_MULTIPLIER").unwrap_or(defaults.backoff_multiplier);
        let call_timeout = env_parse::<f64>("ORCHESTRATOR_CALL_TIMEOUT_SECS")
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.call_timeout);
        let failure_policy = match env::var("ORCHESTRATOR_ABORT_ON_FIRST_FAILURE").as_deref() {
            Ok("true") | Ok("1") => FailurePolicy::AbortOnFirstFailure,
            _ => defaults.failure_policy,
        };

        Self {
            max_retries,
            retry_delay,
            backoff_multiplier,
            call_timeout,
            failure_policy,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
