//! Top-level orchestrator
//!
//! REQUEST → PLAN → EXECUTE (sequential subtasks) → REPORT
//!
//! One recorder per run, one state machine for both execution modes. The
//! blocking mode drives all phases and returns the completed recorder; the
//! streaming mode runs the same loop in a spawned task and hands the caller
//! an ordered event sequence plus a cancel handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ExecutionConfig, FailurePolicy};
use crate::dispatch::WorkerDispatcher;
use crate::error::OrchestrationError;
use crate::events::{
    ChannelEventSink, EventSink, FanoutSink, RunEvent, RunPhase, TracingEventSink,
};
use crate::models::{ErrorInfo, ErrorKind, RunStatus};
use crate::planner::Planner;
use crate::recorder::TaskRecorder;
use crate::reporter::Reporter;
use crate::Result;

/// Cooperative cancellation flag, observed at subtask boundaries and before
/// the reporting phase. In-flight brain calls are not preempted.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a streaming run: a lazy, single-consumer event sequence plus
/// the final recorder. A new run means a new handle; events are not shared
/// across callers.
pub struct StreamingRun {
    trace_id: String,
    events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancelFlag,
    handle: JoinHandle<TaskRecorder>,
}

impl StreamingRun {
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Next event, in emission order. `None` once the run has finished and
    /// all events were drained.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Stop dispatching at the next subtask boundary. The run transitions
    /// to `Failed` with kind `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish and surface the same result shape as the
    /// blocking mode.
    pub async fn finish(self) -> Result<TaskRecorder> {
        let recorder = self.handle.await.map_err(|e| {
            OrchestrationError::InvalidTransition(format!("run task aborted: {}", e))
        })?;
        into_result(recorder)
    }
}

/// Main orchestrator that coordinates the entire pipeline. Cloning shares
/// the underlying brains, workers and sink; each run still owns its own
/// recorder.
#[derive(Clone)]
pub struct Orchestrator {
    planner: Planner,
    dispatcher: WorkerDispatcher,
    reporter: Reporter,
    config: ExecutionConfig,
    sink: Arc<dyn EventSink>,
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        dispatcher: WorkerDispatcher,
        reporter: Reporter,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            planner,
            dispatcher,
            reporter,
            config,
            sink: Arc::new(TracingEventSink),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Blocking mode: run all phases and return the completed recorder, or
    /// an error wrapping the failing phase's [`ErrorInfo`] together with the
    /// final (failed) recorder.
    pub async fn run(&self, request: impl Into<String>) -> Result<TaskRecorder> {
        let recorder = TaskRecorder::new(request);
        let recorder = self
            .execute(recorder, CancelFlag::new(), self.sink.clone())
            .await;
        into_result(recorder)
    }

    /// Blocking mode with a caller-supplied trace id.
    pub async fn run_with_trace_id(
        &self,
        request: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Result<TaskRecorder> {
        let recorder = TaskRecorder::with_trace_id(request, trace_id);
        let recorder = self
            .execute(recorder, CancelFlag::new(), self.sink.clone())
            .await;
        into_result(recorder)
    }

    /// Streaming mode: spawn the run and return a handle with the event
    /// receiver and a cancel flag. Restartable only by starting a new run.
    pub fn run_streamed(&self, request: impl Into<String>) -> StreamingRun {
        let recorder = TaskRecorder::new(request);
        let trace_id = recorder.trace_id.clone();

        let (tx, rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn EventSink> = Arc::new(FanoutSink::new(vec![
            self.sink.clone(),
            Arc::new(ChannelEventSink::new(tx)) as Arc<dyn EventSink>,
        ]));

        let cancel = CancelFlag::new();
        let orchestrator = self.clone();
        let run_cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { orchestrator.execute(recorder, run_cancel, sink).await });

        StreamingRun {
            trace_id,
            events: rx,
            cancel,
            handle,
        }
    }

    async fn execute(
        &self,
        mut recorder: TaskRecorder,
        cancel: CancelFlag,
        sink: Arc<dyn EventSink>,
    ) -> TaskRecorder {
        let run_started = Instant::now();
        let trace_id = recorder.trace_id.clone();

        info!(trace_id = %trace_id, request = %recorder.request, "Run started");
        sink.emit(RunEvent::started(&trace_id, RunPhase::Run));

        // === PLAN ===
        if let Err(e) = recorder.start_planning() {
            let info = e.to_info([("phase", "planning"), ("trace_id", trace_id.as_str())]);
            return self.fail(recorder, sink.as_ref(), run_started, info);
        }
        sink.emit(RunEvent::started(&trace_id, RunPhase::Planning));
        let phase_started = Instant::now();

        let roles = self.dispatcher.registry().role_specs();
        let plan = match self
            .planner
            .create_plan(&recorder.request, &trace_id, &roles)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                sink.emit(RunEvent::failed(
                    &trace_id,
                    RunPhase::Planning,
                    ms(phase_started),
                    e.to_string(),
                ));
                let info = e.to_info([("phase", "planning"), ("trace_id", trace_id.as_str())]);
                return self.fail(recorder, sink.as_ref(), run_started, info);
            }
        };
        sink.emit(RunEvent::completed(
            &trace_id,
            RunPhase::Planning,
            ms(phase_started),
        ));

        let subtasks = plan.subtasks.clone();
        if let Err(e) = recorder.attach_plan(plan) {
            let info = e.to_info([("phase", "planning"), ("trace_id", trace_id.as_str())]);
            return self.fail(recorder, sink.as_ref(), run_started, info);
        }

        // === EXECUTE ===
        for (index, subtask) in subtasks.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    trace_id = %trace_id,
                    subtask_index = index,
                    "Cancellation observed before dispatch"
                );
                let info = OrchestrationError::Cancelled.to_info([
                    ("phase", "executing".to_string()),
                    ("subtask_index", index.to_string()),
                    ("trace_id", trace_id.clone()),
                ]);
                return self.fail(recorder, sink.as_ref(), run_started, info);
            }

            let phase = RunPhase::Subtask {
                index,
                worker_role: subtask.worker_role.clone(),
            };
            sink.emit(RunEvent::started(&trace_id, phase.clone()));

            let digest = recorder.context_digest();
            match self
                .dispatcher
                .dispatch(&trace_id, &recorder.request, index, subtask, digest)
                .await
            {
                Ok(result) => {
                    let failure = result.error.clone();
                    let duration_ms = result.duration_ms;

                    if let Err(e) = recorder.append_result(result) {
                        sink.emit(RunEvent::failed(
                            &trace_id,
                            phase,
                            duration_ms,
                            e.to_string(),
                        ));
                        let info = e.to_info([
                            ("phase", "executing".to_string()),
                            ("subtask_index", index.to_string()),
                            ("trace_id", trace_id.clone()),
                        ]);
                        return self.fail(recorder, sink.as_ref(), run_started, info);
                    }

                    match failure {
                        None => {
                            sink.emit(RunEvent::completed(&trace_id, phase, duration_ms));
                        }
                        Some(info) => {
                            sink.emit(RunEvent::failed(
                                &trace_id,
                                phase,
                                duration_ms,
                                info.message.clone(),
                            ));
                            if self.config.failure_policy == FailurePolicy::AbortOnFirstFailure {
                                warn!(
                                    trace_id = %trace_id,
                                    subtask_index = index,
                                    "Aborting on first subtask failure"
                                );
                                return self.fail(recorder, sink.as_ref(), run_started, info);
                            }
                        }
                    }
                }
                // Dispatcher errors are invariant violations (missing role
                // despite planner validation) and fail the run outright.
                Err(e) => {
                    sink.emit(RunEvent::failed(&trace_id, phase, 0, e.to_string()));
                    let info = e.to_info([
                        ("phase", "executing".to_string()),
                        ("subtask_index", index.to_string()),
                        ("trace_id", trace_id.clone()),
                    ]);
                    return self.fail(recorder, sink.as_ref(), run_started, info);
                }
            }
        }

        // === REPORT ===
        if cancel.is_cancelled() {
            info!(trace_id = %trace_id, "Cancellation observed before reporting");
            let info = OrchestrationError::Cancelled
                .to_info([("phase", "reporting"), ("trace_id", trace_id.as_str())]);
            return self.fail(recorder, sink.as_ref(), run_started, info);
        }
        if let Err(e) = recorder.start_reporting() {
            let info = e.to_info([("phase", "reporting"), ("trace_id", trace_id.as_str())]);
            return self.fail(recorder, sink.as_ref(), run_started, info);
        }
        sink.emit(RunEvent::started(&trace_id, RunPhase::Reporting));
        let phase_started = Instant::now();

        match self.reporter.report(&recorder).await {
            Ok(output) => {
                sink.emit(RunEvent::completed(
                    &trace_id,
                    RunPhase::Reporting,
                    ms(phase_started),
                ));
                if let Err(e) = recorder.finalize(output) {
                    let info =
                        e.to_info([("phase", "reporting"), ("trace_id", trace_id.as_str())]);
                    return self.fail(recorder, sink.as_ref(), run_started, info);
                }
            }
            Err(e) => {
                sink.emit(RunEvent::failed(
                    &trace_id,
                    RunPhase::Reporting,
                    ms(phase_started),
                    e.to_string(),
                ));
                let info = e.to_info([("phase", "reporting"), ("trace_id", trace_id.as_str())]);
                return self.fail(recorder, sink.as_ref(), run_started, info);
            }
        }

        info!(trace_id = %trace_id, "Run complete");
        sink.emit(RunEvent::completed(&trace_id, RunPhase::Run, ms(run_started)));
        recorder
    }

    fn fail(
        &self,
        mut recorder: TaskRecorder,
        sink: &dyn EventSink,
        run_started: Instant,
        info: ErrorInfo,
    ) -> TaskRecorder {
        warn!(
            trace_id = %recorder.trace_id,
            kind = ?info.kind,
            message = %info.message,
            "Run failed"
        );
        sink.emit(RunEvent::failed(
            recorder.trace_id.clone(),
            RunPhase::Run,
            ms(run_started),
            info.message.clone(),
        ));
        if recorder.abort(info).is_err() {
            debug!(trace_id = %recorder.trace_id, "Abort on terminal recorder ignored");
        }
        recorder
    }
}

fn ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn into_result(recorder: TaskRecorder) -> Result<TaskRecorder> {
    if recorder.status == RunStatus::Done {
        Ok(recorder)
    } else {
        let info = recorder.failure.clone().unwrap_or_else(|| {
            ErrorInfo::new(
                ErrorKind::InvalidTransition,
                "run ended in a non-terminal state",
            )
        });
        Err(OrchestrationError::RunFailed {
            info,
            recorder: Box::new(recorder),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brains::ScriptedBrain;
    use crate::dispatch::{StaticWorker, Worker, WorkerInput, WorkerOutput, WorkerRegistry};
    use crate::events::EventStatus;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    const THREE_STEP_PLAN: &str = r#"<analysis>
Fetch the data, compute the metrics, then summarize.
</analysis>
<plan>
[
  {"agent_name": "fetch", "task": "pull the company filings"},
  {"agent_name": "compute", "task": "derive the key ratios"},
  {"agent_name": "summarize", "task": "write up the findings"}
]
</plan>"#;

    fn fast_config() -> ExecutionConfig {
        ExecutionConfig {
            max_retries: 2,
            retry_delay: Duration::from_millis(0),
            call_timeout: Duration::from_secs(5),
            ..ExecutionConfig::default()
        }
    }

    struct CountingWorker {
        output: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Worker for CountingWorker {
        async fn invoke(&self, _input: &WorkerInput) -> crate::Result<WorkerOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WorkerOutput {
                output: self.output.clone(),
                trajectory: serde_json::Value::Null,
            })
        }
    }

    struct FailingWorker;

    #[async_trait]
    impl Worker for FailingWorker {
        async fn invoke(&self, _input: &WorkerInput) -> crate::Result<WorkerOutput> {
            Err(OrchestrationError::BrainInvocation("worker backend down".into()))
        }
    }

    /// Blocks until released; lets tests cancel a run mid-flight
    /// deterministically.
    struct GateWorker {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Worker for GateWorker {
        async fn invoke(&self, _input: &WorkerInput) -> crate::Result<WorkerOutput> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(WorkerOutput {
                output: "gated output".into(),
                trajectory: serde_json::Value::Null,
            })
        }
    }

    fn three_worker_registry() -> WorkerRegistry {
        let mut registry = WorkerRegistry::new();
        registry.register("fetch", Arc::new(StaticWorker::new("raw filings", "fetches data")));
        registry.register("compute", Arc::new(StaticWorker::new("ratio table", "computes metrics")));
        registry.register(
            "summarize",
            Arc::new(StaticWorker::new("short summary", "summarizes findings")),
        );
        registry
    }

    fn orchestrator(
        planner_brain: Arc<ScriptedBrain>,
        reporter_brain: Arc<ScriptedBrain>,
        registry: WorkerRegistry,
        config: ExecutionConfig,
    ) -> Orchestrator {
        Orchestrator::new(
            Planner::new(planner_brain, config.clone()),
            WorkerDispatcher::new(registry, config.clone()),
            Reporter::new(reporter_brain, config.clone()),
            config,
        )
    }

    #[tokio::test]
    async fn test_end_to_end_three_subtasks() {
        let planner_brain = Arc::new(ScriptedBrain::always(THREE_STEP_PLAN));
        let reporter_brain = Arc::new(ScriptedBrain::always("final synthesized report"));
        let orch = orchestrator(
            planner_brain,
            reporter_brain.clone(),
            three_worker_registry(),
            fast_config(),
        );

        let recorder = orch.run("analyze company X").await.unwrap();

        assert_eq!(recorder.status, RunStatus::Done);
        assert_eq!(recorder.final_output.as_deref(), Some("final synthesized report"));
        assert_eq!(recorder.results.len(), 3);
        for (i, result) in recorder.results.iter().enumerate() {
            assert_eq!(result.subtask_index, i);
            assert!(result.succeeded());
        }

        // Reporter saw all three outputs plus the plan analysis.
        let prompt = reporter_brain.recorded_prompts().pop().unwrap();
        assert!(prompt.contains("raw filings"));
        assert!(prompt.contains("ratio table"));
        assert!(prompt.contains("short summary"));
        assert!(prompt.contains("Fetch the data, compute the metrics"));
    }

    #[tokio::test]
    async fn test_empty_plan_skips_execution() {
        let planner_brain = Arc::new(ScriptedBrain::always(
            "<analysis>nothing to do</analysis><plan>[]</plan>",
        ));
        let reporter_brain = Arc::new(ScriptedBrain::always("empty-plan report"));
        let orch = orchestrator(
            planner_brain,
            reporter_brain.clone(),
            three_worker_registry(),
            fast_config(),
        );

        let recorder = orch
            .run_with_trace_id("no-op request", "run-fixed")
            .await
            .unwrap();
        assert_eq!(recorder.status, RunStatus::Done);
        assert_eq!(recorder.trace_id, "run-fixed");
        assert!(recorder.results.is_empty());
        assert_eq!(reporter_brain.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_planned_role_fails_before_any_dispatch() {
        let planner_brain = Arc::new(ScriptedBrain::always(
            r#"<analysis>x</analysis><plan>[{"agent_name": "chart", "task": "draw"}]</plan>"#,
        ));
        let reporter_brain = Arc::new(ScriptedBrain::always("unused"));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = WorkerRegistry::new();
        registry.register(
            "fetch",
            Arc::new(CountingWorker {
                output: "data".into(),
                calls: calls.clone(),
            }),
        );
        let orch = orchestrator(planner_brain, reporter_brain.clone(), registry, fast_config());

        let err = orch.run("req").await.unwrap_err();
        match err {
            OrchestrationError::RunFailed { info, recorder } => {
                assert_eq!(info.kind, ErrorKind::UnknownWorkerRole);
                assert_eq!(recorder.status, RunStatus::Failed);
                assert!(recorder.results.is_empty());
            }
            other => panic!("expected RunFailed, got {}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(reporter_brain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_on_first_failure_skips_reporter() {
        let planner_brain = Arc::new(ScriptedBrain::always(THREE_STEP_PLAN));
        let reporter_brain = Arc::new(ScriptedBrain::always("unused"));
        let mut registry = three_worker_registry();
        registry.register("fetch", Arc::new(FailingWorker));
        let config = fast_config().with_failure_policy(FailurePolicy::AbortOnFirstFailure);
        let orch = orchestrator(planner_brain, reporter_brain.clone(), registry, config);

        let err = orch.run("req").await.unwrap_err();
        match err {
            OrchestrationError::RunFailed { info, recorder } => {
                assert_eq!(info.kind, ErrorKind::BrainInvocation);
                assert_eq!(recorder.status, RunStatus::Failed);
                assert_eq!(recorder.results.len(), 1);
                assert!(recorder.results[0].error.is_some());
            }
            other => panic!("expected RunFailed, got {}", other),
        }
        assert_eq!(reporter_brain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_continue_with_partial_reaches_reporter() {
        let planner_brain = Arc::new(ScriptedBrain::always(THREE_STEP_PLAN));
        let reporter_brain = Arc::new(ScriptedBrain::always("best-effort report"));
        let mut registry = three_worker_registry();
        registry.register("compute", Arc::new(FailingWorker));
        let orch = orchestrator(
            planner_brain,
            reporter_brain.clone(),
            registry,
            fast_config(),
        );

        let recorder = orch.run("req").await.unwrap();
        assert_eq!(recorder.status, RunStatus::Done);
        assert_eq!(recorder.results.len(), 3);
        assert!(recorder.results[0].succeeded());
        assert!(recorder.results[1].error.is_some());
        assert!(recorder.results[2].succeeded());

        let prompt = reporter_brain.recorded_prompts().pop().unwrap();
        assert!(prompt.contains("[failed:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_timeout_converges_to_clean_final_state() {
        struct SlowOnceWorker {
            slow_calls_left: AtomicUsize,
        }

        #[async_trait]
        impl Worker for SlowOnceWorker {
            async fn invoke(&self, _input: &WorkerInput) -> crate::Result<WorkerOutput> {
                if self
                    .slow_calls_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok(WorkerOutput {
                    output: "raw filings".into(),
                    trajectory: serde_json::Value::Null,
                })
            }
        }

        let planner_brain = Arc::new(ScriptedBrain::always(THREE_STEP_PLAN));
        let reporter_brain = Arc::new(ScriptedBrain::always("final synthesized report"));
        let mut registry = three_worker_registry();
        registry.register(
            "fetch",
            Arc::new(SlowOnceWorker {
                slow_calls_left: AtomicUsize::new(1),
            }),
        );
        let orch = orchestrator(planner_brain, reporter_brain, registry, fast_config());

        let recorder = orch.run("analyze company X").await.unwrap();
        assert_eq!(recorder.status, RunStatus::Done);
        assert_eq!(recorder.results.len(), 3);
        assert!(recorder.results.iter().all(|r| r.succeeded()));
        assert_eq!(recorder.results[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_reporting_failure_aborts_run() {
        let planner_brain = Arc::new(ScriptedBrain::always(THREE_STEP_PLAN));
        let reporter_brain = Arc::new(ScriptedBrain::new(vec![
            Err(OrchestrationError::BrainInvocation("503".into())),
            Err(OrchestrationError::BrainInvocation("503".into())),
            Err(OrchestrationError::BrainInvocation("503".into())),
        ]));
        let orch = orchestrator(
            planner_brain,
            reporter_brain,
            three_worker_registry(),
            fast_config(),
        );

        let err = orch.run("req").await.unwrap_err();
        match err {
            OrchestrationError::RunFailed { info, recorder } => {
                assert_eq!(info.kind, ErrorKind::Reporting);
                assert_eq!(recorder.status, RunStatus::Failed);
                // All subtasks had succeeded before reporting failed.
                assert_eq!(recorder.results.len(), 3);
            }
            other => panic!("expected RunFailed, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_streaming_event_order_on_success() {
        let planner_brain = Arc::new(ScriptedBrain::always(THREE_STEP_PLAN));
        let reporter_brain = Arc::new(ScriptedBrain::always("final report"));
        let orch = orchestrator(
            planner_brain,
            reporter_brain,
            three_worker_registry(),
            fast_config(),
        );

        let mut run = orch.run_streamed("analyze company X");
        let mut events = Vec::new();
        while let Some(event) = run.next_event().await {
            assert_eq!(event.trace_id, run.trace_id());
            events.push((event.phase, event.status));
        }

        let expected = vec![
            (RunPhase::Run, EventStatus::Started),
            (RunPhase::Planning, EventStatus::Started),
            (RunPhase::Planning, EventStatus::Completed),
            (subtask_phase(0, "fetch"), EventStatus::Started),
            (subtask_phase(0, "fetch"), EventStatus::Completed),
            (subtask_phase(1, "compute"), EventStatus::Started),
            (subtask_phase(1, "compute"), EventStatus::Completed),
            (subtask_phase(2, "summarize"), EventStatus::Started),
            (subtask_phase(2, "summarize"), EventStatus::Completed),
            (RunPhase::Reporting, EventStatus::Started),
            (RunPhase::Reporting, EventStatus::Completed),
            (RunPhase::Run, EventStatus::Completed),
        ];
        assert_eq!(events, expected);

        let recorder = run.finish().await.unwrap();
        assert_eq!(recorder.status, RunStatus::Done);
    }

    fn subtask_phase(index: usize, role: &str) -> RunPhase {
        RunPhase::Subtask {
            index,
            worker_role: role.into(),
        }
    }

    #[tokio::test]
    async fn test_cancellation_between_subtasks() {
        let planner_brain = Arc::new(ScriptedBrain::always(THREE_STEP_PLAN));
        let reporter_brain = Arc::new(ScriptedBrain::always("unused"));

        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let third_calls = Arc::new(AtomicUsize::new(0));

        let mut registry = WorkerRegistry::new();
        registry.register("fetch", Arc::new(StaticWorker::new("raw filings", "")));
        registry.register(
            "compute",
            Arc::new(GateWorker {
                entered: entered.clone(),
                release: release.clone(),
            }),
        );
        registry.register(
            "summarize",
            Arc::new(CountingWorker {
                output: "never".into(),
                calls: third_calls.clone(),
            }),
        );

        let orch = orchestrator(
            planner_brain,
            reporter_brain.clone(),
            registry,
            fast_config(),
        );

        let run = orch.run_streamed("analyze company X");
        // Subtask 1 is in flight; cancel now, then let it finish.
        entered.notified().await;
        run.cancel();
        release.notify_one();

        let err = run.finish().await.unwrap_err();
        match err {
            OrchestrationError::RunFailed { info, recorder } => {
                assert_eq!(info.kind, ErrorKind::Cancelled);
                assert_eq!(recorder.status, RunStatus::Failed);
                // Subtasks 0 and 1 completed; no third dispatch.
                assert_eq!(recorder.results.len(), 2);
                assert_eq!(recorder.results[1].output, "gated output");
            }
            other => panic!("expected RunFailed, got {}", other),
        }
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
        assert_eq!(reporter_brain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_share_state() {
        let planner_brain = Arc::new(ScriptedBrain::always(THREE_STEP_PLAN));
        let reporter_brain = Arc::new(ScriptedBrain::always("final report"));
        let orch = orchestrator(
            planner_brain,
            reporter_brain,
            three_worker_registry(),
            fast_config(),
        );

        let a = orch.run_streamed("request A");
        let b = orch.run_streamed("request B");
        assert_ne!(a.trace_id(), b.trace_id());

        let ra = a.finish().await.unwrap();
        let rb = b.finish().await.unwrap();
        assert_eq!(ra.request, "request A");
        assert_eq!(rb.request, "request B");
        assert_eq!(ra.results.len(), 3);
        assert_eq!(rb.results.len(), 3);
    }
}
