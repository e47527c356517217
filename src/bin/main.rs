use std::sync::Arc;

use analysis_agent_orchestrator::{
    brains::{Brain, GeminiBrain, ScriptedBrain},
    dispatch::{BrainWorker, StaticWorker, WorkerDispatcher, WorkerRegistry},
    planner::{Planner, StaticExampleLibrary},
    reporter::Reporter,
    ExecutionConfig, Orchestrator,
};
use tracing::info;

const DEMO_PLAN: &str = r#"<analysis>
The request asks for a company analysis: fetch the raw figures first,
derive the key metrics from them, then write the findings up.
</analysis>
<plan>
[
  {"agent_name": "fetch", "task": "Retrieve the latest quarterly figures for the company"},
  {"agent_name": "compute", "task": "Derive growth and margin metrics from the fetched figures"},
  {"agent_name": "summarize", "task": "Write a short narrative of the findings"}
]
</plan>"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Analysis Agent Orchestrator starting");

    let config = ExecutionConfig::from_env();

    // With a GEMINI_API_KEY every stage runs against the real backend;
    // otherwise scripted brains keep the demo self-contained.
    let use_remote = std::env::var("GEMINI_API_KEY").is_ok();
    let (planner_brain, reporter_brain): (Arc<dyn Brain>, Arc<dyn Brain>) = if use_remote {
        let brain: Arc<dyn Brain> = Arc::new(GeminiBrain::from_env()?);
        (brain.clone(), brain)
    } else {
        (
            Arc::new(ScriptedBrain::always(DEMO_PLAN)),
            Arc::new(ScriptedBrain::always(
                "Revenue grew 8% quarter over quarter with stable margins; \
                 no liquidity concerns were found in the fetched figures.",
            )),
        )
    };

    let mut registry = WorkerRegistry::new();
    if use_remote {
        let brain: Arc<dyn Brain> = Arc::new(GeminiBrain::from_env()?);
        registry.register(
            "fetch",
            Arc::new(BrainWorker::new(brain.clone(), "retrieves raw figures and filings")),
        );
        registry.register(
            "compute",
            Arc::new(BrainWorker::new(brain.clone(), "derives metrics from fetched data")),
        );
        registry.register(
            "summarize",
            Arc::new(BrainWorker::new(brain, "writes narrative summaries")),
        );
    } else {
        registry.register(
            "fetch",
            Arc::new(StaticWorker::new(
                "Q1 revenue 12.4M, Q2 revenue 13.4M, gross margin 41% both quarters",
                "retrieves raw figures and filings",
            )),
        );
        registry.register(
            "compute",
            Arc::new(StaticWorker::new(
                "QoQ revenue growth 8.1%; margin unchanged at 41%",
                "derives metrics from fetched data",
            )),
        );
        registry.register(
            "summarize",
            Arc::new(StaticWorker::new(
                "Steady growth with flat margins.",
                "writes narrative summaries",
            )),
        );
    }

    let examples = StaticExampleLibrary::new(vec![(
        "analyze the revenue trend of a listed company".to_string(),
        "fetch the quarterly figures, compute growth rates, then summarize".to_string(),
    )]);

    let orchestrator = Orchestrator::new(
        Planner::new(planner_brain, config.clone()).with_retriever(Arc::new(examples)),
        WorkerDispatcher::new(registry, config.clone()),
        Reporter::new(reporter_brain, config.clone()),
        config,
    );

    let request = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Analyze the recent performance of company X".to_string());

    match orchestrator.run(&request).await {
        Ok(recorder) => {
            println!("\n=== RUN {} ===", recorder.trace_id);
            if let Some(plan) = &recorder.plan {
                println!("Plan analysis: {}", plan.analysis.trim());
                for (i, subtask) in plan.subtasks.iter().enumerate() {
                    println!("  {}. [{}] {}", i + 1, subtask.worker_role, subtask.instruction);
                }
            }
            println!("\nSubtask results:");
            for result in &recorder.results {
                println!(
                    "  {}. [{}] {} ({} ms, {} attempt(s))",
                    result.subtask_index + 1,
                    result.worker_role,
                    result.output,
                    result.duration_ms,
                    result.attempts
                );
            }
            println!("\n=== FINAL REPORT ===");
            println!("{}", recorder.final_output.unwrap_or_default());
            Ok(())
        }
        Err(e) => {
            eprintln!("Run failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
