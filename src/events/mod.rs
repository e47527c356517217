//! Run events and sinks
//!
//! Ordered phase-transition and per-subtask events, correlated by trace_id.
//! Sinks receive events synchronously in emission order; the streaming
//! execution mode is a channel sink that the caller drains.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

/// Which part of the run an event describes.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// The run as a whole (session start / end).
    Run,
    Planning,
    Subtask { index: usize, worker_role: String },
    Reporting,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
    pub phase: RunPhase,
    pub status: EventStatus,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl RunEvent {
    pub fn started(trace_id: impl Into<String>, phase: RunPhase) -> Self {
        Self {
            trace_id: trace_id.into(),
            timestamp: Utc::now(),
            phase,
            status: EventStatus::Started,
            duration_ms: None,
            error: None,
        }
    }

    pub fn completed(trace_id: impl Into<String>, phase: RunPhase, duration_ms: u64) -> Self {
        Self {
            trace_id: trace_id.into(),
            timestamp: Utc::now(),
            phase,
            status: EventStatus::Completed,
            duration_ms: Some(duration_ms),
            error: None,
        }
    }

    pub fn failed(
        trace_id: impl Into<String>,
        phase: RunPhase,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            timestamp: Utc::now(),
            phase,
            status: EventStatus::Failed,
            duration_ms: Some(duration_ms),
            error: Some(error.into()),
        }
    }
}

/// Receives ordered run events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Drops everything.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: RunEvent) {}
}

/// Logs every event through `tracing`.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: RunEvent) {
        info!(
            trace_id = %event.trace_id,
            phase = ?event.phase,
            status = ?event.status,
            duration_ms = event.duration_ms,
            error = event.error.as_deref(),
            "Run event"
        );
    }
}

/// Forwards events into an unbounded channel; the streaming run hands the
/// receiving half to the caller. A dropped receiver silently ends delivery.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}

/// Duplicates events to several sinks in order.
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: RunEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
