//! Reasoning backends ("brains")
//!
//! The planner and reporter are backed by an opaque async collaborator that
//! accepts a prompt and returns text. The orchestration core has no opinion
//! about what produces that text — an LLM API, a rules engine, or a script.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::OrchestrationError;
use crate::Result;

pub mod http;
pub use http::GeminiBrain;

/// Opaque reasoning backend: structured prompt in, raw text out. May fail or
/// time out; the caller owns retries and deadlines.
#[async_trait]
pub trait Brain: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

/// Scripted brain for development and testing. Keeps the pipeline functional
/// without a reasoning backend: returns canned responses in order, records
/// every prompt it sees, and counts invocations.
pub struct ScriptedBrain {
    responses: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBrain {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A brain that answers every prompt with the same text.
    pub fn always(response: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(response.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts seen so far, in call order.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }
}

#[async_trait]
impl Brain for ScriptedBrain {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());

        let next = self.responses.lock().expect("script poisoned").pop_front();
        match next {
            Some(response) => response,
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(OrchestrationError::BrainInvocation(
                    "scripted brain has no responses left".into(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let brain = ScriptedBrain::new(vec![
            Ok("first".to_string()),
            Err(OrchestrationError::Timeout("second call".into())),
            Ok("third".to_string()),
        ]);

        assert_eq!(brain.invoke("a").await.unwrap(), "first");
        assert!(matches!(
            brain.invoke("b").await,
            Err(OrchestrationError::Timeout(_))
        ));
        assert_eq!(brain.invoke("c").await.unwrap(), "third");
        assert!(matches!(
            brain.invoke("d").await,
            Err(OrchestrationError::BrainInvocation(_))
        ));
        assert_eq!(brain.call_count(), 4);
    }

    #[tokio::test]
    async fn test_always_brain_and_prompt_recording() {
        let brain = ScriptedBrain::always("same answer");
        assert_eq!(brain.invoke("one").await.unwrap(), "same answer");
        assert_eq!(brain.invoke("two").await.unwrap(), "same answer");

        let prompts = brain.recorded_prompts();
        assert_eq!(prompts, vec!["one".to_string(), "two".to_string()]);
    }
}
