//! Text generation seam
//!
//! Services only see the `TextGenerator` trait. A remote failure never
//! surfaces as an error here: it is folded into a sentinel string so the
//! extraction chain can degrade instead of aborting.

use crate::config::SamplingParams;
use crate::error::InsightError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiClient;

/// Prefix of every reply produced from a transport or service failure
pub const ERROR_MARKER: &str = "Error generating response:";

/// Reply when the service answered but produced no candidate text
pub const UNABLE_TO_GENERATE: &str = "Unable to generate response";

/// One generation call. Built per call, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub sampling: SamplingParams,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32, sampling: SamplingParams) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            sampling,
        }
    }
}

/// Raw text, or the failure that prevented getting any
#[derive(Debug)]
pub enum GenerationOutcome {
    Text(String),
    Failed(InsightError),
}

impl GenerationOutcome {
    /// Collapse into the text handed to the extraction chain
    pub fn into_text(self) -> String {
        match self {
            GenerationOutcome::Text(text) => text,
            GenerationOutcome::Failed(error) => format!("{} {}", ERROR_MARKER, error),
        }
    }
}

/// True for replies produced by a failed or empty generation
pub fn is_failure_sentinel(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with(ERROR_MARKER) || trimmed == UNABLE_TO_GENERATE
}

/// Short SHA-256 fingerprint of a prompt, logged in place of its content
pub fn prompt_digest(prompt: &str) -> String {
    let hash = Sha256::digest(prompt.as_bytes());
    hex::encode(&hash[..8])
}

/// Anything that can turn a prompt into text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single attempt. Failures come back as sentinel text, never as errors.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> String;
}

/// Deterministic generator for tests and offline runs.
/// Replies are served in order; once exhausted, the fallback reply repeats.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<(String, u32)>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: UNABLE_TO_GENERATE.to_string(),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Same reply for every call
    pub fn repeating(reply: impl Into<String>) -> Self {
        let mut generator = Self::new(Vec::<String>::new());
        generator.fallback = reply.into();
        generator
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, with their token budgets
    pub async fn prompts(&self) -> Vec<(String, u32)> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .await
            .push((prompt.to_string(), max_tokens));

        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
