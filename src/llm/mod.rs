//! LLM post-processing — cleans up raw transcripts before injection.
//!
//! Active only when the effective processing mode is `llm`. The pipeline
//! treats cleanup as best-effort: a processor failure surfaces through the
//! error mailbox and the raw transcript is injected unchanged.
//!
//! * [`Processor`] — async contract implemented by provider adapters.
//! * [`OpenAiProcessor`] — chat-completions adapter with per-level prompts.

pub mod openai;

pub use openai::OpenAiProcessor;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::LlmConfig;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors from the LLM cleanup step.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport or connection error.
    #[error("LLM request failed: {0}")]
    Request(String),

    /// The request did not complete within the processor timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// The provider answered with a non-success status.
    #[error("LLM provider error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response carried no usable text.
    #[error("LLM returned an empty response")]
    EmptyResponse,

    /// No adapter exists for the configured provider.
    #[error("unsupported LLM provider: {0}")]
    UnsupportedProvider(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Processor contract
// ---------------------------------------------------------------------------

/// Transcript cleanup contract.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Clean up `text`. Empty input is returned unchanged without a call.
    async fn process(&self, cancel: CancellationToken, text: &str) -> Result<String, LlmError>;
}

/// Build a processor for the configured provider.
pub fn for_config(config: &LlmConfig) -> Result<Box<dyn Processor>, LlmError> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiProcessor::from_config(config))),
        other => Err(LlmError::UnsupportedProvider(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// MockProcessor  (test-only)
// ---------------------------------------------------------------------------

/// Test double with a fixed response.
#[cfg(test)]
pub struct MockProcessor {
    response: Result<String, String>,
}

#[cfg(test)]
impl MockProcessor {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err("mock llm failure".into()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Processor for MockProcessor {
    async fn process(&self, _cancel: CancellationToken, text: &str) -> Result<String, LlmError> {
        if text.is_empty() {
            return Ok(String::new());
        }
        match &self.response {
            Ok(cleaned) => Ok(cleaned.clone()),
            Err(message) => Err(LlmError::Request(message.clone())),
        }
    }
}
