//! OpenAI chat-completions adapter for transcript cleanup.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{InterventionLevel, LlmConfig};

use super::{LlmError, Processor};

/// Bound on a single cleanup call; transcripts are short.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const MINIMAL_PROMPT: &str = "\
You are a speech-to-text proofreader. Make only minor corrections to the transcribed text.

Rules:
- Fix obvious typos and transcription errors
- Correct basic punctuation (periods, commas, question marks)
- Fix capitalization at sentence starts and for proper nouns
- Do NOT remove filler words or restructure sentences
- Do NOT change word choice or rephrase anything
- Preserve the speaker's exact wording as much as possible
- Output only the corrected text with no explanations";

const MODERATE_PROMPT: &str = "\
You are a speech-to-text cleanup assistant. Clean up the transcribed speech while preserving the speaker's voice.

Rules:
- Remove filler words (um, uh, erm, like, you know, so, basically, etc.)
- Remove false starts, stutters, and repetitions
- Fix punctuation and capitalization
- Keep the original sentence structure where possible
- Maintain the speaker's word choices and expressions
- Do not add information not present in the original
- Output only the cleaned text with no explanations";

const THOROUGH_PROMPT: &str = "\
You are a speech-to-text editor. Rewrite the transcribed speech to be clear and coherent.

Rules:
- Remove all filler words, hesitations, and verbal tics
- Remove false starts, stutters, and repetitions
- Restructure run-on sentences for clarity
- Improve flow and readability while preserving meaning
- Combine fragmented thoughts into complete sentences
- Maintain the original intent and key information
- Keep a natural, conversational tone
- Do not add information not present in the original
- Output only the rewritten text with no explanations";

/// System prompt for a configured intervention level.
fn prompt_for_level(level: InterventionLevel, custom_prompt: &str) -> &str {
    match level {
        InterventionLevel::Minimal => MINIMAL_PROMPT,
        InterventionLevel::Moderate => MODERATE_PROMPT,
        InterventionLevel::Thorough => THOROUGH_PROMPT,
        InterventionLevel::Custom => {
            if custom_prompt.is_empty() {
                MODERATE_PROMPT
            } else {
                custom_prompt
            }
        }
    }
}

/// Cleans transcripts through OpenAI's `/v1/chat/completions`.
pub struct OpenAiProcessor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    level: InterventionLevel,
    custom_prompt: String,
}

impl OpenAiProcessor {
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key: config.effective_api_key(),
            model: config.model.clone(),
            level: config.level,
            custom_prompt: config.custom_prompt.clone(),
        }
    }
}

#[async_trait]
impl Processor for OpenAiProcessor {
    async fn process(&self, cancel: CancellationToken, text: &str) -> Result<String, LlmError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt_for_level(self.level, &self.custom_prompt) },
                { "role": "user",   "content": text }
            ],
            "max_tokens": 2048,
            "temperature": 0.3
        });

        let started = std::time::Instant::now();
        let request = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::select! {
            response = request => response?,
            _ = cancel.cancelled() => return Err(LlmError::Timeout),
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let cleaned = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LlmError::EmptyResponse)?
            .trim()
            .to_string();

        if cleaned.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        log::debug!(
            "llm-openai: processed in {:?}: {:?} -> {:?}",
            started.elapsed(),
            text,
            cleaned
        );
        Ok(cleaned)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
