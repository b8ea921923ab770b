//! Raw OpenAI-compatible chat-completions streaming client — §4.G, §6.
//!
//! Grounded on `examples/original_source/llm_lmstudio/llm_handler.py`'s
//! `requests.Session().post(..., stream=True)` + `iter_lines()` loop, rather
//! than the teacher's RIG/Ollama `Agent` (see `DESIGN.md` for why RIG was
//! dropped). Uses `reqwest`'s `blocking` client, already in the teacher's
//! dependency set for this reason: §5 requires the LLM read loop to run
//! inside the orchestrator's own call frame, no dedicated thread.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::conversation::{Message, Role};
use crate::error::NetworkError;
use crate::token_parser::TokenOutcome;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(3050);

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    stream: bool,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChunkChoice>,
}

#[derive(Deserialize)]
struct ChatChunkChoice {
    #[serde(default)]
    delta: ChatChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatChunkDelta {
    content: Option<String>,
}

/// Streaming chat-completions client with mid-stream `abort()`.
///
/// `aborted` is reset at the start of every `generate_response` call and
/// polled once per SSE line, independent of whatever the caller's `on_token`
/// does — belt-and-suspenders against a caller that forgets to check
/// cancellation itself.
pub struct LlmClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    aborted: Arc<AtomicBool>,
}

impl LlmClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, temperature: f32) -> Result<Self, NetworkError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            // Read timeout intentionally unbounded: streams can run for as
            // long as the assistant is speaking.
            .build()
            .map_err(NetworkError::ConnectFailed)?;

        Ok(Self { http, endpoint: endpoint.into(), model: model.into(), temperature, aborted: Arc::new(AtomicBool::new(false)) })
    }

    /// Idempotent, safe from any thread. Sets a flag the active read loop
    /// checks before every line; it does not forcibly close the socket, so a
    /// response already fully buffered by the OS may still emit one more
    /// token before the flag is observed.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Post the system prompt + conversation history, stream tokens through
    /// `on_token`. Returns `TokenOutcome::Cancelled` if `abort()` was called
    /// or `on_token` itself reports cancellation; otherwise `Continue` once
    /// the stream ends normally (`finish_reason` set or `[DONE]`).
    pub fn generate_response(
        &self,
        system_prompt: &str,
        history: &[Message],
        mut on_token: impl FnMut(&str) -> TokenOutcome,
    ) -> Result<TokenOutcome, NetworkError> {
        self.aborted.store(false, Ordering::SeqCst);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatRequestMessage { role: "system", content: system_prompt });
        for msg in history {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(ChatRequestMessage { role, content: &msg.text });
        }

        let body = ChatRequest { model: &self.model, messages, stream: true, temperature: self.temperature };

        let response = self.http.post(&self.endpoint).json(&body).send().map_err(NetworkError::ConnectFailed)?;

        let reader = std::io::BufReader::new(response);
        for line in reader.lines() {
            if self.aborted.load(Ordering::SeqCst) {
                debug!("LLM stream aborted");
                return Ok(TokenOutcome::Cancelled);
            }

            let line = line?;
            let Some(payload) = line.strip_prefix("data: ") else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }
            if payload == "[DONE]" {
                break;
            }

            let chunk: ChatChunk = serde_json::from_str(payload).map_err(|e| NetworkError::MalformedChunk(e.to_string()))?;

            let Some(choice) = chunk.choices.into_iter().next() else {
                continue;
            };

            if let Some(content) = choice.delta.content
                && !content.is_empty()
                && on_token(&content) == TokenOutcome::Cancelled
            {
                return Ok(TokenOutcome::Cancelled);
            }

            if choice.finish_reason.is_some() {
                break;
            }
        }

        Ok(TokenOutcome::Continue)
    }
}

impl Drop for LlmClient {
    fn drop(&mut self) {
        if self.aborted.load(Ordering::Relaxed) {
            warn!("LlmClient dropped mid-abort");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_flag_round_trips() {
        let client = LlmClient::new("http://localhost:1/v1/chat/completions", "test-model", 0.7).unwrap();
        assert!(!client.aborted.load(Ordering::SeqCst));
        client.abort();
        assert!(client.aborted.load(Ordering::SeqCst));
    }
}
