//! Streaming LLM client: OpenAI-compatible chat-completions over a blocking
//! HTTP client with mid-stream abort.

mod client;

pub use client::LlmClient;
