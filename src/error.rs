//! Structured error types for the pieces of the system callers need to match on.
//!
//! Most code propagates `anyhow::Result` with `.context(...)` (see the teacher's
//! `config/config.rs`). These `thiserror` enums exist for the three error kinds
//! §7 of the spec calls out as needing distinct handling policies: config
//! errors are fatal at startup, device errors disable a subsystem or panic-stop
//! a turn without killing the process, network errors abort the current turn.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal at startup; surfaced to the user and the process exits non-zero.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("prompt file not found: {0}")]
    PromptFileMissing(PathBuf),

    #[error("tts config file not found: {0}")]
    TtsConfigMissing(PathBuf),

    #[error("required reference file not found: {0}")]
    ReferenceMissing(PathBuf),

    #[error("invalid prompt file: {0}")]
    InvalidPromptFile(#[source] serde_json::Error),

    #[error("invalid tts config file: {0}")]
    InvalidTtsConfig(#[source] serde_json::Error),

    #[error("model directory does not exist: {0}")]
    ModelDirMissing(PathBuf),
}

/// Mic/speaker open, read, or write failures.
///
/// A mic-open failure disables the watcher silently (the thread logs and
/// exits); a speaker error during a turn panic-stops the current turn but
/// never terminates the process.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no input device available")]
    NoInputDevice,

    #[error("no output device available")]
    NoOutputDevice,

    #[error("failed to open audio stream: {0}")]
    OpenFailed(String),

    #[error("audio stream error: {0}")]
    StreamError(String),
}

/// LLM request/stream failure. The orchestrator aborts the current turn,
/// does not append assistant text, and returns to `Listening`.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to connect to LLM endpoint: {0}")]
    ConnectFailed(#[source] reqwest::Error),

    #[error("LLM stream I/O error: {0}")]
    StreamIo(#[from] std::io::Error),

    #[error("malformed SSE chunk: {0}")]
    MalformedChunk(String),
}
