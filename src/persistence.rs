//! Per-turn output log — §6, §11.
//!
//! Grounded on `examples/original_source/llm_lmstudio/llm_handler.py`'s
//! `write_payload` (dump the message history to disk after each turn) and
//! the web control surface's `outputs/<scenario>_<gender>_<timestamp>.txt`
//! convention — the HTTP surface itself is out of scope (§1 Non-goals), but
//! the idea of a durable per-turn record is named explicitly in spec.md §6
//! ("Persisted state").

use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::conversation::{Conversation, Message};

#[derive(Serialize)]
struct OutputLog<'a> {
    system_prompt: &'a str,
    messages: &'a [Message],
}

/// Write the full message history (system prompt + raw turn-by-turn record,
/// not the merged view) as pretty JSON to `path`. Best-effort: a write
/// failure is logged, not propagated, since losing the log must never abort
/// a turn that already completed successfully.
pub fn persist_turn(path: &Path, system_prompt: &str, conversation: &Conversation) {
    let log = OutputLog { system_prompt, messages: conversation.raw_history() };
    let json = match serde_json::to_string_pretty(&log) {
        Ok(json) => json,
        Err(e) => {
            warn!("failed to serialize output log: {e}");
            return;
        }
    };
    if let Err(e) = std::fs::write(path, json) {
        warn!("failed to write output log to {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tempfile() -> std::path::PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("persistence-test-{}-{n}.json", std::process::id()))
    }

    #[test]
    fn writes_system_prompt_and_history_as_pretty_json() {
        let mut conversation = Conversation::new(1000, 4, false);
        conversation.add_user_message("hello");
        conversation.add_assistant_message("hi there");

        let path = tempfile();
        persist_turn(&path, "you are helpful", &conversation);

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["system_prompt"], "you are helpful");
        assert_eq!(parsed["messages"][0]["text"], "hello");
        assert_eq!(parsed["messages"][1]["text"], "hi there");

        let _ = std::fs::remove_file(&path);
    }
}
