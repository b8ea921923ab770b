//! Conversation history — §3, §4.J, §11.
//!
//! Grounded on `examples/original_source/lib/conversation.py`. Append-only
//! ordered sequence of (role, text) pairs, plus the two derived read
//! operations: last-N-user merge and token-budget truncate.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Used when the coalescer times out with no utterance (§4.E). Silence
/// messages are skipped by the merge-trailing-users transform so a string of
/// silent turns doesn't get glued onto real user text.
pub const SILENCE_SENTINEL: &str = "(says nothing)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

/// Append-only conversation history with a configurable trailing-user merge
/// limit and a token budget used by `truncate`.
pub struct Conversation {
    history: Vec<Message>,
    max_tokens: usize,
    user_merge_limit: usize,
    debug_stats: bool,
}

impl Conversation {
    pub fn new(max_tokens: usize, user_merge_limit: usize, debug_stats: bool) -> Self {
        Self { history: Vec::new(), max_tokens, user_merge_limit, debug_stats }
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.history.push(Message { role: Role::User, text: text.into() });
    }

    pub fn add_assistant_message(&mut self, text: impl Into<String>) {
        self.history.push(Message { role: Role::Assistant, text: text.into() });
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Raw history, no merge applied. Used for persistence (§6/§11) where we
    /// want the literal turn-by-turn record, not the collapsed view.
    pub fn raw_history(&self) -> &[Message] {
        &self.history
    }

    /// Collapse a run of ≥2 trailing user messages (ignoring the silence
    /// sentinel, bounded by `user_merge_limit`) into one user message whose
    /// text is their temporal-order concatenation. Mutates `self.history` —
    /// the merge is idempotent, so persisting it is harmless, and matches the
    /// original's "persistent on every get_history() call" behavior.
    pub fn get_history(&mut self) -> &[Message] {
        let mut accumulated: Vec<String> = Vec::new();
        for msg in self.history.iter().rev() {
            if msg.role != Role::User || accumulated.len() >= self.user_merge_limit {
                break;
            }
            accumulated.push(msg.text.clone());
        }

        if accumulated.len() >= 2 {
            let keep = self.history.len() - accumulated.len();
            self.history.truncate(keep);
            accumulated.reverse();
            let merged = accumulated.into_iter().filter(|t| t != SILENCE_SENTINEL).collect::<Vec<_>>().join(" ");
            if !merged.is_empty() {
                self.history.push(Message { role: Role::User, text: merged });
            }
        }

        &self.history
    }

    /// Drop oldest messages until `system_prompt` + retained messages fit
    /// `max_tokens`. Never drops a message partially. Tokens are counted with
    /// `count_tokens`, a pluggable approximation (see `default_token_count`).
    pub fn truncate(&mut self, system_prompt: &str, count_tokens: impl Fn(&str) -> usize) -> usize {
        let system_tokens = count_tokens(system_prompt);
        let mut total_tokens = system_tokens;
        let mut truncated: Vec<Message> = Vec::new();

        for msg in self.history.iter().rev() {
            let msg_tokens = count_tokens(&msg.text);
            if total_tokens + msg_tokens <= self.max_tokens {
                truncated.push(msg.clone());
                total_tokens += msg_tokens;
            } else {
                break;
            }
        }
        truncated.reverse();

        let removed = self.history.len() - truncated.len();
        self.history = truncated;

        if self.debug_stats {
            let history_tokens = total_tokens - system_tokens;
            let fill_pct = (total_tokens as f64 / self.max_tokens as f64) * 100.0;
            debug!(
                total_tokens,
                max_tokens = self.max_tokens,
                fill_pct,
                system_tokens,
                history_tokens,
                remaining = self.max_tokens.saturating_sub(total_tokens),
                removed,
                "conversation truncated"
            );
        }

        total_tokens
    }
}

/// Cheap whitespace-word-count approximation, used when no real tokenizer is
/// wired up. The original Python took an injectable `count_tokens_func` for
/// the same reason — callers can swap this for a model-specific tokenizer.
pub fn default_token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_collapses_trailing_user_messages() {
        let mut c = Conversation::new(1000, 4, false);
        c.add_user_message("hello");
        c.add_user_message("are you there");
        c.add_user_message("hello??");
        let history = c.get_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "hello are you there hello??");
    }

    #[test]
    fn merge_stops_at_non_user_boundary() {
        let mut c = Conversation::new(1000, 4, false);
        c.add_user_message("first");
        c.add_assistant_message("reply");
        c.add_user_message("second");
        c.add_user_message("third");
        let history = c.get_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].text, "second third");
    }

    #[test]
    fn single_trailing_user_message_is_not_merged() {
        let mut c = Conversation::new(1000, 4, false);
        c.add_assistant_message("hi");
        c.add_user_message("only one");
        let history = c.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text, "only one");
    }

    #[test]
    fn merge_skips_silence_sentinel_messages() {
        let mut c = Conversation::new(1000, 4, false);
        c.add_user_message("are you there");
        c.add_user_message(SILENCE_SENTINEL);
        c.add_user_message("hello??");
        let history = c.get_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "are you there hello??");
    }

    #[test]
    fn merge_limit_bounds_how_far_back_it_looks() {
        let mut c = Conversation::new(1000, 2, false);
        c.add_user_message("a");
        c.add_user_message("b");
        c.add_user_message("c");
        let history = c.get_history();
        // Only the last 2 user messages merge; "a" stays separate.
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "a");
        assert_eq!(history[1].text, "b c");
    }

    #[test]
    fn truncate_never_increases_total_and_never_exceeds_budget() {
        let mut c = Conversation::new(5, 4, false);
        for i in 0..20 {
            c.add_user_message(format!("word{i}"));
        }
        let total = c.truncate("sys", default_token_count);
        assert!(total <= 5);
    }

    #[test]
    fn truncate_never_drops_a_message_partially() {
        let mut c = Conversation::new(3, 4, false);
        c.add_user_message("one two three");
        c.add_user_message("four");
        c.truncate("", default_token_count);
        for msg in c.raw_history() {
            assert!(!msg.text.is_empty());
        }
    }

    #[test]
    fn empty_history_truncates_to_system_tokens_only() {
        let mut c = Conversation::new(100, 4, false);
        let total = c.truncate("a system prompt here", default_token_count);
        assert_eq!(total, default_token_count("a system prompt here"));
    }
}
