//! Utterance coalescer — §4.E.
//!
//! Turns rapid-fire STT finalizations into a single user turn. First call
//! blocks indefinitely (§9 open question: the "press Enter to begin" gate);
//! every subsequent call uses `silence_timeout` and returns the silence
//! sentinel on timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::conversation::SILENCE_SENTINEL;
use crate::signals::BargeController;

pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct UtteranceCoalescer {
    controller: Arc<BargeController>,
    silence_timeout: Duration,
    is_first_turn: bool,
}

impl UtteranceCoalescer {
    pub fn new(controller: Arc<BargeController>, silence_timeout: Duration) -> Self {
        Self { controller, silence_timeout, is_first_turn: true }
    }

    /// Block for the user's next turn. Drains and merges any utterances that
    /// arrived while we were still draining the first one (S2).
    pub fn next_turn(&mut self) -> String {
        let first = if self.is_first_turn {
            self.is_first_turn = false;
            self.controller.recv_utterance_blocking()
        } else {
            self.controller.recv_utterance_timeout(self.silence_timeout)
        };

        let Some(first) = first else {
            return SILENCE_SENTINEL.to_string();
        };

        let mut parts = vec![first];
        parts.extend(self.controller.try_drain_utterances());
        collapse_whitespace(&parts.join(" "))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_rapid_fire_utterances_into_one_turn() {
        let controller = BargeController::new();
        let mut coalescer = UtteranceCoalescer::new(controller.clone(), Duration::from_millis(50));

        controller.push_utterance("hello".to_string());
        controller.push_utterance("are you there".to_string());
        controller.push_utterance("hello??".to_string());

        // First turn blocks on recv; the pushes above are already queued so
        // it returns immediately, then drains the rest non-blocking.
        let turn = coalescer.next_turn();
        assert_eq!(turn, "hello are you there hello??");
    }

    #[test]
    fn subsequent_turn_times_out_to_silence_sentinel() {
        let controller = BargeController::new();
        let mut coalescer = UtteranceCoalescer::new(controller, Duration::from_millis(20));
        coalescer.is_first_turn = false;
        let turn = coalescer.next_turn();
        assert_eq!(turn, SILENCE_SENTINEL);
    }

    #[test]
    fn collapses_internal_whitespace() {
        assert_eq!(collapse_whitespace("  hello   world  "), "hello world");
    }
}
