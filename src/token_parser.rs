//! Token-stream parser — §4.F.
//!
//! Splits the LLM's UTF-8 token stream into plain text and `[emotion]` tags,
//! feeding the former to a `SentenceQueue` and raising an emotion-change event
//! on the latter. Also owns the running `display_text`/`assistant_text`
//! accumulators the orchestrator appends to conversation history.
//!
//! Replaces the original's exception-based `RuntimeError("CancelledByBargeIn")`
//! with an explicit `TokenOutcome`, per the design note in §9: the orchestrator
//! branches on a value instead of unwinding.

use crate::sentence::SentenceQueue;
use crate::signals::BargeController;
use std::sync::Arc;

/// Emitted once per token/flush call so the orchestrator can decide whether to
/// keep streaming or stop and run the cancel path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    Continue,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Plain,
    InEmotion,
}

/// One LLM stream's worth of parsing state. Constructed fresh per turn
/// (§4.K step 3: "Reset parser state").
pub struct TokenParser {
    state: ParseState,
    emotion_buf: String,
    at_line_start: bool,
    /// Set when a whitespace run has been seen but not yet confirmed by a
    /// following non-whitespace character — collapsing a run to a single
    /// space requires knowing it before the space is actually emitted, so
    /// this carries across characters *and* across `push_token` calls
    /// (whitespace and the text that follows it can arrive in separate
    /// tokens).
    pending_space: bool,
    display_text: String,
    assistant_text: String,
    valid_emotions: Vec<String>,
    sentences: Arc<SentenceQueue>,
    controller: Arc<BargeController>,
}

impl TokenParser {
    pub fn new(sentences: Arc<SentenceQueue>, controller: Arc<BargeController>, valid_emotions: Vec<String>) -> Self {
        Self {
            state: ParseState::Plain,
            emotion_buf: String::new(),
            at_line_start: true,
            pending_space: false,
            display_text: String::new(),
            assistant_text: String::new(),
            valid_emotions,
            sentences,
            controller,
        }
    }

    /// Normalizes one plain-text character against `pending_space`/
    /// `at_line_start`: collapse runs of whitespace to a single space, drop
    /// newlines, strip leading whitespace at a sentence start. Returns the
    /// text (if any) to append this step.
    fn normalize_char(&mut self, ch: char) -> String {
        if ch == '\n' || ch.is_whitespace() {
            if !self.at_line_start {
                self.pending_space = true;
            }
            return String::new();
        }
        let mut out = String::with_capacity(2);
        if self.pending_space {
            out.push(' ');
            self.pending_space = false;
        }
        out.push(ch);
        self.at_line_start = false;
        out
    }

    /// Text accumulated for display purposes (includes `(emotion)` markers,
    /// matching S4's expected `Hello(happy) friend!` rendering).
    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    /// Plain assistant text with no emotion markers, what gets appended to
    /// conversation history on a clean (non-cancelled) completion.
    pub fn assistant_text(&self) -> &str {
        &self.assistant_text
    }

    fn resolve_emotion(&self, raw: &str) -> String {
        let candidate = raw.trim().to_lowercase();
        if self.valid_emotions.iter().any(|e| e == &candidate) {
            candidate
        } else {
            "neutral".to_string()
        }
    }

    /// Feed one token. Checks `cancel_event`/`barge_event` first — on either,
    /// returns `Cancelled` immediately without touching any buffer, matching
    /// the "abort without flushing the in-flight buffer" contract in §4.F.
    pub fn push_token(&mut self, token: &str) -> TokenOutcome {
        if self.controller.is_cancelled() || self.controller.is_barged() {
            return TokenOutcome::Cancelled;
        }

        for ch in token.chars() {
            match self.state {
                ParseState::Plain => {
                    if ch == '[' {
                        self.state = ParseState::InEmotion;
                        self.emotion_buf.clear();
                    } else {
                        let normalized = self.normalize_char(ch);
                        if !normalized.is_empty() {
                            self.display_text.push_str(&normalized);
                            self.assistant_text.push_str(&normalized);
                            self.sentences.add_text(&normalized);
                        }
                    }
                }
                ParseState::InEmotion => {
                    if ch == ']' {
                        let emotion = self.resolve_emotion(&self.emotion_buf);
                        self.display_text.push('(');
                        self.display_text.push_str(&emotion);
                        self.display_text.push(')');
                        self.sentences.add_emotion(emotion);
                        self.state = ParseState::Plain;
                        self.at_line_start = true;
                    } else {
                        self.emotion_buf.push(ch);
                    }
                }
            }
        }

        TokenOutcome::Continue
    }

    /// End-of-stream flush (§4.K step 6). If an `[emotion` tag was left open
    /// unterminated, its payload is discarded rather than treated as text —
    /// an unterminated tag at stream end means the LLM was cut off mid-tag,
    /// not that it meant literal bracket text.
    pub fn flush(&mut self) {
        self.sentences.finish_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser_with(valid: &[&str]) -> (TokenParser, Arc<SentenceQueue>, Arc<BargeController>) {
        let sentences = Arc::new(SentenceQueue::new());
        let controller = BargeController::new();
        let parser = TokenParser::new(
            sentences.clone(),
            controller.clone(),
            valid.iter().map(|s| s.to_string()).collect(),
        );
        (parser, sentences, controller)
    }

    #[test]
    fn plain_tokens_accumulate_into_assistant_text() {
        let (mut parser, _sentences, _ctrl) = parser_with(&[]);
        parser.push_token("Hi ");
        parser.push_token("there");
        assert_eq!(parser.assistant_text(), "Hi there");
    }

    #[test]
    fn emotion_tag_splits_sentences_and_marks_display() {
        let (mut parser, sentences, _ctrl) = parser_with(&["happy"]);
        for tok in ["Hello ", "[happy] friend!"] {
            parser.push_token(tok);
        }
        parser.flush();

        assert_eq!(parser.display_text(), "Hello(happy) friend!");

        let first = sentences.get_sentence().unwrap();
        assert_eq!(first.get_text(), "Hello");
        assert_eq!(first.emotion, None);

        let second = sentences.get_sentence().unwrap();
        assert_eq!(second.get_text(), " friend!");
        assert_eq!(second.emotion.as_deref(), Some("happy"));
    }

    #[test]
    fn unknown_emotion_falls_back_to_neutral() {
        let (mut parser, sentences, _ctrl) = parser_with(&["happy", "sad"]);
        parser.push_token("hi[foo]bye");
        parser.flush();

        let first = sentences.get_sentence().unwrap();
        assert_eq!(first.emotion, None);
        let second = sentences.get_sentence().unwrap();
        assert_eq!(second.emotion.as_deref(), Some("neutral"));
    }

    #[test]
    fn barge_cancels_without_flushing_new_text() {
        let (mut parser, _sentences, ctrl) = parser_with(&[]);
        parser.push_token("Hi ");
        ctrl.request_barge();
        let outcome = parser.push_token("there");
        assert_eq!(outcome, TokenOutcome::Cancelled);
        // The trailing space in "Hi " is pending, not yet confirmed by a
        // following character, so it isn't part of the text at this point.
        assert_eq!(parser.assistant_text(), "Hi");
    }

    #[test]
    fn cancel_event_alone_also_cancels() {
        let (mut parser, _sentences, ctrl) = parser_with(&[]);
        ctrl.request_cancel();
        let outcome = parser.push_token("anything");
        assert_eq!(outcome, TokenOutcome::Cancelled);
    }

    #[test]
    fn whitespace_is_collapsed_and_leading_whitespace_stripped() {
        let (mut parser, _sentences, _ctrl) = parser_with(&[]);
        parser.push_token("  hello   world\n\n");
        assert_eq!(parser.assistant_text(), "hello world");
    }
}
