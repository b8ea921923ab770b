//! Sentence & SentenceQueue primitives — §3, §4.B, §4.H.
//!
//! Grounded on `examples/original_source/lib/sentencequeue.py`. The Python
//! version used a free-standing `uuid` and a bare `threading.Lock`; here the
//! identifier is a `u64` turn-local counter (no need for global uniqueness)
//! and the lock is `parking_lot::Mutex`, matching the teacher's choice for
//! short critical sections (`tts/synthesizer.rs`, `audio/playback.rs`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

static NEXT_SENTENCE_ID: AtomicU64 = AtomicU64::new(1);

/// An incrementally-assembled unit of TTS work.
///
/// Once `finished` is set, `text` is immutable — `add_text` silently no-ops
/// after that point rather than erroring, since the token parser may race a
/// `finish_current` call at a sentence boundary and the invariant is that the
/// race is harmless, not that it can't happen.
pub struct Sentence {
    pub id: u64,
    pub emotion: Option<String>,
    inner: Mutex<SentenceInner>,
}

struct SentenceInner {
    text: String,
    finished: bool,
    retrieved: bool,
    popped: bool,
}

impl Sentence {
    pub fn new(emotion: Option<String>) -> Self {
        Self {
            id: NEXT_SENTENCE_ID.fetch_add(1, Ordering::Relaxed),
            emotion,
            inner: Mutex::new(SentenceInner { text: String::new(), finished: false, retrieved: false, popped: false }),
        }
    }

    pub fn add_text(&self, text: &str) {
        let mut inner = self.inner.lock();
        if inner.finished {
            return;
        }
        inner.text.push_str(text);
    }

    pub fn get_text(&self) -> String {
        self.inner.lock().text.clone()
    }

    pub fn get_finished(&self) -> bool {
        self.inner.lock().finished
    }

    /// Idempotent.
    pub fn mark_finished(&self) {
        self.inner.lock().finished = true;
    }

    pub fn is_retrieved(&self) -> bool {
        self.inner.lock().retrieved
    }

    fn mark_retrieved(&self) {
        self.inner.lock().retrieved = true;
    }

    pub fn is_popped(&self) -> bool {
        self.inner.lock().popped
    }

    fn mark_popped(&self) {
        self.inner.lock().popped = true;
    }
}

impl std::fmt::Debug for Sentence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Sentence")
            .field("id", &self.id)
            .field("emotion", &self.emotion)
            .field("text", &inner.text)
            .field("finished", &inner.finished)
            .field("retrieved", &inner.retrieved)
            .field("popped", &inner.popped)
            .finish()
    }
}

/// An ordered sequence of finished `Sentence`s plus at most one `current`
/// growing sentence. All operations are atomic under a single mutex — the
/// Python version relies on the GIL for this; here it's explicit.
pub struct SentenceQueue {
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    queue: std::collections::VecDeque<Arc<Sentence>>,
    current: Option<Arc<Sentence>>,
}

impl SentenceQueue {
    pub fn new() -> Self {
        Self { inner: Mutex::new(QueueInner { queue: std::collections::VecDeque::new(), current: None }) }
    }

    /// Ignore pure whitespace when the current sentence is empty — this
    /// prevents a phantom empty sentence from a leading newline in the token
    /// stream.
    pub fn add_text(&self, text: &str) {
        let mut inner = self.inner.lock();
        if text.trim().is_empty() {
            let has_text = inner.current.as_ref().is_some_and(|s| !s.get_text().is_empty());
            if !has_text {
                return;
            }
        }
        if inner.current.is_none() {
            inner.current = Some(Arc::new(Sentence::new(None)));
        }
        inner.current.as_ref().unwrap().add_text(text);
    }

    /// Finalize the current sentence (if it has any text) and start a new one
    /// tagged with `emotion`.
    pub fn add_emotion(&self, emotion: String) {
        let mut inner = self.inner.lock();
        if let Some(current) = inner.current.take() {
            if !current.get_text().is_empty() {
                current.mark_finished();
                if !current.is_retrieved() {
                    inner.queue.push_back(current);
                }
            }
        }
        inner.current = Some(Arc::new(Sentence::new(Some(emotion))));
    }

    /// Finalize without starting a new one.
    pub fn finish_current(&self) {
        let mut inner = self.inner.lock();
        if let Some(current) = inner.current.take()
            && !current.get_finished()
        {
            current.mark_finished();
            if !current.is_retrieved() {
                inner.queue.push_back(current);
            }
        }
    }

    /// Returns the oldest finished sentence if any; else the currently-growing
    /// sentence (marking it `retrieved` so the consumer may stream it live);
    /// else `None`.
    pub fn get_sentence(&self) -> Option<Arc<Sentence>> {
        let mut inner = self.inner.lock();
        if let Some(sentence) = inner.queue.pop_front() {
            sentence.mark_popped();
            return Some(sentence);
        }
        if let Some(current) = inner.current.clone() {
            current.mark_retrieved();
            return Some(current);
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.queue.is_empty() && inner.current.is_none()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Drop every pending finished sentence and finish-without-queueing the
    /// current one. Used by the TTS panic stop (§4.I).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        if let Some(current) = inner.current.take() {
            current.mark_finished();
        }
    }
}

impl Default for SentenceQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_whitespace_does_not_start_a_sentence() {
        let q = SentenceQueue::new();
        q.add_text("\n");
        assert!(q.is_empty());
        q.add_text("hello");
        assert!(!q.is_empty());
    }

    #[test]
    fn emotion_boundary_finishes_and_starts_new_sentence() {
        let q = SentenceQueue::new();
        q.add_text("Hello");
        q.add_emotion("happy".to_string());
        q.add_text(" friend!");
        q.finish_current();

        let first = q.get_sentence().unwrap();
        assert_eq!(first.get_text(), "Hello");
        assert_eq!(first.emotion, None);
        assert!(first.get_finished());

        let second = q.get_sentence().unwrap();
        assert_eq!(second.get_text(), " friend!");
        assert_eq!(second.emotion.as_deref(), Some("happy"));
        assert!(second.get_finished());

        assert!(q.get_sentence().is_none());
    }

    #[test]
    fn get_sentence_on_growing_sentence_marks_retrieved_and_does_not_pop() {
        let q = SentenceQueue::new();
        q.add_text("partial");
        let s = q.get_sentence().unwrap();
        assert!(s.is_retrieved());
        assert!(!s.is_popped());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn finished_sentence_that_was_never_retrieved_gets_queued() {
        let q = SentenceQueue::new();
        q.add_text("one");
        q.add_emotion("sad".to_string());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn clear_drops_pending_and_finishes_current() {
        let q = SentenceQueue::new();
        q.add_text("one");
        q.add_emotion("sad".to_string());
        q.add_text("two");
        q.clear();
        assert!(q.is_empty());
    }
}
