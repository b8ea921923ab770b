//! The STT collaborator contract — §1 ("out of scope: the STT model itself,
//! provides a blocking `next_utterance() → String` call").
//!
//! `SttSource` is the seam: the orchestrator and the STT worker only depend
//! on this trait, never on `Recognizer` directly. `SherpaSttSource` adapts
//! the teacher's sherpa-rs-backed `Recognizer` to it.

use tokio::sync::mpsc;

use super::recognizer::Recognizer;
use std::sync::Arc;

/// Blocking source of finalized user utterances. A single call may block
/// indefinitely; returning `None` means the source has been shut down and
/// will never produce another utterance.
pub trait SttSource: Send {
    fn next_utterance(&mut self) -> Option<String>;
}

/// Adapts the VAD+Whisper `Recognizer` (fed by `audio::Capturer`'s callback)
/// to the blocking `SttSource` contract by draining its segment channel and
/// skipping segments that transcribe to nothing (silence, noise).
pub struct SherpaSttSource {
    recognizer: Arc<Recognizer>,
    segment_rx: mpsc::Receiver<Vec<f32>>,
}

impl SherpaSttSource {
    pub fn new(recognizer: Arc<Recognizer>, segment_rx: mpsc::Receiver<Vec<f32>>) -> Self {
        Self { recognizer, segment_rx }
    }
}

impl SttSource for SherpaSttSource {
    fn next_utterance(&mut self) -> Option<String> {
        loop {
            let samples = self.segment_rx.blocking_recv()?;
            if let Some(text) = self.recognizer.transcribe_segment(&samples) {
                return Some(text);
            }
        }
    }
}
