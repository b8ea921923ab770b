//! Speech-to-text: VAD + Whisper recognizer (sherpa-rs backed), the blocking
//! `SttSource` contract it's adapted to, the worker thread that drains it,
//! and the utterance coalescer that turns raw utterances into user turns.

mod coalescer;
mod recognizer;
mod source;
mod worker;

pub use coalescer::{DEFAULT_SILENCE_TIMEOUT, UtteranceCoalescer};
pub use recognizer::Recognizer;
pub use source::{SherpaSttSource, SttSource};
pub use worker::spawn_stt_worker;
