//! Text-to-speech: the `TtsEngine` capability interface (Kokoro-backed),
//! voice-clone reference resolution, and the per-turn playback pipeline.

mod engine;
mod playback;
mod references;

pub use engine::{KokoroEngine, KokoroEngineConfig, StreamInfo, TtsEngine};
pub use playback::TtsPipeline;
pub use references::{resolve_references_folder, ReferenceResolver, VoiceReference};
