//! TTS engine capability interface — §9 design note.
//!
//! The source probed `hasattr(stream, "stop")` on whatever engine object it
//! had; here engines implement a static capability interface instead. The
//! concrete backend is Kokoro (sherpa-rs), which is speaker-ID based rather
//! than a true cloning engine like the original's CosyVoice — `set_cloning_reference`
//! is therefore a best-effort match of the reference WAV's filename stem
//! against the teacher's `config::voices` table (see `DESIGN.md`), falling
//! back to the configured default speaker when nothing matches.

use std::path::Path;

use anyhow::Result;
use sherpa_rs::OnnxConfig;
use sherpa_rs::tts::{CommonTtsConfig, KokoroTts, KokoroTtsConfig};
use tracing::{debug, info, warn};

use crate::config::voices;

#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Uniform surface the TTS playback pipeline drives, regardless of backend.
pub trait TtsEngine: Send {
    /// Best-effort voice/emotion switch, applied to the next `feed` call.
    fn set_cloning_reference(&mut self, wav_path: &Path, prompt_text: Option<&str>);
    /// Synthesize `text` and return PCM samples at `get_stream_info().sample_rate`.
    fn feed(&mut self, text: &str) -> Result<Vec<f32>>;
    /// Best-effort interrupt of any in-flight synthesis; safe to call even if idle.
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
    fn get_stream_info(&self) -> StreamInfo;
}

pub struct KokoroEngine {
    tts: KokoroTts,
    sample_rate: u32,
    speaker_id: i32,
    default_speaker_id: i32,
    speed: f32,
    synthesizing: bool,
}

pub struct KokoroEngineConfig {
    pub model: String,
    pub voices: String,
    pub tokens: String,
    pub data_dir: String,
    pub dict_dir: String,
    pub lexicon: Vec<String>,
    pub lang: String,
    pub provider: String,
    pub num_threads: i32,
    pub debug: bool,
    pub default_speaker_id: i32,
    pub speed: f32,
}

impl KokoroEngine {
    pub fn new(config: KokoroEngineConfig) -> Result<Self> {
        let tts_config = KokoroTtsConfig {
            model: config.model,
            voices: config.voices,
            tokens: config.tokens,
            data_dir: config.data_dir,
            dict_dir: config.dict_dir,
            lexicon: config.lexicon,
            lang: config.lang,
            length_scale: 1.0 / config.speed,
            onnx_config: OnnxConfig { provider: config.provider, num_threads: config.num_threads, debug: config.debug },
            common_config: CommonTtsConfig { max_num_sentences: 1, ..Default::default() },
        };

        let tts = KokoroTts::new(tts_config);

        Ok(Self {
            tts,
            sample_rate: 24_000,
            speaker_id: config.default_speaker_id,
            default_speaker_id: config.default_speaker_id,
            speed: config.speed,
            synthesizing: false,
        })
    }
}

impl TtsEngine for KokoroEngine {
    fn set_cloning_reference(&mut self, wav_path: &Path, _prompt_text: Option<&str>) {
        let stem = wav_path.file_stem().and_then(|s| s.to_str()).unwrap_or("neutral");
        match voices::get_voice(stem) {
            Some(voice) => {
                debug!("matched reference '{}' to voice speaker_id={}", stem, voice.speaker_id);
                self.speaker_id = voice.speaker_id;
            }
            None => {
                if stem != "neutral" {
                    warn!("no Kokoro voice matches reference stem '{}', using default speaker", stem);
                }
                self.speaker_id = self.default_speaker_id;
            }
        }
    }

    fn feed(&mut self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.synthesizing = true;
        let result = self.tts.create(text, self.speaker_id, self.speed).map_err(|e| anyhow::anyhow!("TTS generation failed: {}", e));
        self.synthesizing = false;
        let audio = result?;
        info!("synthesized {} samples", audio.samples.len());
        Ok(audio.samples)
    }

    fn stop(&mut self) {
        // Kokoro's `create` is a single blocking call with no cancellable
        // handle; there's nothing to interrupt mid-synthesis. Marking
        // `synthesizing = false` here just keeps `is_playing` honest for a
        // caller that calls `stop` defensively between sentences.
        self.synthesizing = false;
    }

    fn is_playing(&self) -> bool {
        self.synthesizing
    }

    fn get_stream_info(&self) -> StreamInfo {
        StreamInfo { sample_rate: self.sample_rate, channels: 1 }
    }
}
