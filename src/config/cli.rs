//! CLI argument parsing — §6, §12.
//!
//! Grounded on the teacher's `config/config.rs` `AppConfig`: same derive
//! (`clap::Parser` + `env`), same provider/thread-count tuning knobs, same
//! `default_model_dir`/`detect_provider` helpers. The turn-taking surface
//! itself (`--prompt-file`, `--output-file`, `--tts-config`,
//! `--wavs-directory`) is new, replacing the teacher's `--ollama-url`/
//! `--ollama-model`/`--system-prompt`/`--interrupt-mode` flags, which named a
//! design this crate no longer has (the LLM endpoint and system prompt now
//! come from the prompt file, §11; interruption is cooperative barge-in, not
//! a mic-pause mode).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::info;

use super::voices;
use crate::mic_watcher::MicWatchMode;

/// Hardware acceleration provider for ONNX models. Auto-detected if unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Provider {
    #[default]
    Cpu,
    Cuda,
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Cpu => write!(f, "cpu"),
            Provider::Cuda => write!(f, "cuda"),
            Provider::CoreMl => write!(f, "coreml"),
        }
    }
}

impl Provider {
    pub fn as_sherpa_provider(&self) -> &'static str {
        match self {
            Provider::Cpu => "cpu",
            Provider::Cuda => "cuda",
            Provider::CoreMl => "coreml",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "voice-turn-core")]
#[command(author, version, about = "Real-time conversational turn-taking core", long_about = None)]
pub struct Cli {
    /// JSON prompt file: char/user/scenario/system_prompt template (§6, §11).
    #[arg(long)]
    pub prompt_file: PathBuf,

    /// Where to write the per-turn JSON conversation log (§6, §11).
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// JSON TTS config file: backend paths, references_folder, dbg_log (§6).
    #[arg(long)]
    pub tts_config: PathBuf,

    /// Override the TTS config's gendered references folder entirely.
    #[arg(long)]
    pub wavs_directory: Option<PathBuf>,

    /// Which gendered reference root to use when `--wavs-directory` is absent.
    #[arg(long, default_value = "female")]
    pub gender: String,

    /// List all available TTS voices and exit.
    #[arg(long)]
    pub list_voices: bool,

    /// Show detailed information about a specific voice and exit.
    #[arg(long)]
    pub voice_info: Option<String>,

    /// Directory containing model files (Whisper, VAD, Kokoro TTS).
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value_os_t = default_model_dir())]
    pub model_dir: PathBuf,

    /// Audio sample rate for speech recognition.
    #[arg(long, default_value = "16000")]
    pub sample_rate: u32,

    /// Voice activity detection threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    pub vad_threshold: f32,

    /// VAD silence duration in seconds.
    #[arg(long, default_value = "0.8")]
    pub vad_silence_duration: f32,

    /// STT language code (e.g. en, es, fr). "auto" triggers language detection.
    #[arg(long, default_value = "en")]
    pub stt_language: String,

    /// Wake word to activate the assistant (optional).
    #[arg(long, short = 'w')]
    pub wake_word: Option<String>,

    /// OpenAI-compatible chat-completions streaming endpoint (§6).
    #[arg(long, env = "LLM_ENDPOINT", default_value = "http://localhost:1234/v1/chat/completions")]
    pub llm_endpoint: String,

    /// Model name sent in the chat-completions request body.
    #[arg(long, env = "LLM_MODEL", default_value = "local-model")]
    pub llm_model: String,

    /// LLM temperature (0.0-2.0).
    #[arg(long, default_value = "0.7", value_parser = parse_temperature)]
    pub temperature: f32,

    /// Conversation token budget passed to `Conversation::truncate` (§3, §11).
    #[arg(long, default_value = "1548")]
    pub max_tokens: usize,

    /// How many trailing user messages `get_history` collapses into one (§3).
    #[arg(long, default_value = "4")]
    pub user_merge_limit: usize,

    /// Coalescer silence timeout, in seconds, from the second turn onward (§4.E).
    #[arg(long, default_value = "5")]
    pub silence_timeout_secs: u64,

    /// Self-trigger rejection mode for the mic energy watcher (§4.C).
    #[arg(long, value_enum, default_value = "high-thresh-while-tts")]
    pub mic_watch_mode: MicWatchMode,

    /// Base RMS² threshold for barge-in detection.
    #[arg(long, default_value = "6000")]
    pub mic_base_thresh: i64,

    /// Sustained-voice duration (ms) required before a barge-in fires.
    #[arg(long, default_value = "450")]
    pub mic_sustain_ms: f32,

    /// Frame size (samples) the mic watcher reframes its input into.
    #[arg(long, default_value = "2048")]
    pub mic_frame_size: usize,

    /// Hardware acceleration provider (auto-detected if unset).
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Provider override for speech recognition.
    #[arg(long, value_enum)]
    pub stt_provider: Option<Provider>,

    /// Provider override for speech synthesis.
    #[arg(long, value_enum)]
    pub tts_provider: Option<Provider>,

    /// Enable verbose (debug) logging.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Number of threads for all models (0 = auto-detect from CPU cores).
    #[arg(long, default_value = "0")]
    pub num_threads: usize,

    #[arg(long, default_value = "0")]
    pub vad_threads: usize,

    #[arg(long, default_value = "0")]
    pub stt_threads: usize,

    #[arg(long, default_value = "0")]
    pub tts_threads: usize,
}

impl Cli {
    /// Parse CLI args, handling the two list-and-exit voice commands first.
    pub fn from_args() -> Self {
        let mut cli = Self::parse();

        if cli.list_voices {
            voices::print_voices();
            std::process::exit(0);
        }

        if let Some(ref voice_name) = cli.voice_info {
            match voices::print_voice_info(voice_name) {
                Ok(_) => std::process::exit(0),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }

        cli.normalize_thread_counts();
        cli
    }

    fn normalize_thread_counts(&mut self) {
        let cpu_cores = num_cpus::get();
        let using_cuda = self.effective_stt_provider() == Provider::Cuda || self.effective_tts_provider() == Provider::Cuda;

        if self.num_threads == 0 {
            self.num_threads = if using_cuda { 1 } else { (cpu_cores / 3).max(1) };
        }
        if self.vad_threads == 0 {
            self.vad_threads = 1;
        }
        if self.stt_threads == 0 {
            self.stt_threads = if self.effective_stt_provider() == Provider::Cuda { 1 } else { self.num_threads };
        }
        if self.tts_threads == 0 {
            self.tts_threads = if self.effective_tts_provider() == Provider::Cuda { 1 } else { self.num_threads };
        }

        if self.verbose {
            info!(
                "CPU cores: {}, provider STT={} TTS={}, threads VAD={} STT={} TTS={}",
                cpu_cores,
                self.effective_stt_provider(),
                self.effective_tts_provider(),
                self.vad_threads,
                self.stt_threads,
                self.tts_threads
            );
        }
    }

    pub fn effective_stt_provider(&self) -> Provider {
        self.stt_provider.or(self.provider).unwrap_or_else(detect_provider)
    }

    pub fn effective_tts_provider(&self) -> Provider {
        self.tts_provider.or(self.provider).unwrap_or_else(detect_provider)
    }

    pub fn effective_stt_language(&self) -> &str {
        if self.stt_language.eq_ignore_ascii_case("auto") { "" } else { &self.stt_language }
    }

    pub fn whisper_encoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-encoder.int8.onnx")
    }

    pub fn whisper_decoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-decoder.int8.onnx")
    }

    pub fn whisper_tokens_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-tokens.txt")
    }

    pub fn vad_model_path(&self) -> PathBuf {
        self.model_dir.join("silero_vad.onnx")
    }

    pub fn tts_model_path(&self) -> PathBuf {
        self.model_dir.join("tts").join("kokoro-multi-lang-v1_0").join("model.onnx")
    }

    pub fn tts_voices_path(&self) -> PathBuf {
        self.model_dir.join("tts").join("kokoro-multi-lang-v1_0").join("voices.bin")
    }

    pub fn tts_tokens_path(&self) -> PathBuf {
        self.model_dir.join("tts").join("kokoro-multi-lang-v1_0").join("tokens.txt")
    }

    pub fn tts_data_dir(&self) -> PathBuf {
        self.model_dir.join("tts").join("kokoro-multi-lang-v1_0").join("espeak-ng-data")
    }

    pub fn tts_dict_dir(&self) -> PathBuf {
        self.model_dir.join("tts").join("kokoro-multi-lang-v1_0").join("dict")
    }

    /// Validate the parts of configuration that aren't already enforced by
    /// `clap` (model files on disk) — prompt/TTS config file existence is
    /// checked when those files are actually loaded, surfacing `ConfigError`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.model_dir.exists() {
            anyhow::bail!("model directory does not exist: {}", self.model_dir.display());
        }
        let required = [
            self.whisper_encoder_path(),
            self.whisper_decoder_path(),
            self.whisper_tokens_path(),
            self.vad_model_path(),
            self.tts_model_path(),
            self.tts_voices_path(),
            self.tts_tokens_path(),
        ];
        for path in &required {
            if !path.exists() {
                anyhow::bail!("required model file not found: {}", path.display());
            }
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            anyhow::bail!("vad threshold must be between 0.0 and 1.0");
        }
        Ok(())
    }

    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Model directory: {}", self.model_dir.display());
        info!("  Sample rate: {} Hz", self.sample_rate);
        info!("  VAD threshold: {}", self.vad_threshold);
        info!("  LLM endpoint: {}", self.llm_endpoint);
        info!("  LLM model: {}", self.llm_model);
        info!("  STT language: {}", self.stt_language);
        info!("  STT provider: {}", self.effective_stt_provider());
        info!("  TTS provider: {}", self.effective_tts_provider());
        info!("  Mic watch mode: {:?}", self.mic_watch_mode);
        info!("  Silence timeout: {}s", self.silence_timeout_secs);
        if let Some(ref wake_word) = self.wake_word {
            info!("  Wake word: {}", wake_word);
        }
    }
}

/// Default model directory (`~/.voice-assistant/models`), unchanged from the
/// teacher.
fn default_model_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() { home_dir.join(".voice-assistant").join("models") } else { PathBuf::from("models") }
}

fn detect_provider() -> Provider {
    #[cfg(target_os = "macos")]
    {
        info!("Detected macOS, using CoreML provider");
        Provider::CoreMl
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() {
            info!("Detected NVIDIA GPU, using CUDA provider");
            Provider::Cuda
        } else {
            info!("No GPU detected, using CPU provider");
            Provider::Cpu
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        info!("Using CPU provider");
        Provider::Cpu
    }
}

#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    use std::path::Path;
    let nvidia_paths = ["/dev/nvidia0", "/dev/nvidiactl", "/dev/nvidia-uvm", "/dev/nvhost-ctrl", "/dev/nvhost-ctrl-gpu"];
    for path in &nvidia_paths {
        if Path::new(path).exists() {
            return true;
        }
    }
    Path::new("/etc/nv_tegra_release").exists()
}

fn parse_temperature(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{s}' is not a valid float"))?;
    if (0.0..=2.0).contains(&value) { Ok(value) } else { Err(format!("temperature must be between 0.0 and 2.0, got {value}")) }
}
