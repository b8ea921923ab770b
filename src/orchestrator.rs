//! Turn orchestrator — §4.K, the state machine tying every subsystem
//! together.
//!
//! Grounded on §9's "global process state" design note: the original keeps a
//! module-global child-process handle and `TTSHandler`; this crate
//! re-architects that as an explicit `App` value owning every subsystem,
//! with `run_turn`/`shutdown` as methods on it rather than free functions
//! closing over globals.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::audio::Player;
use crate::config::{Cli, PromptFile, TtsConfig};
use crate::conversation::{Conversation, SILENCE_SENTINEL, default_token_count};
use crate::llm::LlmClient;
use crate::persistence;
use crate::signals::BargeController;
use crate::stt::{Recognizer, SherpaSttSource, UtteranceCoalescer, spawn_stt_worker};
use crate::token_parser::{TokenOutcome, TokenParser};
use crate::tts::{KokoroEngine, ReferenceResolver, TtsEngine, TtsPipeline, resolve_references_folder};
use crate::mic_watcher::{MicEnergyWatcher, MicWatcherConfig};

/// Describes the current phase for logging purposes. The actual control
/// flow lives in `run_turn`'s straight-line procedure (§4.K); this enum
/// exists so `tracing` output names the state the way the spec's transition
/// diagram does, not as a dispatch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Cancelling,
    ShuttingDown,
}

/// How long a completely empty sentence/chunk queue must stay empty before
/// the orchestrator considers playback finished (§5 "stop-after-empty TTS
/// settle (500 ms)").
const PLAYBACK_SETTLE: Duration = Duration::from_millis(500);
const PLAYBACK_POLL: Duration = Duration::from_millis(30);

pub struct App {
    controller: Arc<BargeController>,
    coalescer: UtteranceCoalescer,
    conversation: Conversation,
    llm: LlmClient,
    tts: TtsPipeline,
    valid_emotions: Vec<String>,
    system_prompt: String,
    output_file: Option<PathBuf>,
    /// Shared with the signal-handling side of `main`, so it can be set (and
    /// the coalescer unblocked) without needing `&mut App` from another
    /// thread. `run_turn` checks this right after the coalescer returns.
    shutdown_requested: Arc<AtomicBool>,
    /// Guards `shutdown`'s teardown running exactly once. Deliberately not
    /// shared: only the thread that owns `App` ever runs the teardown.
    shutdown_done: bool,
    stt_shutdown: Arc<AtomicBool>,
    mic_watcher: MicEnergyWatcher,
    state: TurnState,
}

impl App {
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let prompt_file = PromptFile::load(&cli.prompt_file)?;
        let tts_config = TtsConfig::load(&cli.tts_config)?;

        let references_root = tts_config.gendered_references_root(&cli.gender);
        let references_folder = resolve_references_folder(cli.wavs_directory.as_deref(), references_root);
        let resolver = Arc::new(ReferenceResolver::new(references_folder)?);

        let mut valid_emotions = resolver.valid_emotions();
        if !valid_emotions.iter().any(|e| e == "neutral") {
            valid_emotions.push("neutral".to_string());
        }
        let system_prompt = prompt_file.render_system_prompt(&valid_emotions);

        let controller = BargeController::new();

        let (recognizer, segment_rx) = Recognizer::new(cli)?;
        let recognizer = Arc::new(recognizer);
        let stt_source = SherpaSttSource::new(recognizer.clone(), segment_rx);

        let stt_capturer_callback_recognizer = recognizer.clone();
        let mut stt_capturer = crate::audio::Capturer::new(cli.sample_rate, move |samples: &[f32]| {
            stt_capturer_callback_recognizer.vad_accept_waveform(samples);
        })?;
        stt_capturer.start()?;
        // Leaked deliberately: the STT capture stream lives for the process
        // lifetime, matching the teacher's `main.rs` (the capturer is never
        // explicitly shut down there either, since the process exit tears it
        // down). Keeping a named handle to call `shutdown()` on would just
        // shift the same lifetime question into `App`.
        std::mem::forget(stt_capturer);

        let stt_shutdown = Arc::new(AtomicBool::new(false));
        spawn_stt_worker(stt_source, controller.clone(), stt_shutdown.clone());

        let mic_watcher_config = MicWatcherConfig {
            sample_rate: cli.sample_rate,
            frame_size: cli.mic_frame_size,
            base_thresh: cli.mic_base_thresh,
            sustain_ms: cli.mic_sustain_ms,
            mode: cli.mic_watch_mode,
        };
        let mic_watcher = MicEnergyWatcher::new(mic_watcher_config, controller.clone());

        let provider = cli.effective_tts_provider();
        let engine_config = tts_config.kokoro_engine_config(provider.as_sherpa_provider(), cli.tts_threads as i32, cli.verbose);
        let engine = KokoroEngine::new(engine_config)?;
        let stream_info = engine.get_stream_info();
        let engine: Arc<Mutex<dyn TtsEngine>> = Arc::new(Mutex::new(engine));

        let player = Arc::new(Player::new(stream_info.sample_rate, None)?);
        let tts = TtsPipeline::new(player, engine, resolver, controller.clone());

        let llm = LlmClient::new(cli.llm_endpoint.clone(), cli.llm_model.clone(), cli.temperature)?;

        let coalescer = UtteranceCoalescer::new(controller.clone(), Duration::from_secs(cli.silence_timeout_secs));
        let conversation = Conversation::new(cli.max_tokens, cli.user_merge_limit, cli.verbose);

        Ok(Self {
            controller,
            coalescer,
            conversation,
            llm,
            tts,
            valid_emotions,
            system_prompt,
            output_file: cli.output_file.clone(),
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_done: false,
            stt_shutdown,
            mic_watcher,
            state: TurnState::Idle,
        })
    }

    /// Shared flag `main` sets (directly, from the signal-handling task) to
    /// request shutdown without needing `&mut App` across threads.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown_requested.clone()
    }

    /// Shared controller `main` uses to cancel the in-flight turn and
    /// unblock the coalescer immediately on a shutdown signal, ahead of
    /// `run_turn` noticing `shutdown_requested` and running full teardown.
    pub fn controller(&self) -> Arc<BargeController> {
        self.controller.clone()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// §4.K per-turn procedure. Blocks on the coalescer until the user's next
    /// turn is available (or shutdown unblocks it).
    pub fn run_turn(&mut self) {
        self.state = TurnState::Listening;
        info!("Listening...");
        let user_text = self.coalescer.next_turn();

        if self.shutdown_requested.load(Ordering::Relaxed) {
            return;
        }

        // Step 2: overlap across the turn boundary — a barge arrived while
        // the previous turn's audio was still technically active.
        if self.controller.is_barged() && self.controller.is_ai_speaking() {
            self.cancel_now();
        }

        self.conversation.add_user_message(user_text.clone());
        if user_text != SILENCE_SENTINEL {
            info!("User: {user_text}");
        }

        self.conversation.truncate(&self.system_prompt, default_token_count);

        self.controller.reset_for_next_turn();
        self.controller.set_ai_speaking(true);
        self.tts.start_turn();
        self.state = TurnState::Thinking;

        let mut parser = TokenParser::new(self.tts.sentences(), self.controller.clone(), self.valid_emotions.clone());

        let history = self.conversation.get_history().to_vec();
        self.state = TurnState::Speaking;
        let outcome = self.llm.generate_response(&self.system_prompt, &history, |token| parser.push_token(token));

        match outcome {
            Ok(TokenOutcome::Continue) => {
                parser.flush();
                if !self.controller.is_cancelled() {
                    let text = parser.assistant_text().to_string();
                    if !text.trim().is_empty() {
                        info!("Assistant: {}", parser.display_text());
                        self.conversation.add_assistant_message(text);
                    }
                }
            }
            Ok(TokenOutcome::Cancelled) => {
                self.state = TurnState::Cancelling;
                self.cancel_now();
            }
            Err(e) => {
                warn!("LLM request failed: {e}");
                self.cancel_now();
            }
        }

        if !self.controller.is_cancelled() {
            parser.flush();
            self.wait_for_playback_completion();
        }

        self.tts.end_turn();
        self.controller.set_ai_speaking(false);
        self.state = TurnState::Idle;

        if let Some(path) = &self.output_file {
            persistence::persist_turn(path, &self.system_prompt, &self.conversation);
        }
    }

    /// §4.K: "set request_cancel, call tts.stop_now(), call llm.abort()
    /// (best effort), leave events set until the next reset_for_next_turn".
    fn cancel_now(&mut self) {
        self.controller.request_cancel();
        self.tts.stop_now();
        self.llm.abort();
    }

    /// Poll until the sentence/chunk queues have been empty for
    /// `PLAYBACK_SETTLE`, or a mid-playout barge triggers `cancel_now`.
    fn wait_for_playback_completion(&mut self) {
        let mut idle_since: Option<Instant> = None;
        loop {
            if self.shutdown_requested.load(Ordering::Relaxed) {
                return;
            }
            if self.controller.is_barged() {
                self.cancel_now();
                return;
            }
            if self.tts.is_idle() {
                let since = *idle_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= PLAYBACK_SETTLE {
                    return;
                }
            } else {
                idle_since = None;
            }
            std::thread::sleep(PLAYBACK_POLL);
        }
    }

    /// Idempotent. Sets `shutdown_requested`, cancels any in-flight turn,
    /// stops the mic watcher and STT worker, and pushes a sentinel to
    /// unblock a coalescer that's blocked in
    /// `recv_utterance_blocking`/`recv_utterance_timeout`. Safe to call
    /// after `main` has already set `shutdown_requested` and cancelled the
    /// controller directly from the signal-handling task — those operations
    /// are themselves idempotent; `shutdown_done` guards the rest.
    pub fn shutdown(&mut self) {
        if self.shutdown_done {
            return;
        }
        self.shutdown_done = true;
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.state = TurnState::ShuttingDown;
        info!("Shutting down...");
        self.cancel_now();
        self.mic_watcher.shutdown();
        self.stt_shutdown.store(true, Ordering::SeqCst);
        self.controller.try_push_utterance(SILENCE_SENTINEL.to_string());
    }
}
