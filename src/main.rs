//! Voice turn-taking core - a real-time conversational loop stitching a
//! streaming STT front end, an OpenAI-compatible streaming LLM, and a
//! streaming TTS pipeline together with cooperative barge-in cancellation.
//!
//! Speech recognition (Whisper), voice activity detection (Silero VAD), and
//! text-to-speech (Kokoro) are all sherpa-rs backed; the LLM is any
//! OpenAI-compatible chat-completions endpoint.

mod audio;
mod buffer_stream;
mod config;
mod conversation;
mod error;
mod llm;
mod mic_watcher;
mod orchestrator;
mod persistence;
mod sentence;
mod signals;
mod stt;
mod token_parser;
mod tts;

use std::sync::atomic::Ordering;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use config::Cli;
use orchestrator::App;

/// Block until SIGINT or SIGTERM is received.
async fn wait_for_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// After the first signal, a second one is a hard exit (§6, §8 S6) rather
/// than waiting on whatever the turn loop is doing.
async fn force_exit_on_second_signal() {
    wait_for_signal().await;
    error!("Second interrupt received, forcing exit.");
    std::process::exit(130);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if cli.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("Voice turn-taking core v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = cli.validate() {
        error!("Configuration error: {e}");
        error!("Run 'scripts/setup.sh' to download required models.");
        std::process::exit(1);
    }
    cli.log_config();

    let mut app = App::new(&cli)?;
    let shutdown_for_loop = app.shutdown_flag();
    let shutdown_for_signal = app.shutdown_flag();
    let controller_for_signal = app.controller();

    // The turn loop runs on a plain OS thread, not the tokio runtime: it's a
    // straight-line blocking call chain (§5 "all workers may block"), and a
    // dedicated thread lets `main`'s async task race it against signals
    // without needing `&mut App` across threads.
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        while !shutdown_for_loop.load(Ordering::Relaxed) {
            app.run_turn();
        }
        app.shutdown();
        let _ = done_tx.send(());
    });
    tokio::pin!(done_rx);

    tokio::select! {
        _ = &mut done_rx => {
            info!("Conversation loop exited.");
            return Ok(());
        }
        _ = wait_for_signal() => {
            // Unblock the coalescer and cancel the in-flight turn directly,
            // without needing `&mut App` from this task (§4.K shutdown):
            // both operations are lock-free and idempotent. The turn loop
            // itself runs the rest of `App::shutdown`'s teardown once it
            // notices `shutdown_requested`.
            shutdown_for_signal.store(true, Ordering::SeqCst);
            controller_for_signal.request_cancel();
            controller_for_signal.try_push_utterance(String::new());
        }
    }

    tokio::select! {
        _ = &mut done_rx => {
            info!("Conversation loop exited gracefully.");
        }
        _ = force_exit_on_second_signal() => {
            unreachable!("force_exit_on_second_signal never returns");
        }
    }

    info!("Voice turn-taking core stopped.");
    Ok(())
}
