//! TTS playback pipeline — §4.I.
//!
//! Grounded on `examples/original_source/tts_handler_cosyvoice.py`
//! (`tts_sentence_worker_thread`, `tts_play_worker_thread`, `stop_now`).
//! Reuses the teacher's `audio::Player` as the audio writer's device handle —
//! `Player::play` already blocks until a chunk finishes or is interrupted,
//! polling both its own and an externally-supplied interrupt flag, which is
//! exactly the per-write poll §4.I item 2 asks for.
//!
//! Worker-per-turn (§9 design note: both designs satisfy §5): `Player` itself
//! is long-lived across turns; the sentence worker and audio writer threads
//! are spawned fresh in `start_turn` and joined in `end_turn`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::audio::Player;
use crate::buffer_stream::BufferStream;
use crate::sentence::{Sentence, SentenceQueue};
use crate::signals::BargeController;

use super::engine::TtsEngine;
use super::references::ReferenceResolver;

const IDLE_POLL: Duration = Duration::from_millis(30);
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

pub struct TtsPipeline {
    player: Arc<Player>,
    engine: Arc<Mutex<dyn TtsEngine>>,
    resolver: Arc<ReferenceResolver>,
    controller: Arc<BargeController>,
    sentences: Arc<SentenceQueue>,
    stop_event: Arc<AtomicBool>,
    sentence_handle: Option<JoinHandle<()>>,
    writer_handle: Option<JoinHandle<()>>,
}

impl TtsPipeline {
    pub fn new(player: Arc<Player>, engine: Arc<Mutex<dyn TtsEngine>>, resolver: Arc<ReferenceResolver>, controller: Arc<BargeController>) -> Self {
        Self {
            player,
            engine,
            resolver,
            controller,
            sentences: Arc::new(SentenceQueue::new()),
            stop_event: Arc::new(AtomicBool::new(false)),
            sentence_handle: None,
            writer_handle: None,
        }
    }

    pub fn sentences(&self) -> Arc<SentenceQueue> {
        self.sentences.clone()
    }

    /// `initialize_pyaudio` + `start_threads`: fresh sentence queue, fresh
    /// `stop_event`, spawn the two per-turn worker threads.
    pub fn start_turn(&mut self) {
        self.stop_event.store(false, Ordering::SeqCst);
        self.sentences = Arc::new(SentenceQueue::new());

        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>();

        self.sentence_handle = Some(spawn_sentence_worker(
            self.sentences.clone(),
            self.engine.clone(),
            self.resolver.clone(),
            self.controller.clone(),
            self.stop_event.clone(),
            chunk_tx,
        ));
        self.writer_handle = Some(spawn_audio_writer(chunk_rx, self.player.clone(), self.controller.clone(), self.stop_event.clone()));
    }

    /// `stop_now`: panic stop. Sets `stop_event`, interrupts the device
    /// stream, drops queued sentences, and marks the engine idle. Worker
    /// threads exit cooperatively on their next poll — see module doc.
    pub fn stop_now(&mut self) {
        self.stop_event.store(true, Ordering::SeqCst);
        self.player.interrupt();
        self.sentences.clear();
        self.engine.lock().stop();
    }

    /// `shutdown_pyaudio` + `join(timeout=1s)` on both worker threads.
    pub fn end_turn(&mut self) {
        self.stop_event.store(true, Ordering::SeqCst);
        join_with_timeout(self.sentence_handle.take(), "tts sentence worker");
        join_with_timeout(self.writer_handle.take(), "tts audio writer");
    }

    pub fn is_idle(&self) -> bool {
        self.sentences.is_empty()
    }
}

fn join_with_timeout(handle: Option<JoinHandle<()>>, label: &str) {
    let Some(handle) = handle else { return };
    let (done_tx, done_rx) = mpsc::channel();
    let label = label.to_string();
    std::thread::spawn(move || {
        let _ = handle.join();
        let _ = done_tx.send(());
    });
    if done_rx.recv_timeout(JOIN_TIMEOUT).is_err() {
        warn!("{label} did not exit within {:?}", JOIN_TIMEOUT);
    }
}

fn spawn_sentence_worker(
    sentences: Arc<SentenceQueue>,
    engine: Arc<Mutex<dyn TtsEngine>>,
    resolver: Arc<ReferenceResolver>,
    controller: Arc<BargeController>,
    stop_event: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<Vec<f32>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop_event.load(Ordering::Relaxed) {
            let Some(sentence) = sentences.get_sentence() else {
                std::thread::sleep(IDLE_POLL);
                continue;
            };

            let emotion = sentence.emotion.as_deref().unwrap_or("neutral");
            let reference = resolver.resolve(emotion);
            engine.lock().set_cloning_reference(&reference.wav_path, reference.prompt_text.as_deref());

            if sentence.is_popped() {
                feed_whole_sentence(&sentence, &engine, &chunk_tx);
            } else {
                process_growing_sentence(&sentence, &engine, &chunk_tx, &controller, &stop_event);
            }
        }
    })
}

fn feed_whole_sentence(sentence: &Sentence, engine: &Arc<Mutex<dyn TtsEngine>>, chunk_tx: &mpsc::Sender<Vec<f32>>) {
    let text = sentence.get_text();
    if text.trim().is_empty() {
        return;
    }
    match engine.lock().feed(&text) {
        Ok(samples) if !samples.is_empty() => {
            let _ = chunk_tx.send(samples);
        }
        Ok(_) => {}
        Err(e) => warn!("tts feed error: {e}"),
    }
}

/// Repeatedly diffs `sentence.get_text()` against the last-observed length,
/// pushing new substrings into a `BufferStream`; a sibling thread consumes
/// that stream and feeds each fragment to the engine as it arrives, so
/// playback of the sentence's head can start before its tail has streamed in.
fn process_growing_sentence(
    sentence: &Arc<Sentence>,
    engine: &Arc<Mutex<dyn TtsEngine>>,
    chunk_tx: &mpsc::Sender<Vec<f32>>,
    controller: &Arc<BargeController>,
    stop_event: &Arc<AtomicBool>,
) {
    let buffer = Arc::new(BufferStream::new());

    let consumer = {
        let buffer = buffer.clone();
        let engine = engine.clone();
        let chunk_tx = chunk_tx.clone();
        let controller = controller.clone();
        let stop_event = stop_event.clone();
        std::thread::spawn(move || {
            while let Some(fragment) = buffer.next() {
                if stop_event.load(Ordering::Relaxed) || controller.is_barged() {
                    break;
                }
                match engine.lock().feed(&fragment) {
                    Ok(samples) if !samples.is_empty() => {
                        let _ = chunk_tx.send(samples);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("tts feed error: {e}"),
                }
            }
        })
    };

    let mut last_len = 0usize;
    loop {
        if stop_event.load(Ordering::Relaxed) || controller.is_barged() {
            buffer.stop();
            break;
        }

        let text = sentence.get_text();
        if text.len() > last_len {
            buffer.add(text[last_len..].to_string());
            last_len = text.len();
        }

        if sentence.get_finished() {
            let text = sentence.get_text();
            if text.len() > last_len {
                buffer.add(text[last_len..].to_string());
            }
            buffer.stop();
            break;
        }

        std::thread::sleep(IDLE_POLL);
    }

    let _ = consumer.join();
}

fn spawn_audio_writer(chunk_rx: mpsc::Receiver<Vec<f32>>, player: Arc<Player>, controller: Arc<BargeController>, stop_event: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            if stop_event.load(Ordering::Relaxed) {
                break;
            }
            match chunk_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(chunk) => {
                    if stop_event.load(Ordering::Relaxed) || controller.is_barged() {
                        break;
                    }
                    player.play(&chunk);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}
