//! Cancellation controller — §4.A.
//!
//! Four cross-cutting, level-triggered signals plus one bounded FIFO, safe for
//! multi-producer/multi-consumer use. Grounded on
//! `examples/original_source/lib/bargecontroller.py`, reimplemented with
//! atomics instead of `threading.Event` since consumers here poll from both
//! OS threads and tokio tasks.
//!
//! Consumers poll; they never block on these flags. Polling is a single
//! relaxed atomic load, which is what keeps cancellation latency bounded (§5).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

/// Capacity of the finalized-utterance queue (§3: "bounded FIFO capacity 16").
pub const INPUT_QUEUE_CAPACITY: usize = 16;

/// Central place for cooperative cancellation and barge-in signaling.
///
/// `cancel_event ⇒ barge_event` is maintained by construction: `request_cancel`
/// always sets both, and `reset_for_next_turn` always clears both together.
/// `ai_speaking` is intentionally not touched by either — only the
/// orchestrator sets/clears it, at turn start/end.
pub struct BargeController {
    ai_speaking: AtomicBool,
    barge_event: AtomicBool,
    cancel_event: AtomicBool,
    input_tx: SyncSender<String>,
    input_rx: std::sync::Mutex<Receiver<String>>,
}

impl BargeController {
    pub fn new() -> Arc<Self> {
        let (input_tx, input_rx) = mpsc::sync_channel(INPUT_QUEUE_CAPACITY);
        Arc::new(Self {
            ai_speaking: AtomicBool::new(false),
            barge_event: AtomicBool::new(false),
            cancel_event: AtomicBool::new(false),
            input_tx,
            input_rx: std::sync::Mutex::new(input_rx),
        })
    }

    /// Set `cancel_event` and `barge_event` atomically (as seen by a poller:
    /// both are true by the time either is observed true after this call, since
    /// we always set barge first then cancel — a poller reading cancel=true may
    /// briefly see barge=false only if it reads out of program order, which
    /// cooperative pollers checking both flags tolerate since cancel implies
    /// they were going to treat it as a barge anyway).
    pub fn request_cancel(&self) {
        self.barge_event.store(true, Ordering::SeqCst);
        self.cancel_event.store(true, Ordering::SeqCst);
    }

    /// Mark that voice activity was detected without committing to a cancel.
    /// Barge-without-cancel is the lower-urgency state producers may check
    /// before the orchestrator decides whether to abort outright.
    pub fn request_barge(&self) {
        self.barge_event.store(true, Ordering::SeqCst);
    }

    /// Clear `cancel_event` and `barge_event`. Never touches `ai_speaking`.
    /// Callers must ensure no worker is still reading the old epoch's flags.
    pub fn reset_for_next_turn(&self) {
        self.cancel_event.store(false, Ordering::SeqCst);
        self.barge_event.store(false, Ordering::SeqCst);
    }

    pub fn is_barged(&self) -> bool {
        self.barge_event.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_event.load(Ordering::SeqCst)
    }

    pub fn set_ai_speaking(&self, speaking: bool) {
        self.ai_speaking.store(speaking, Ordering::SeqCst);
    }

    pub fn is_ai_speaking(&self) -> bool {
        self.ai_speaking.load(Ordering::SeqCst)
    }

    /// Push a finalized utterance. Blocks if the queue is full (back-pressure
    /// is the intended behavior per §4.D).
    pub fn push_utterance(&self, text: String) {
        // SyncSender::send blocks on a full channel; that's the desired
        // back-pressure signal. A closed receiver (shutdown) is not an error
        // here, there's simply nobody left to read it.
        let _ = self.input_tx.send(text);
    }

    /// Non-blocking push, used by the mic-triggered "overlap across turn
    /// boundary" path where dropping rather than blocking is correct.
    pub fn try_push_utterance(&self, text: String) -> bool {
        match self.input_tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// Block up to `timeout` for the next utterance. `None` on timeout.
    pub fn recv_utterance_timeout(&self, timeout: Duration) -> Option<String> {
        let rx = self.input_rx.lock().unwrap();
        match rx.recv_timeout(timeout) {
            Ok(text) => Some(text),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Block indefinitely for the next utterance (the very-first-turn case).
    pub fn recv_utterance_blocking(&self) -> Option<String> {
        let rx = self.input_rx.lock().unwrap();
        rx.recv().ok()
    }

    /// Drain all immediately-available utterances without blocking.
    pub fn try_drain_utterances(&self) -> Vec<String> {
        let rx = self.input_rx.lock().unwrap();
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(text);
        }
        out
    }

    /// Get a sender clone so other threads (STT worker, mic watcher shutdown
    /// sentinel) can push without holding a reference to the whole controller.
    pub fn sender(&self) -> SyncSender<String> {
        self.input_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_cancel_implies_barge() {
        let ctrl = BargeController::new();
        assert!(!ctrl.is_barged());
        assert!(!ctrl.is_cancelled());
        ctrl.request_cancel();
        assert!(ctrl.is_barged());
        assert!(ctrl.is_cancelled());
    }

    #[test]
    fn reset_clears_both_but_not_ai_speaking() {
        let ctrl = BargeController::new();
        ctrl.set_ai_speaking(true);
        ctrl.request_cancel();
        ctrl.reset_for_next_turn();
        assert!(!ctrl.is_barged());
        assert!(!ctrl.is_cancelled());
        assert!(ctrl.is_ai_speaking());
    }

    #[test]
    fn barge_without_cancel_is_distinct() {
        let ctrl = BargeController::new();
        ctrl.request_barge();
        assert!(ctrl.is_barged());
        assert!(!ctrl.is_cancelled());
    }

    #[test]
    fn queue_push_and_drain() {
        let ctrl = BargeController::new();
        ctrl.push_utterance("hello".into());
        ctrl.push_utterance("world".into());
        let drained = ctrl.try_drain_utterances();
        assert_eq!(drained, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn recv_timeout_returns_none_when_empty() {
        let ctrl = BargeController::new();
        assert!(ctrl.recv_utterance_timeout(Duration::from_millis(10)).is_none());
    }
}
