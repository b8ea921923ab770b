//! Lazy, bounded-internally producer/consumer of text fragments — §4.B.
//!
//! Grounded on `examples/original_source/lib/bufferstream.py`. Feeds the TTS
//! engine while a sentence is still growing: yields queued fragments with a
//! short internal poll interval and terminates once `stop()` has been called
//! *and* the internal store is empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

/// Poll interval used by `gen`'s blocking-with-timeout receive, matching the
/// Python original's `queue.get(timeout=0.1)`.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct BufferStream {
    tx: mpsc::Sender<String>,
    rx: mpsc::Receiver<String>,
    stopped: AtomicBool,
}

impl BufferStream {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx, stopped: AtomicBool::new(false) }
    }

    pub fn add(&self, fragment: String) {
        // The channel only disconnects once every sender (including this
        // struct's own copy) is dropped, so this can't fail in practice.
        let _ = self.tx.send(fragment);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Block up to `POLL_INTERVAL` for the next fragment. Returns `None` once
    /// `stop()` has been called and no fragment is pending — the caller's
    /// natural end-of-stream signal.
    pub fn next(&self) -> Option<String> {
        loop {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(fragment) => return Some(fragment),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if self.is_stopped() {
                        // One last non-blocking check: a fragment may have
                        // landed between the timeout firing and this check.
                        return self.rx.try_recv().ok();
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl Default for BufferStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for &BufferStream {
    type Item = String;
    fn next(&mut self) -> Option<String> {
        BufferStream::next(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn yields_fragments_in_order_then_ends_after_stop() {
        let buf = Arc::new(BufferStream::new());
        buf.add("hello ".to_string());
        buf.add("world".to_string());
        buf.stop();

        assert_eq!(buf.next(), Some("hello ".to_string()));
        assert_eq!(buf.next(), Some("world".to_string()));
        assert_eq!(buf.next(), None);
    }

    #[test]
    fn does_not_end_before_stop_even_if_momentarily_empty() {
        let buf = BufferStream::new();
        buf.add("first".to_string());
        assert_eq!(buf.next(), Some("first".to_string()));
        // Not stopped yet: a real consumer would keep polling here. We just
        // assert stop() is what flips the termination condition.
        buf.stop();
        assert_eq!(buf.next(), None);
    }
}
