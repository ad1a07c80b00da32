//! Deferred reclamation of actions
//!
//! Actions travel between threads inside `basedrop::Owned` boxes. When one is
//! dropped (on the control thread after polling, or on the audio thread when
//! the completion channel is full) the box is only queued; the payload,
//! including recorded buffers and the last `Arc` to a ring buffer, is freed
//! later on the collector thread. The audio thread therefore never
//! deallocates.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating `Owned<T>` allocations
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread reclaims dropped actions
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("rtmix-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Action collector thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn rtmix-gc thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for wrapping values in `basedrop::Owned`
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Owned;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_is_deferred_to_collector() {
        let dropped = Arc::new(AtomicBool::new(false));
        let owned = Owned::new(&gc_handle(), DropFlag(Arc::clone(&dropped)));
        drop(owned);

        // The payload is released by the collector thread eventually
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !dropped.load(Ordering::SeqCst) {
            assert!(std::time::Instant::now() < deadline, "collector never ran");
            thread::sleep(Duration::from_millis(10));
        }
    }
}
