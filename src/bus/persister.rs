//! Background writer for the durable queue.
//!
//! Emitting only marks the queue dirty and pokes this thread; encoding and
//! the storage write happen here, off the caller's thread. Wakes that pile up
//! while a write is running collapse into one follow-up write.

use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::warn;

type Flush = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct Persister {
    wake_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    flush: Flush,
}

impl Persister {
    /// Start the writer thread. If the thread cannot be spawned, writes run
    /// inline on whoever calls `wake`.
    pub(crate) fn spawn<F>(flush: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let flush: Flush = Arc::new(flush);
        let (wake_tx, wake_rx) = channel::<()>();
        let worker = Arc::clone(&flush);

        let spawned = thread::Builder::new()
            .name("audit-bus-persist".to_string())
            .spawn(move || {
                while wake_rx.recv().is_ok() {
                    while wake_rx.try_recv().is_ok() {}
                    worker();
                }
                // Every bus handle is gone: write whatever is left.
                worker();
            });

        match spawned {
            Ok(handle) => Persister {
                wake_tx: Some(wake_tx),
                handle: Some(handle),
                flush,
            },
            Err(err) => {
                warn!(error = %err, "could not start queue writer; persisting inline");
                Persister {
                    wake_tx: None,
                    handle: None,
                    flush,
                }
            }
        }
    }

    /// Ask for the queue to be written soon.
    pub(crate) fn wake(&self) {
        match &self.wake_tx {
            Some(tx) if tx.send(()).is_ok() => {}
            _ => (self.flush)(),
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.wake_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("queue writer thread panicked");
            }
        }
    }
}
