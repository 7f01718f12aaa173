use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use super::WatchError;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Changed file paths gathered during one quiet period.
pub type PendingChangeSet = BTreeSet<PathBuf>;

/// Receives each flushed batch on the coalescer worker thread.
pub trait BatchHandler {
    type Error: fmt::Display;

    fn handle_batch(&mut self, batch: PendingChangeSet) -> Result<(), Self::Error>;
}

enum CoalescerMessage {
    Changed(PathBuf),
    Shutdown,
}

/// Cloneable sending side handed to filesystem callbacks.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: Sender<CoalescerMessage>,
}

impl ChangeNotifier {
    /// Queues a changed file. Directories are dropped; returns `false` once the worker is gone.
    pub fn notify(&self, path: PathBuf) -> bool {
        if path.is_dir() {
            return true;
        }
        self.sender.send(CoalescerMessage::Changed(path)).is_ok()
    }
}

/// Debounces change notifications into batches on a dedicated worker thread.
pub struct EventCoalescer {
    notifier: ChangeNotifier,
    worker: Option<JoinHandle<()>>,
}

impl EventCoalescer {
    pub fn spawn<H>(quiet_period: Duration, handler: H) -> Result<Self, WatchError>
    where
        H: BatchHandler + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("pakwatch-coalescer".to_string())
            .spawn(move || run_worker(receiver, quiet_period, handler))
            .map_err(WatchError::SpawnWorker)?;
        Ok(Self {
            notifier: ChangeNotifier { sender },
            worker: Some(worker),
        })
    }

    pub fn notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }

    pub fn notify(&self, path: PathBuf) -> bool {
        self.notifier.notify(path)
    }

    /// Stops the worker, discarding unflushed paths, and waits for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.notifier.sender.send(CoalescerMessage::Shutdown);
        if worker.join().is_err() {
            error!("coalescer_worker_panicked");
        }
    }
}

impl Drop for EventCoalescer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<H: BatchHandler>(
    receiver: Receiver<CoalescerMessage>,
    quiet_period: Duration,
    mut handler: H,
) {
    let mut pending = PendingChangeSet::new();
    loop {
        let message = if pending.is_empty() {
            match receiver.recv() {
                Ok(message) => message,
                Err(_) => break,
            }
        } else {
            match receiver.recv_timeout(quiet_period) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => {
                    flush(&mut handler, std::mem::take(&mut pending));
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        match message {
            CoalescerMessage::Changed(path) => {
                pending.insert(path);
            }
            CoalescerMessage::Shutdown => break,
        }
    }

    if !pending.is_empty() {
        info!(discarded = pending.len(), "pending_changes_discarded");
    }
    debug!("coalescer_worker_stopped");
}

fn flush<H: BatchHandler>(handler: &mut H, batch: PendingChangeSet) {
    let paths = batch.len();
    debug!(paths, "batch_flushed");
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle_batch(batch))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(paths, error = %err, "batch_failed"),
        Err(payload) => error!(paths, panic = %panic_message(payload.as_ref()), "batch_panicked"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
