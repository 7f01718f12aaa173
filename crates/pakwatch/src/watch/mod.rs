use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod coalescer;
mod watcher;

pub use coalescer::{
    BatchHandler, ChangeNotifier, EventCoalescer, PendingChangeSet, DEFAULT_DEBOUNCE,
};
pub use watcher::{relevant_paths, AssetWatcher};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    #[error("failed to watch {path}: {source}")]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("failed to spawn coalescer worker: {0}")]
    SpawnWorker(#[source] io::Error),
}
