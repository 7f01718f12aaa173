use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use super::coalescer::ChangeNotifier;
use super::WatchError;

/// Keeps the recursive OS watch alive; dropping it stops event delivery.
pub struct AssetWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl AssetWatcher {
    pub fn start(root: &Path, notifier: ChangeNotifier) -> Result<Self, WatchError> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for path in relevant_paths(&event) {
                        if !notifier.notify(path) {
                            break;
                        }
                    }
                }
                Err(error) => warn!(error = %error, "watch_event_error"),
            }
        })
        .map_err(WatchError::WatcherInit)?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchPath {
                path: root.to_path_buf(),
                source,
            })?;
        info!(root = %root.display(), "watch_started");
        Ok(Self {
            root: root.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Paths whose content may have changed: creations and modifications, minus rename sources.
pub fn relevant_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Create(_) | EventKind::Modify(_) => event.paths.clone(),
        _ => Vec::new(),
    }
}
