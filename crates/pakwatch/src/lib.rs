use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod config;
pub mod rebuild;
pub mod watch;

pub use config::{ConfigError, ToolConfig, CONFIG_ENV_VAR};
pub use rebuild::{
    classify, ensure_backup, export_archive, validate_pak_folder, ArchiveError, ArchiveSummary,
    AssetTools, BackupOutcome, BucketHashMap, CommandTools, ContentsManifest, HashMapError,
    HashMapGenerator, ManifestError, PakManifest, RebuildError, RebuildOrchestrator,
    RebuildSummary, ToolError, ValidationReport, ValidationWarning, WarningCode,
};
pub use watch::{
    AssetWatcher, BatchHandler, ChangeNotifier, EventCoalescer, PendingChangeSet, WatchError,
};

/// Resolved locations for one watch session.
#[derive(Debug, Clone)]
pub struct WatchPaths {
    pub watch_root: PathBuf,
    pub archive_output: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("watch directory does not exist or is not a directory: {path}")]
    WatchDirMissing { path: PathBuf },
    #[error("archive output {path} has no file name")]
    ArchiveHasNoFileName { path: PathBuf },
    #[error("failed to create archive directory at {path}: {source}")]
    CreateArchiveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive output {path} is a directory")]
    ArchiveIsDirectory { path: PathBuf },
}

impl WatchPaths {
    pub fn resolve(watch_dir: &Path, archive: Option<&Path>) -> Result<Self, StartupError> {
        let watch_root = normalize_path(watch_dir);
        if !watch_root.is_dir() {
            return Err(StartupError::WatchDirMissing { path: watch_root });
        }

        let archive_output = archive.map(resolve_archive_output).transpose()?;
        Ok(Self {
            watch_root,
            archive_output,
        })
    }
}

fn resolve_archive_output(path: &Path) -> Result<PathBuf, StartupError> {
    if path.is_dir() {
        return Err(StartupError::ArchiveIsDirectory {
            path: path.to_path_buf(),
        });
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| StartupError::ArchiveHasNoFileName {
            path: path.to_path_buf(),
        })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| StartupError::CreateArchiveDir {
        path: parent.to_path_buf(),
        source,
    })?;
    Ok(normalize_path(parent).join(file_name))
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
