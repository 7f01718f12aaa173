use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::atomic_io::copy_file_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Created,
    AlreadyPresent,
    /// Nothing to protect yet, e.g. a script compiled for the first time.
    SourceMissing,
}

#[derive(Debug, Error)]
#[error("failed to back up {path} to {backup_path}: {source}")]
pub struct BackupError {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    #[source]
    pub source: io::Error,
}

pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(".bak");
    PathBuf::from(raw)
}

/// Captures the original bytes of `path` in `<path>.bak` the first time only.
pub fn ensure_backup(path: &Path) -> Result<BackupOutcome, BackupError> {
    let backup_path = backup_path_for(path);
    if backup_path.exists() {
        return Ok(BackupOutcome::AlreadyPresent);
    }
    if !path.is_file() {
        return Ok(BackupOutcome::SourceMissing);
    }

    copy_file_atomic(path, &backup_path).map_err(|source| BackupError {
        path: path.to_path_buf(),
        backup_path: backup_path.clone(),
        source,
    })?;
    info!(
        original = %path.display(),
        backup = %backup_path.display(),
        "original_backed_up"
    );
    Ok(BackupOutcome::Created)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn second_backup_keeps_first_original() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("script.bin");
        fs::write(&path, b"original").expect("seed");

        assert_eq!(ensure_backup(&path).expect("first"), BackupOutcome::Created);
        fs::write(&path, b"rebuilt").expect("overwrite");
        assert_eq!(
            ensure_backup(&path).expect("second"),
            BackupOutcome::AlreadyPresent
        );

        let backup = fs::read(temp.path().join("script.bin.bak")).expect("read bak");
        assert_eq!(backup, b"original");
    }

    #[test]
    fn missing_source_is_not_an_error() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("new.bin");
        assert_eq!(
            ensure_backup(&path).expect("backup"),
            BackupOutcome::SourceMissing
        );
        assert!(!backup_path_for(&path).exists());
    }

    #[test]
    fn backup_path_appends_suffix_to_full_name() {
        assert_eq!(
            backup_path_for(Path::new("/data/p100.pak")),
            PathBuf::from("/data/p100.pak.bak")
        );
    }
}
