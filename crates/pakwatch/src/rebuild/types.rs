use std::path::PathBuf;

use thiserror::Error;

use super::archive::{ArchiveError, ArchiveSummary};
use super::backup::BackupError;
use super::hash_map::HashMapError;
use super::manifest::ManifestError;
use super::tools::ToolError;

/// What one changed path asks the orchestrator to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// Declared pak member source; `pak_folder` is set when the folder is a `.pak` folder.
    PakMemberXml {
        yax: PathBuf,
        pak_folder: Option<PathBuf>,
    },
    PakManifest { folder: PathBuf },
    Script { output: PathBuf },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnrelatedFile,
    NoPakManifest,
    UndeclaredMember,
}

#[derive(Debug, Clone, Default)]
pub struct RebuildSummary {
    pub converted_xml: Vec<PathBuf>,
    pub compiled_scripts: Vec<PathBuf>,
    pub repacked_folders: Vec<PathBuf>,
    pub validation_warnings: usize,
    /// Paths and folders skipped because their `pakInfo.json` could not be read.
    pub skipped: Vec<PathBuf>,
    pub archive_dirty: bool,
    pub archive: Option<ArchiveSummary>,
}

impl RebuildSummary {
    pub fn did_work(&self) -> bool {
        !self.converted_xml.is_empty()
            || !self.compiled_scripts.is_empty()
            || !self.repacked_folders.is_empty()
            || self.archive.is_some()
    }
}

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    HashMap(#[from] HashMapError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
