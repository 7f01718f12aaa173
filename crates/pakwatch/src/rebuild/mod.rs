mod archive;
mod atomic_io;
mod backup;
mod hash_map;
mod hashing;
mod manifest;
mod orchestrator;
mod tools;
mod types;
mod validator;

pub use archive::{
    export_archive, ArchiveEntry, ArchiveError, ArchiveLayout, ArchiveSummary, ARCHIVE_MAGIC,
    HEADER_SIZE,
};
pub use backup::{backup_path_for, ensure_backup, BackupError, BackupOutcome};
pub use hash_map::{BucketHashMap, HashMapError, HashMapGenerator, MAX_HASHED_FILES};
pub use hashing::{crc32, crc32_str};
pub use manifest::{
    ContentsManifest, ContentsManifestSource, ManifestError, PakManifest, DAT_INFO_FILE_NAME,
    FILE_ORDER_FILE_NAME, HASH_ORDER_FILE_NAME, PAK_MANIFEST_FILE_NAME,
};
pub use orchestrator::{classify, packed_output_for, RebuildOrchestrator};
pub use tools::{AssetTools, CommandTools, ToolError};
pub use types::{ChangeKind, IgnoreReason, RebuildError, RebuildSummary};
pub use validator::{
    validate_pak_folder, IdCategory, IdRegistry, SourceLocation, ValidationReport,
    ValidationWarning, WarningCode, ACTION_TYPE_NAME, ENTITY_LAYOUT_TYPE_NAME,
};
