use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::watch::{BatchHandler, PendingChangeSet};

use super::archive::{export_archive, ArchiveSummary};
use super::backup::ensure_backup;
use super::hash_map::HashMapGenerator;
use super::manifest::{ContentsManifest, ManifestError, PakManifest, PAK_MANIFEST_FILE_NAME};
use super::tools::AssetTools;
use super::types::{ChangeKind, IgnoreReason, RebuildError, RebuildSummary};
use super::validator::validate_pak_folder;

const PAK_FOLDER_SUFFIX: &str = ".pak";
const XML_EXTENSION: &str = "xml";
const YAX_EXTENSION: &str = "yax";
const SCRIPT_EXTENSION: &str = "rb";

/// Turns one batch of changed paths into tool runs, repacks and at most one export.
pub struct RebuildOrchestrator<T, H> {
    watch_root: PathBuf,
    archive_output: Option<PathBuf>,
    tools: T,
    hash_map: H,
}

impl<T: AssetTools, H: HashMapGenerator> RebuildOrchestrator<T, H> {
    pub fn new(watch_root: PathBuf, archive_output: Option<PathBuf>, tools: T, hash_map: H) -> Self {
        Self {
            watch_root,
            archive_output,
            tools,
            hash_map,
        }
    }

    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }

    pub fn rebuild(&mut self, batch: PendingChangeSet) -> Result<RebuildSummary, RebuildError> {
        let mut summary = RebuildSummary::default();
        let mut dirty_folders = BTreeSet::<PathBuf>::new();

        for path in &batch {
            let kind = match classify(path) {
                Ok(kind) => kind,
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "pak_manifest_unreadable");
                    summary.skipped.push(path.clone());
                    continue;
                }
            };
            match kind {
                ChangeKind::PakMemberXml { yax, pak_folder } => {
                    self.tools.convert_xml_to_yax(path, &yax)?;
                    info!(source = %path.display(), output = %yax.display(), "xml_converted");
                    summary.converted_xml.push(path.clone());
                    dirty_folders.extend(pak_folder);
                }
                ChangeKind::PakManifest { folder } => {
                    dirty_folders.insert(folder);
                }
                ChangeKind::Script { output } => {
                    ensure_backup(&output)?;
                    self.tools.compile_script(path, &output)?;
                    info!(source = %path.display(), output = %output.display(), "script_compiled");
                    summary.compiled_scripts.push(path.clone());
                    summary.archive_dirty = true;
                }
                ChangeKind::Ignored(reason) => {
                    debug!(path = %path.display(), reason = ?reason, "change_ignored");
                }
            }
        }

        for folder in &dirty_folders {
            let Some(output) = packed_output_for(folder) else {
                warn!(folder = %folder.display(), "pak_output_unresolvable");
                continue;
            };
            let manifest = match PakManifest::read(folder) {
                Ok(Some(manifest)) => manifest,
                Ok(None) => {
                    debug!(folder = %folder.display(), "pak_manifest_missing");
                    continue;
                }
                Err(error) => {
                    warn!(path = %folder.display(), error = %error, "pak_manifest_unreadable");
                    summary.skipped.push(folder.clone());
                    continue;
                }
            };
            let report = validate_pak_folder(&manifest);
            summary.validation_warnings += report.warnings.len();
            ensure_backup(&output)?;
            self.tools.repack_pak(folder, &output)?;
            info!(folder = %folder.display(), output = %output.display(), "pak_repacked");
            summary.repacked_folders.push(folder.clone());
            summary.archive_dirty = true;
        }

        if summary.archive_dirty {
            summary.archive = self.export()?;
        }
        Ok(summary)
    }

    fn export(&self) -> Result<Option<ArchiveSummary>, RebuildError> {
        let Some(output) = &self.archive_output else {
            return Ok(None);
        };
        let Some(manifest) = ContentsManifest::load_from_folder(&self.watch_root)? else {
            warn!(root = %self.watch_root.display(), "contents_manifest_missing");
            return Ok(None);
        };
        let blob = self.hash_map.generate(manifest.files())?;
        let archive = export_archive(output, &manifest, &blob)?;
        info!(
            archive = %archive.path.display(),
            file_count = archive.file_count,
            total_bytes = archive.total_bytes,
            sha256 = %archive.sha256_hex,
            "archive_exported"
        );
        Ok(Some(archive))
    }
}

impl<T: AssetTools, H: HashMapGenerator> BatchHandler for RebuildOrchestrator<T, H> {
    type Error = RebuildError;

    fn handle_batch(&mut self, batch: PendingChangeSet) -> Result<(), Self::Error> {
        let changed = batch.len();
        let summary = self.rebuild(batch)?;
        if summary.did_work() {
            info!(
                changed,
                converted = summary.converted_xml.len(),
                compiled = summary.compiled_scripts.len(),
                repacked = summary.repacked_folders.len(),
                validation_warnings = summary.validation_warnings,
                exported = summary.archive.is_some(),
                "rebuild_finished"
            );
        }
        Ok(())
    }
}

/// Decides what a changed path means; reads the folder's pak manifest for XML files.
pub fn classify(path: &Path) -> Result<ChangeKind, ManifestError> {
    let folder = path.parent().unwrap_or_else(|| Path::new(""));
    if path.file_name().is_some_and(|name| name == PAK_MANIFEST_FILE_NAME) {
        return Ok(ChangeKind::PakManifest {
            folder: folder.to_path_buf(),
        });
    }

    let extension = path.extension().and_then(|ext| ext.to_str());
    match extension {
        Some(XML_EXTENSION) => {
            let Some(manifest) = PakManifest::read(folder)? else {
                return Ok(ChangeKind::Ignored(IgnoreReason::NoPakManifest));
            };
            let declared = PakManifest::member_name_for_source(path)
                .is_some_and(|member| manifest.declares(&member));
            if !declared {
                return Ok(ChangeKind::Ignored(IgnoreReason::UndeclaredMember));
            }
            Ok(ChangeKind::PakMemberXml {
                yax: path.with_extension(YAX_EXTENSION),
                pak_folder: is_pak_folder(folder).then(|| folder.to_path_buf()),
            })
        }
        Some(SCRIPT_EXTENSION) => Ok(ChangeKind::Script {
            output: path.with_extension(""),
        }),
        _ => Ok(ChangeKind::Ignored(IgnoreReason::UnrelatedFile)),
    }
}

/// `<root>/<a>/<b>/<name>.pak/` packs into `<root>/<a>/<name>.pak`.
pub fn packed_output_for(folder: &Path) -> Option<PathBuf> {
    let name = folder.file_name()?;
    let grandparent = folder.parent()?.parent()?;
    Some(grandparent.join(name))
}

fn is_pak_folder(folder: &Path) -> bool {
    folder
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(PAK_FOLDER_SUFFIX))
}
