use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

pub const PAK_MANIFEST_FILE_NAME: &str = "pakInfo.json";
pub const DAT_INFO_FILE_NAME: &str = "dat_info.json";
pub const FILE_ORDER_FILE_NAME: &str = "file_order.metadata";
pub const HASH_ORDER_FILE_NAME: &str = "hash_order.metadata";

const MEMBER_EXTENSION: &str = "yax";
const SOURCE_EXTENSION: &str = "xml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("manifest {path} is not valid JSON: {message}")]
    InvalidJson { path: PathBuf, message: String },
    #[error("manifest {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
    #[error(
        "{path}: hash_order.metadata is not supported; provide 'file_order.metadata' or 'dat_info.json' instead"
    )]
    UnsupportedHashOrder { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct PakInfoJson {
    files: Vec<PakInfoEntry>,
}

#[derive(Debug, Deserialize)]
struct PakInfoEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DatInfoJson {
    files: Vec<String>,
}

/// Declared members of one pak folder, in `pakInfo.json` order.
#[derive(Debug, Clone)]
pub struct PakManifest {
    folder: PathBuf,
    members: Vec<String>,
}

impl PakManifest {
    pub fn manifest_path(folder: &Path) -> PathBuf {
        folder.join(PAK_MANIFEST_FILE_NAME)
    }

    /// Returns `None` when the folder carries no `pakInfo.json`.
    pub fn read(folder: &Path) -> Result<Option<Self>, ManifestError> {
        let path = Self::manifest_path(folder);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        let parsed = parse_json::<PakInfoJson>(&path, &raw)?;
        Ok(Some(Self {
            folder: folder.to_path_buf(),
            members: parsed.files.into_iter().map(|entry| entry.name).collect(),
        }))
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn declares(&self, member_name: &str) -> bool {
        self.members.iter().any(|member| member == member_name)
    }

    /// `foo.xml` is the editable source of member `foo.yax`.
    pub fn member_name_for_source(source_path: &Path) -> Option<String> {
        let stem = source_path.file_stem()?.to_str()?;
        Some(format!("{stem}.{MEMBER_EXTENSION}"))
    }

    pub fn source_path_for_member(&self, member_name: &str) -> PathBuf {
        self.folder
            .join(Path::new(member_name).with_extension(SOURCE_EXTENSION))
    }
}

/// Where the archive's file order comes from, chosen by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentsManifestSource {
    JsonDescriptor(PathBuf),
    FileOrder(PathBuf),
    HashOrder(PathBuf),
}

impl ContentsManifestSource {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        match name {
            DAT_INFO_FILE_NAME => Some(Self::JsonDescriptor(path.to_path_buf())),
            FILE_ORDER_FILE_NAME => Some(Self::FileOrder(path.to_path_buf())),
            HASH_ORDER_FILE_NAME => Some(Self::HashOrder(path.to_path_buf())),
            _ => None,
        }
    }

    /// Prefers the JSON descriptor, then the file-order record.
    pub fn discover(folder: &Path) -> Option<Self> {
        [DAT_INFO_FILE_NAME, FILE_ORDER_FILE_NAME, HASH_ORDER_FILE_NAME]
            .iter()
            .map(|name| folder.join(name))
            .find(|path| path.is_file())
            .and_then(|path| Self::from_path(&path))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::JsonDescriptor(path) | Self::FileOrder(path) | Self::HashOrder(path) => path,
        }
    }
}

/// Canonical archive file list: absolute, deduplicated, sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentsManifest {
    files: Vec<PathBuf>,
}

impl ContentsManifest {
    /// Returns `None` when `folder` has no contents manifest at all.
    pub fn load_from_folder(folder: &Path) -> Result<Option<Self>, ManifestError> {
        match ContentsManifestSource::discover(folder) {
            Some(source) => Self::read(&source).map(Some),
            None => Ok(None),
        }
    }

    pub fn read(source: &ContentsManifestSource) -> Result<Self, ManifestError> {
        let path = source.path();
        let root = path.parent().unwrap_or_else(|| Path::new(""));
        let entries = match source {
            ContentsManifestSource::JsonDescriptor(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ManifestError::Io {
                    path: path.clone(),
                    source,
                })?;
                parse_json::<DatInfoJson>(path, &raw)?.files
            }
            ContentsManifestSource::FileOrder(path) => {
                let bytes = fs::read(path).map_err(|source| ManifestError::Io {
                    path: path.clone(),
                    source,
                })?;
                decode_file_order(&bytes, path)?
            }
            ContentsManifestSource::HashOrder(path) => {
                return Err(ManifestError::UnsupportedHashOrder { path: path.clone() })
            }
        };
        Ok(Self::from_entries(root, entries))
    }

    pub fn from_entries<I>(root: &Path, entries: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let unique = entries
            .into_iter()
            .filter(|entry| !entry.is_empty())
            .collect::<BTreeSet<_>>();
        let mut sorted = unique.into_iter().collect::<Vec<_>>();
        sorted.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)).then_with(|| a.cmp(b)));
        Self {
            files: sorted.iter().map(|entry| root.join(entry)).collect(),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Case-insensitive `(name, extension)` where the extension keeps its dot.
fn sort_key(entry: &str) -> (String, String) {
    let name_start = entry.rfind(['/', '\\']).map_or(0, |idx| idx + 1);
    let (base, ext) = match entry[name_start..].rfind('.') {
        Some(dot) if dot > 0 => entry.split_at(name_start + dot),
        _ => (entry, ""),
    };
    (base.to_lowercase(), ext.to_lowercase())
}

fn decode_file_order(bytes: &[u8], path: &Path) -> Result<Vec<String>, ManifestError> {
    let mut cursor = 0usize;
    let count = read_u32(bytes, &mut cursor, path)? as usize;
    let width = read_u32(bytes, &mut cursor, path)? as usize;
    let mut names = Vec::<String>::with_capacity(count.min(bytes.len()));
    for _ in 0..count {
        let raw = read_exact(bytes, &mut cursor, width, path)?;
        let name = std::str::from_utf8(raw)
            .map_err(|_| invalid_format(path, "file name is not valid UTF-8"))?
            .trim_matches('\0');
        names.push(name.to_string());
    }
    Ok(names)
}

fn read_u32(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u32, ManifestError> {
    Ok(u32::from_le_bytes(
        read_exact(bytes, cursor, 4, path)?
            .try_into()
            .map_err(|_| invalid_format(path, "invalid u32 encoding"))?,
    ))
}

fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    path: &Path,
) -> Result<&'a [u8], ManifestError> {
    let end = cursor.saturating_add(len);
    if end > bytes.len() {
        return Err(invalid_format(path, "unexpected end of file"));
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}

fn parse_json<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T, ManifestError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|error| {
        let at = error.path().to_string();
        let source = error.into_inner();
        let message = if at.is_empty() || at == "." {
            source.to_string()
        } else {
            format!("at {at}: {source}")
        };
        ManifestError::InvalidJson {
            path: path.to_path_buf(),
            message,
        }
    })
}

fn invalid_format(path: &Path, message: &str) -> ManifestError {
    ManifestError::InvalidFormat {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn file_order_bytes(names: &[&str], width: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(names.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&width.to_le_bytes());
        for name in names {
            let mut field = name.as_bytes().to_vec();
            field.resize(width as usize, 0);
            bytes.extend_from_slice(&field);
        }
        bytes
    }

    fn names(manifest: &ContentsManifest) -> Vec<String> {
        manifest
            .files()
            .iter()
            .map(|path| {
                path.file_name()
                    .expect("name")
                    .to_string_lossy()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn pak_manifest_membership_uses_yax_names() {
        let temp = TempDir::new().expect("temp");
        fs::write(
            temp.path().join(PAK_MANIFEST_FILE_NAME),
            r#"{"files": [{"name": "0.yax", "type": 3}, {"name": "1.yax"}]}"#,
        )
        .expect("write");

        let manifest = PakManifest::read(temp.path())
            .expect("read")
            .expect("present");
        assert_eq!(manifest.members(), ["0.yax", "1.yax"]);
        let member = PakManifest::member_name_for_source(&temp.path().join("1.xml"))
            .expect("member name");
        assert!(manifest.declares(&member));
        assert!(!manifest.declares("2.yax"));
        assert_eq!(
            manifest.source_path_for_member("0.yax"),
            temp.path().join("0.xml")
        );
    }

    #[test]
    fn missing_pak_manifest_is_none() {
        let temp = TempDir::new().expect("temp");
        assert!(PakManifest::read(temp.path()).expect("read").is_none());
    }

    #[test]
    fn malformed_pak_manifest_names_failing_field() {
        let temp = TempDir::new().expect("temp");
        fs::write(
            temp.path().join(PAK_MANIFEST_FILE_NAME),
            r#"{"files": [{"name": 7}]}"#,
        )
        .expect("write");
        let err = PakManifest::read(temp.path()).expect_err("invalid");
        let ManifestError::InvalidJson { message, .. } = err else {
            panic!("expected json error");
        };
        assert!(message.contains("files[0].name"), "{message}");
    }

    #[test]
    fn entries_are_deduplicated_and_sorted_case_insensitively() {
        let root = Path::new("/root");
        let manifest = ContentsManifest::from_entries(
            root,
            ["b.dat", "A.bin", "a.dat", "b.dat", "a.Bin"].map(String::from),
        );
        assert_eq!(names(&manifest), ["A.bin", "a.Bin", "a.dat", "b.dat"]);

        let permuted = ContentsManifest::from_entries(
            root,
            ["a.dat", "b.dat", "a.Bin", "A.bin", "a.dat"].map(String::from),
        );
        assert_eq!(manifest, permuted);
    }

    #[test]
    fn sort_key_splits_only_final_extension() {
        assert_eq!(sort_key("sub/Core.Bin.rb"), ("sub/core.bin".into(), ".rb".into()));
        assert_eq!(sort_key(".hidden"), (".hidden".into(), String::new()));
        assert_eq!(sort_key("dir.x/file"), ("dir.x/file".into(), String::new()));
    }

    #[test]
    fn json_descriptor_entries_resolve_against_its_folder() {
        let temp = TempDir::new().expect("temp");
        fs::write(
            temp.path().join(DAT_INFO_FILE_NAME),
            r#"{"files": ["z.bin", "a.bin", "z.bin"]}"#,
        )
        .expect("write");
        let manifest = ContentsManifest::load_from_folder(temp.path())
            .expect("load")
            .expect("present");
        assert_eq!(
            manifest.files(),
            [temp.path().join("a.bin"), temp.path().join("z.bin")]
        );
    }

    #[test]
    fn file_order_record_is_decoded() {
        let temp = TempDir::new().expect("temp");
        fs::write(
            temp.path().join(FILE_ORDER_FILE_NAME),
            file_order_bytes(&["q.yax", "b.dat", "q.yax"], 8),
        )
        .expect("write");
        let manifest = ContentsManifest::load_from_folder(temp.path())
            .expect("load")
            .expect("present");
        assert_eq!(names(&manifest), ["b.dat", "q.yax"]);
    }

    #[test]
    fn truncated_file_order_is_invalid_format() {
        let temp = TempDir::new().expect("temp");
        let mut bytes = file_order_bytes(&["a.dat", "b.dat"], 8);
        bytes.truncate(bytes.len() - 3);
        fs::write(temp.path().join(FILE_ORDER_FILE_NAME), bytes).expect("write");
        let err = ContentsManifest::load_from_folder(temp.path()).expect_err("truncated");
        assert!(matches!(err, ManifestError::InvalidFormat { .. }));
    }

    #[test]
    fn json_descriptor_wins_over_file_order() {
        let temp = TempDir::new().expect("temp");
        fs::write(temp.path().join(FILE_ORDER_FILE_NAME), file_order_bytes(&[], 4))
            .expect("write");
        fs::write(temp.path().join(DAT_INFO_FILE_NAME), r#"{"files": []}"#).expect("write");
        assert_eq!(
            ContentsManifestSource::discover(temp.path()),
            Some(ContentsManifestSource::JsonDescriptor(
                temp.path().join(DAT_INFO_FILE_NAME)
            ))
        );
    }

    #[test]
    fn hash_order_is_rejected_with_guidance() {
        let temp = TempDir::new().expect("temp");
        fs::write(temp.path().join(HASH_ORDER_FILE_NAME), [0u8; 8]).expect("write");
        let err = ContentsManifest::load_from_folder(temp.path()).expect_err("rejected");
        assert!(matches!(err, ManifestError::UnsupportedHashOrder { .. }));
        assert!(err.to_string().contains("file_order.metadata"));
    }

    #[test]
    fn folder_without_contents_manifest_is_none() {
        let temp = TempDir::new().expect("temp");
        assert!(ContentsManifest::load_from_folder(temp.path())
            .expect("load")
            .is_none());
    }
}
