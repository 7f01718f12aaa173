use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::atomic_io::AtomicFile;
use super::hashing::sha256_file_hex;
use super::manifest::ContentsManifest;

pub const ARCHIVE_MAGIC: &[u8; 4] = b"DAT\0";
pub const HEADER_SIZE: u32 = 32;
const PAYLOAD_ALIGNMENT: u64 = 16;
const MIN_EXTENSION_LEN: usize = 3;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive input {path} is missing")]
    MissingInput { path: PathBuf },
    #[error("failed to read/write file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("archive input {path} changed size during export (expected {expected} bytes, read {actual})")]
    InputChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("archive layout exceeds the 32-bit offset range: {message}")]
    TooLarge { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
    pub size: u32,
    pub offset: u32,
}

/// Every offset and size of one archive, computed before any byte is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub file_offsets_offset: u32,
    pub extensions_offset: u32,
    pub names_offset: u32,
    pub sizes_offset: u32,
    pub hash_map_offset: u32,
    pub hash_map_size: u32,
    pub name_width: u32,
    pub entries: Vec<ArchiveEntry>,
    pub total_size: u64,
}

#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub file_count: usize,
    pub total_bytes: u64,
    pub sha256_hex: String,
}

impl ArchiveLayout {
    /// Sizes every input from disk; any missing file fails the whole layout.
    pub fn compute(files: &[PathBuf], hash_map_size: usize) -> Result<Self, ArchiveError> {
        let mut sized = Vec::<(PathBuf, u64)>::with_capacity(files.len());
        for path in files {
            let metadata = match fs::metadata(path) {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => return Err(ArchiveError::MissingInput { path: path.clone() }),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    return Err(ArchiveError::MissingInput { path: path.clone() })
                }
                Err(source) => {
                    return Err(ArchiveError::Io {
                        path: path.clone(),
                        source,
                    })
                }
            };
            sized.push((path.clone(), metadata.len()));
        }
        Self::from_sizes(sized, hash_map_size)
    }

    pub fn from_sizes(
        files: Vec<(PathBuf, u64)>,
        hash_map_size: usize,
    ) -> Result<Self, ArchiveError> {
        let file_count = files.len() as u64;
        let names = files
            .iter()
            .map(|(path, _)| file_name_of(path))
            .collect::<Vec<_>>();
        let extensions = names.iter().map(|name| extension_of(name)).collect::<Vec<_>>();

        let extensions_size = extensions
            .iter()
            .map(|ext| padded_extension_len(ext) as u64)
            .sum::<u64>();
        let name_width = names.iter().map(|name| name.len() + 1).max().unwrap_or(0) as u64;

        let file_offsets_offset = u64::from(HEADER_SIZE);
        let extensions_offset = file_offsets_offset + file_count * 4;
        let names_offset = extensions_offset + extensions_size;
        let sizes_offset = names_offset + 4 + file_count * name_width;
        let hash_map_offset = sizes_offset + file_count * 4;
        let hash_map_size = hash_map_size as u64;

        let mut running = hash_map_offset + hash_map_size;
        let mut entries = Vec::<ArchiveEntry>::with_capacity(files.len());
        for (((path, size), name), extension) in files.into_iter().zip(names).zip(extensions) {
            let offset = align_up(running, PAYLOAD_ALIGNMENT);
            running = offset + size;
            entries.push(ArchiveEntry {
                offset: to_u32(offset, &path)?,
                size: to_u32(size, &path)?,
                path,
                name,
                extension,
            });
        }
        let total_size = running;
        to_u32(total_size, Path::new("<archive>"))?;

        Ok(Self {
            file_offsets_offset: HEADER_SIZE,
            extensions_offset: extensions_offset as u32,
            names_offset: names_offset as u32,
            sizes_offset: sizes_offset as u32,
            hash_map_offset: hash_map_offset as u32,
            hash_map_size: hash_map_size as u32,
            name_width: name_width as u32,
            entries,
            total_size,
        })
    }

    pub fn payload_start(&self) -> u64 {
        u64::from(self.hash_map_offset) + u64::from(self.hash_map_size)
    }

    fn write_tables<W: Write>(&self, out: &mut W, hash_map: &[u8]) -> io::Result<()> {
        out.write_all(ARCHIVE_MAGIC)?;
        for value in [
            self.entries.len() as u32,
            self.file_offsets_offset,
            self.extensions_offset,
            self.names_offset,
            self.sizes_offset,
            self.hash_map_offset,
        ] {
            out.write_all(&value.to_le_bytes())?;
        }
        out.write_all(&[0u8; 4])?;

        for entry in &self.entries {
            out.write_all(&entry.offset.to_le_bytes())?;
        }
        for entry in &self.entries {
            let ext = entry.extension.as_bytes();
            out.write_all(ext)?;
            let padding = padded_extension_len(&entry.extension) - ext.len();
            out.write_all(&vec![0u8; padding])?;
        }
        out.write_all(&self.name_width.to_le_bytes())?;
        for entry in &self.entries {
            let name = entry.name.as_bytes();
            out.write_all(name)?;
            out.write_all(&vec![0u8; self.name_width as usize - name.len()])?;
        }
        for entry in &self.entries {
            out.write_all(&entry.size.to_le_bytes())?;
        }
        out.write_all(hash_map)
    }
}

/// Writes the archive for `manifest` to `output`, replacing it only on success.
pub fn export_archive(
    output: &Path,
    manifest: &ContentsManifest,
    hash_map: &[u8],
) -> Result<ArchiveSummary, ArchiveError> {
    let layout = ArchiveLayout::compute(manifest.files(), hash_map.len())?;
    let io_error = |source: io::Error| ArchiveError::Io {
        path: output.to_path_buf(),
        source,
    };

    let mut file = AtomicFile::create(output).map_err(io_error)?;
    layout.write_tables(&mut file, hash_map).map_err(io_error)?;

    let mut position = layout.payload_start();
    for entry in &layout.entries {
        let offset = u64::from(entry.offset);
        write_zeros(&mut file, offset - position).map_err(io_error)?;
        let mut input = File::open(&entry.path).map_err(|source| ArchiveError::Io {
            path: entry.path.clone(),
            source,
        })?;
        let copied = io::copy(&mut input, &mut file).map_err(|source| ArchiveError::Io {
            path: entry.path.clone(),
            source,
        })?;
        if copied != u64::from(entry.size) {
            return Err(ArchiveError::InputChanged {
                path: entry.path.clone(),
                expected: u64::from(entry.size),
                actual: copied,
            });
        }
        position = offset + copied;
    }
    file.commit().map_err(io_error)?;

    let sha256_hex = sha256_file_hex(output).map_err(io_error)?;
    Ok(ArchiveSummary {
        path: output.to_path_buf(),
        file_count: layout.entries.len(),
        total_bytes: layout.total_size,
        sha256_hex,
    })
}

fn write_zeros<W: Write>(out: &mut W, count: u64) -> io::Result<()> {
    io::copy(&mut io::repeat(0).take(count), out).map(|_| ())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn extension_of(name: &str) -> String {
    name.rsplit('.').next().unwrap_or_default().to_string()
}

/// Extension bytes padded to at least three, plus the terminator.
fn padded_extension_len(extension: &str) -> usize {
    extension.len().max(MIN_EXTENSION_LEN) + 1
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

fn to_u32(value: u64, path: &Path) -> Result<u32, ArchiveError> {
    u32::try_from(value).map_err(|_| ArchiveError::TooLarge {
        message: format!("{} reaches offset {value}", path.display()),
    })
}
