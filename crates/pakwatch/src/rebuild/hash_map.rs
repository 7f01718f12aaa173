use std::path::{Path, PathBuf};

use thiserror::Error;

use super::hashing::crc32_str;

/// Bucket and index slots are i16, so positions stop at `i16::MAX`.
pub const MAX_HASHED_FILES: usize = i16::MAX as usize + 1;

#[derive(Debug, Error)]
pub enum HashMapError {
    #[error("hash map holds at most {max} files, archive lists {count}")]
    TooManyFiles { count: usize, max: usize },
}

/// Produces the lookup blob embedded in an archive, keyed by the archive's file list.
pub trait HashMapGenerator {
    fn generate(&self, files: &[PathBuf]) -> Result<Vec<u8>, HashMapError>;
}

/// Bucketed CRC-32 name index read by the engine to locate files by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketHashMap;

const HEADER_SIZE: u32 = 16;

impl HashMapGenerator for BucketHashMap {
    fn generate(&self, files: &[PathBuf]) -> Result<Vec<u8>, HashMapError> {
        let too_many = || HashMapError::TooManyFiles {
            count: files.len(),
            max: MAX_HASHED_FILES,
        };
        let shift = pre_hash_shift(files.len());
        let mut entries = files
            .iter()
            .enumerate()
            .map(|(index, path)| (index, name_hash(path)))
            .collect::<Vec<_>>();
        entries.sort_by_key(|(_, hash)| hash >> shift);

        let mut buckets = vec![-1i16; 1usize << (31 - shift)];
        for (position, (_, hash)) in entries.iter().enumerate() {
            let bucket = &mut buckets[(hash >> shift) as usize];
            if *bucket == -1 {
                *bucket = i16::try_from(position).map_err(|_| too_many())?;
            }
        }

        let buckets_offset = HEADER_SIZE;
        let hashes_offset = buckets_offset + buckets.len() as u32 * 2;
        let indices_offset = hashes_offset + entries.len() as u32 * 4;

        let mut out = Vec::with_capacity(indices_offset as usize + entries.len() * 2);
        out.extend_from_slice(&shift.to_le_bytes());
        out.extend_from_slice(&buckets_offset.to_le_bytes());
        out.extend_from_slice(&hashes_offset.to_le_bytes());
        out.extend_from_slice(&indices_offset.to_le_bytes());
        for bucket in &buckets {
            out.extend_from_slice(&bucket.to_le_bytes());
        }
        for (_, hash) in &entries {
            out.extend_from_slice(&hash.to_le_bytes());
        }
        for (index, _) in &entries {
            let index = i16::try_from(*index).map_err(|_| too_many())?;
            out.extend_from_slice(&index.to_le_bytes());
        }
        Ok(out)
    }
}

fn pre_hash_shift(file_count: usize) -> u32 {
    (0..31u32)
        .find(|bits| (1usize << bits) >= file_count)
        .map_or(0, |bits| 31 - bits)
}

fn name_hash(path: &Path) -> u32 {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    crc32_str(&name) & 0x7FFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("u32"))
    }

    #[test]
    fn shift_shrinks_as_file_count_grows() {
        assert_eq!(pre_hash_shift(0), 31);
        assert_eq!(pre_hash_shift(1), 31);
        assert_eq!(pre_hash_shift(2), 30);
        assert_eq!(pre_hash_shift(3), 29);
        assert_eq!(pre_hash_shift(4), 29);
        assert_eq!(pre_hash_shift(1000), 21);
    }

    #[test]
    fn blob_sections_match_declared_offsets() {
        let files = ["/d/a.dat", "/d/B.dat", "/d/c.wmb"].map(PathBuf::from);
        let blob = BucketHashMap.generate(&files).expect("blob");

        let shift = u32_at(&blob, 0);
        assert_eq!(shift, 29);
        let buckets = 1usize << (31 - shift);
        assert_eq!(u32_at(&blob, 4), 16);
        assert_eq!(u32_at(&blob, 8) as usize, 16 + buckets * 2);
        assert_eq!(u32_at(&blob, 12) as usize, 16 + buckets * 2 + files.len() * 4);
        assert_eq!(blob.len(), 16 + buckets * 2 + files.len() * 6);
    }

    #[test]
    fn hashes_ignore_directory_and_case() {
        let lower = BucketHashMap.generate(&[PathBuf::from("/x/file.bin")]).expect("blob");
        let upper = BucketHashMap.generate(&[PathBuf::from("/y/FILE.BIN")]).expect("blob");
        assert_eq!(lower, upper);
        let hash = u32_at(&lower, 16 + 2);
        assert_eq!(hash, crc32_str("file.bin") & 0x7FFF_FFFF);
    }

    #[test]
    fn every_index_appears_once() {
        let files = (0..9)
            .map(|i| PathBuf::from(format!("/d/file{i}.dat")))
            .collect::<Vec<_>>();
        let blob = BucketHashMap.generate(&files).expect("blob");
        let indices_offset = u32_at(&blob, 12) as usize;
        let mut indices = blob[indices_offset..]
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect::<Vec<_>>();
        indices.sort_unstable();
        assert_eq!(indices, (0..9).collect::<Vec<i16>>());
    }

    #[test]
    fn index_width_limits_the_file_count() {
        let files = (0..MAX_HASHED_FILES + 1)
            .map(|i| PathBuf::from(format!("f{i}.bin")))
            .collect::<Vec<_>>();

        let error = BucketHashMap.generate(&files).expect_err("one file too many");
        assert!(matches!(
            error,
            HashMapError::TooManyFiles { count, max } if count == MAX_HASHED_FILES + 1 && max == MAX_HASHED_FILES
        ));

        let blob = BucketHashMap
            .generate(&files[..MAX_HASHED_FILES])
            .expect("largest supported archive");
        let indices_offset = u32_at(&blob, 12) as usize;
        let last = &blob[blob.len() - 2..];
        assert!(blob.len() > indices_offset);
        assert!(i16::from_le_bytes([last[0], last[1]]) >= 0);
    }
}
