use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use flate2::Crc;
use sha2::{Digest, Sha256};

/// Standard (zlib) CRC-32, the checksum the game uses for type tags and names.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(bytes);
    crc.sum()
}

pub fn crc32_str(text: &str) -> u32 {
    crc32(text.as_bytes())
}

pub(crate) fn sha256_file_hex(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(to_hex_lower(&hasher.finalize()))
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn crc32_matches_zlib_reference_values() {
        assert_eq!(crc32_str(""), 0);
        assert_eq!(crc32_str("123456789"), 0xCBF4_3926);
        assert_eq!(crc32_str("hello"), 0x3610_A686);
    }

    #[test]
    fn file_digest_changes_with_content() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("a.bin");
        fs::write(&path, b"one").expect("write");
        let first = sha256_file_hex(&path).expect("hash");
        assert_eq!(first.len(), 64);
        fs::write(&path, b"two").expect("write");
        assert_ne!(first, sha256_file_hex(&path).expect("hash"));
    }
}
