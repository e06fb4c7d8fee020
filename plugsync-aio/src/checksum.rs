// plugsync-aio/src/checksum.rs
use std::path::Path;
use std::sync::Arc;

use plugsync_common::error::{PlugsyncError, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let std_file = std::fs::File::open(path).map_err(|e| PlugsyncError::Io(Arc::new(e)))?;
    let mut std_reader = std::io::BufReader::new(std_file);
    let mut hasher = Sha256::new();
    let bytes_copied = std::io::copy(&mut std_reader, &mut hasher)?;
    let actual = hex::encode(hasher.finalize());
    debug!(
        "Calculated SHA256 of {}: {} ({} bytes read)",
        path.display(),
        actual,
        bytes_copied
    );
    Ok(actual)
}

/// Hash of the file at `path`, or `None` when there is no such file.
pub fn sha256_file_if_exists(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    sha256_file(path).map(Some)
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-256("abc")
    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn file_and_bytes_hashes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), ABC);
        assert_eq!(sha256_bytes(b"abc"), ABC);
        assert_eq!(sha256_file_if_exists(&path).unwrap().as_deref(), Some(ABC));
        assert_eq!(
            sha256_file_if_exists(&dir.path().join("missing")).unwrap(),
            None
        );
    }
}
