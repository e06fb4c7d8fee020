// plugsync-aio/src/json_io.rs
use std::path::Path;
use std::sync::Arc;

use plugsync_common::error::{PlugsyncError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Writes serializable data to a JSON file (pretty-printed) through
/// `atomic_write_file`, so readers never observe a partial document.
pub fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    debug!("Writing JSON to: {}", path.display());
    let mut json_bytes = serde_json::to_vec_pretty(data).map_err(|e| PlugsyncError::Json(Arc::new(e)))?;
    json_bytes.push(b'\n');
    crate::fs::atomic_write_file(path, &json_bytes)
}

pub fn read_json_sync<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Reading JSON from: {}", path.display());
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| PlugsyncError::Json(Arc::new(e)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn writes_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut data = BTreeMap::new();
        data.insert("TAB".to_string(), 4u32);

        write_json_atomic(&path, &data).unwrap();
        let back: BTreeMap<String, u32> = read_json_sync(&path).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn garbage_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let res: Result<BTreeMap<String, u32>> = read_json_sync(&path);
        assert!(matches!(res, Err(PlugsyncError::Json(_))));
    }
}
