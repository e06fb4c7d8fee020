// plugsync-aio/src/lib.rs
//! IO operations for plugsync (filesystem, json, checksums, process)

pub mod checksum;
pub mod fs;
pub mod json_io;
pub mod process;

pub use checksum::{sha256_bytes, sha256_file, sha256_file_if_exists};
pub use json_io::{read_json_sync, write_json_atomic};
pub use process::{run_command_async, run_command_checked};
