// plugsync-common/src/lib.rs
pub mod config;
pub mod error;
pub mod model;

// Re-export key types
pub use config::Config;
pub use error::{PlugsyncError, Result};
pub use model::{ArtifactKind, ArtifactRecord, ArtifactSpec, CandidateArtifact, SourceSpec};
