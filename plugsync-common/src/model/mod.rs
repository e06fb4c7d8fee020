// plugsync-common/src/model/mod.rs
// Declares the modules within the model directory.

pub mod artifact;
pub mod source;

// Re-export
pub use artifact::{ArtifactKind, ArtifactRecord, CandidateArtifact};
pub use source::{ArtifactSpec, SourceSpec};
