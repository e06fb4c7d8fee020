// plugsync-net/src/lib.rs
pub mod http;
pub mod registry;
pub mod validation;

pub use http::{build_http_client, download_to_file, get_json, DownloadedFile};
pub use plugsync_common::{
    error::{PlugsyncError, Result},
    model::{ArtifactSpec, CandidateArtifact, SourceSpec},
    Config,
};
pub use registry::RegistryClient;
pub use validation::{filename_from_url, validate_url};
