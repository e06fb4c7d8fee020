// plugsync-core/src/lib.rs

pub mod backup;
pub mod fetch;
pub mod install;
pub mod ledger;
pub mod quarantine;
pub mod reconcile;
pub mod server;
pub mod validate;

#[cfg(test)]
mod testutil;

// Re-export key types for the CLI crate
pub use backup::{BackupStore, PruneReport, RetentionPolicy};
pub use fetch::{ArtifactFetcher, CandidateSource};
pub use install::{InstallOutcome, Preparation, SafeSwapInstaller, SwapState};
pub use ledger::VersionLedger;
pub use quarantine::Quarantine;
pub use reconcile::{CancelToken, CycleReport, Reconciler, Update};
pub use server::{ScreenServer, ServerControl, Unmanaged};
