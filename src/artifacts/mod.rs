//! Artifact download/verification and the package install transaction.

mod fetcher;
mod installer;
mod types;

pub use fetcher::ArtifactFetcher;
pub use installer::{
    DirectoryInstaller, InstallSession, PackageInstaller, entry_name, install_all,
};
pub use types::VerifiedArtifact;

/// Download guardrail when none is configured: 200 MiB.
pub const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 200 * 1024 * 1024;
