use std::path::PathBuf;
use std::time::Duration;

/// A downloaded file whose length and digest have been checked.
///
/// Owned by the installer once handed over; [`VerifiedArtifact::discard`]
/// removes the local copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    pub source_url: String,
    /// Artifact kind as declared by the backend (`apk` unless stated).
    pub kind: String,
    pub expected_sha256: Option<String>,
    /// Lower-case hex.
    pub actual_sha256: String,
    pub byte_length: u64,
    pub local_path: PathBuf,
    pub download_duration: Duration,
}

impl VerifiedArtifact {
    /// Delete the local file. Missing files are not an error.
    pub fn discard(&self) {
        if let Err(e) = std::fs::remove_file(&self.local_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.local_path.display(), "failed to remove artifact: {e}");
        }
    }
}
