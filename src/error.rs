use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `fleetsync`.
///
/// Each subsystem defines its own error type. Library callers can match on
/// these to decide recovery strategy; command handlers and the CLI continue to
/// use `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum AgentError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Backend gateway ─────────────────────────────────────────────────
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    // ── Artifact download / verification ────────────────────────────────
    #[error("artifact: {0}")]
    Artifact(#[from] ArtifactError),

    // ── Package install transaction ─────────────────────────────────────
    #[error("install: {0}")]
    Install(#[from] InstallError),

    // ── State store ─────────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Policy enforcement facade ───────────────────────────────────────
    #[error("facade: {0}")]
    Facade(#[from] FacadeError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Gateway errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing_device_token")]
    MissingDeviceToken,

    #[error("{endpoint} failed code={status} body={body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint} request failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned an unreadable body: {message}")]
    Decode { endpoint: String, message: String },
}

impl GatewayError {
    /// 401/403 from the backend; the enrolment credentials need rotating.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ─── Artifact errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("invalid_url {url}")]
    InvalidUrl { url: String },

    #[error("download_failed code={status}")]
    DownloadFailed { status: u16 },

    #[error("file_too_large bytes={bytes} limit={limit}")]
    FileTooLarge { bytes: u64, limit: u64 },

    #[error("sha256_mismatch expected={expected} actual={actual}")]
    ChecksumMismatch {
        expected: String,
        actual: String,
        bytes: u64,
    },

    #[error("download_transport {0}")]
    Transport(String),

    #[error("download_io {0}")]
    Io(#[from] std::io::Error),
}

// ─── Install errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no_files_to_install")]
    NoFilesToInstall,

    #[error("install session for {package} failed: {message}")]
    Session { package: String, message: String },

    #[error("install io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Store errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state io: {0}")]
    Io(#[from] std::io::Error),

    #[error("state encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("state lock poisoned")]
    Poisoned,
}

// ─── Facade errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("{capability} requires platform level {required} (device is {actual})")]
    Unsupported {
        capability: &'static str,
        required: u32,
        actual: u32,
    },

    #[error("denied: {0}")]
    Denied(String),

    #[error("{0}")]
    Failed(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, AgentError>;
