mod env_overrides;
mod loader;
mod types;

pub use env_overrides::enrolment_from_env;
pub use types::{
    ArtifactsConfig, BackendConfig, Config, DeviceConfig, PushConfig, ReliabilityConfig,
    SyncConfig,
};
