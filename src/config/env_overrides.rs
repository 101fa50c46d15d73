use super::Config;
use std::path::PathBuf;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FLEETSYNC_BASE_URL")
            && !url.is_empty()
        {
            self.backend.base_url = url;
        }

        if let Ok(dir) = std::env::var("FLEETSYNC_DATA_DIR")
            && !dir.is_empty()
        {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(level) = std::env::var("FLEETSYNC_PLATFORM_LEVEL")
            && let Ok(level) = level.parse::<u32>()
        {
            self.device.platform_level = level;
        }

        if let Ok(path) = std::env::var("FLEETSYNC_TOKEN_FILE")
            && !path.is_empty()
        {
            self.push.token_file = Some(path);
        }
    }
}

/// Enrolment values may be seeded from the environment; the enrolment flow
/// itself lives outside this crate.
pub fn enrolment_from_env() -> Option<(String, String)> {
    let token = std::env::var("FLEETSYNC_DEVICE_TOKEN").ok()?;
    if token.is_empty() {
        return None;
    }
    let device_id = std::env::var("FLEETSYNC_DEVICE_ID").unwrap_or_default();
    Some((device_id, token))
}
