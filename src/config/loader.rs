use super::Config;
use crate::error::ConfigError;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::Path;

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Self::load_or_init_in(&home.join(".fleetsync"))
    }

    /// Load `config.toml` from `dir`, writing a default one on first run.
    pub fn load_or_init_in(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.toml");

        if !dir.exists() {
            fs::create_dir_all(dir).context("Failed to create .fleetsync directory")?;
        }

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config.data_dir = dir.to_path_buf();
            config
        } else {
            let config = Self {
                config_path: config_path.clone(),
                data_dir: dir.to_path_buf(),
                ..Self::default()
            };
            config.save()?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        fs::create_dir_all(config.download_dir())
            .context("Failed to create download directory")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.backend.base_url.trim();
        if base.is_empty() {
            return Err(ConfigError::Validation("backend.base_url is empty".into()));
        }
        if url::Url::parse(base).is_err() {
            return Err(ConfigError::Validation(format!(
                "backend.base_url is not a valid URL: {base}"
            )));
        }
        if self.artifacts.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "artifacts.max_bytes must be greater than zero".into(),
            ));
        }
        if self.push.base_retry_ms == 0 || self.push.base_retry_ms > self.push.max_retry_ms {
            return Err(ConfigError::Validation(format!(
                "push.base_retry_ms ({}) must be in 1..=push.max_retry_ms ({})",
                self.push.base_retry_ms, self.push.max_retry_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_run_writes_default_config() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("agent");
        let config = Config::load_or_init_in(&dir).unwrap();

        assert!(dir.join("config.toml").exists());
        assert!(config.download_dir().exists());
        assert_eq!(config.data_dir, dir);
        assert_eq!(config.sync.default_poll_interval_secs, 30);
    }

    #[test]
    fn existing_config_is_parsed() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            "[backend]\nbase_url = \"https://backend.test/api\"\n\n[push]\nbase_retry_ms = 1000\n",
        )
        .unwrap();

        let config = Config::load_or_init_in(tmp.path()).unwrap();
        assert_eq!(config.backend.base_url, "https://backend.test/api");
        assert_eq!(config.push.base_retry_ms, 1_000);
        assert_eq!(config.push.max_retry_ms, 6 * 60 * 60 * 1_000);
    }

    #[test]
    fn validate_rejects_inverted_retry_window() {
        let mut config = Config::default();
        config.push.base_retry_ms = 10;
        config.push.max_retry_ms = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_retry_ms"));
    }

    #[test]
    fn validate_rejects_zero_download_limit() {
        let mut config = Config::default();
        config.artifacts.max_bytes = 0;
        assert!(config.validate().is_err());
    }
}
