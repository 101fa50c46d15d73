use super::health::HealthRegistry;
use crate::config::Config;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tokio::time::Duration;

#[derive(Debug, Clone, serde::Serialize)]
struct DaemonStatus {
    #[serde(flatten)]
    snapshot: serde_json::Map<String, serde_json::Value>,
    written_at: String,
}

pub fn state_file_path(config: &Config) -> PathBuf {
    config.data_dir.join("daemon_state.json")
}

pub(super) async fn write_state(path: &Path, health: &HealthRegistry) -> std::io::Result<()> {
    let mut json = health.snapshot_json();
    if let Some(snapshot) = json.as_object().cloned() {
        let status = DaemonStatus {
            snapshot,
            written_at: Utc::now().to_rfc3339(),
        };
        json = serde_json::to_value(status).unwrap_or_else(|_| serde_json::json!({}));
    }
    let data = serde_json::to_vec_pretty(&json).unwrap_or_else(|_| b"{}".to_vec());
    tokio::fs::write(path, data).await
}

pub(super) fn spawn_state_writer(path: PathBuf, health: HealthRegistry) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(parent) = path.parent()
            && let Err(error) = tokio::fs::create_dir_all(parent).await
        {
            tracing::warn!(%error, "failed to create state file directory");
        }

        let mut interval = tokio::time::interval(Duration::from_secs(super::STATUS_FLUSH_SECONDS));
        loop {
            interval.tick().await;
            if let Err(error) = write_state(&path, &health).await {
                tracing::warn!(%error, "failed to write daemon state file");
            }
        }
    })
}
