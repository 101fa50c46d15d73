use super::health::HealthRegistry;
use crate::config::ReliabilityConfig;
use anyhow::Result;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Restart policy shared by every supervised component.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    /// 0 disables the circuit breaker.
    pub max_restarts: u32,
}

impl RestartPolicy {
    pub fn from_config(config: &ReliabilityConfig) -> Self {
        let initial = config.component_initial_backoff_secs.max(1);
        Self {
            initial_backoff_secs: initial,
            max_backoff_secs: config.component_max_backoff_secs.max(initial),
            max_restarts: config.component_max_restarts,
        }
    }
}

/// Run `run_component` forever, restarting it with exponential backoff when
/// it fails or returns.
pub fn spawn_component_supervisor<F, Fut>(
    name: &'static str,
    policy: RestartPolicy,
    health: HealthRegistry,
    mut run_component: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let initial = policy.initial_backoff_secs.max(1);
        let max_backoff = policy.max_backoff_secs.max(initial);
        let mut backoff = initial;
        let mut consecutive_failures: u32 = 0;

        loop {
            tracing::info!(component = name, "daemon component starting");
            match run_component().await {
                Ok(()) => {
                    tracing::warn!(component = name, "daemon component exited unexpectedly");
                    health.mark_error(name, "component exited");
                    backoff = initial;
                }
                Err(e) => {
                    tracing::error!(component = name, "daemon component failed: {e:#}");
                    health.mark_error(name, format!("{e:#}"));
                }
            }
            consecutive_failures = consecutive_failures.saturating_add(1);

            if policy.max_restarts > 0 && consecutive_failures > policy.max_restarts {
                tracing::error!(
                    component = name,
                    max_restarts = policy.max_restarts,
                    "daemon component exceeded max restarts, circuit open"
                );
                break;
            }
            health.bump_restart(name);
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}
