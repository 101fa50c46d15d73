//! Long-running agent: periodic sync, retry-job runner and a health state
//! file, each under a restart supervisor.

pub mod health;
mod state;
mod supervisor;

use crate::app::context::AgentContext;
use crate::config::SyncConfig;
use crate::push::PUSH_TOKEN_RETRY;
use crate::store::{PolicySnapshot, StateStore};
use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub use health::HealthRegistry;
pub use state::state_file_path;
pub use supervisor::{RestartPolicy, spawn_component_supervisor};

const STATUS_FLUSH_SECONDS: u64 = 5;
const MIN_JOB_POLL_SECONDS: u64 = 1;

pub async fn run(ctx: AgentContext) -> Result<()> {
    let health = HealthRegistry::new();
    let policy = RestartPolicy::from_config(&ctx.config.reliability);
    health.mark_ok("daemon");

    let mut handles: Vec<JoinHandle<()>> = vec![state::spawn_state_writer(
        state_file_path(&ctx.config),
        health.clone(),
    )];

    let sync_ctx = ctx.clone();
    let sync_health = health.clone();
    handles.push(spawn_component_supervisor("sync", policy, health.clone(), move || {
        let ctx = sync_ctx.clone();
        let health = sync_health.clone();
        async move { run_sync_loop(ctx, health).await }
    }));

    let jobs_ctx = ctx.clone();
    let jobs_health = health.clone();
    handles.push(spawn_component_supervisor("jobs", policy, health.clone(), move || {
        let ctx = jobs_ctx.clone();
        let health = jobs_health.clone();
        async move { run_job_runner(ctx, health).await }
    }));

    println!("◆ fleetsync daemon started");
    println!("   backend:  {}", ctx.backend.base_url());
    println!("   state:    {}", state_file_path(&ctx.config).display());
    println!("   Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    health.mark_error("daemon", "shutdown requested");
    tracing::info!("shutdown requested");

    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }
    if let Err(error) = state::write_state(&state_file_path(&ctx.config), &health).await {
        tracing::warn!(%error, "failed to write final daemon state");
    }
    Ok(())
}

async fn run_sync_loop(ctx: AgentContext, health: HealthRegistry) -> Result<()> {
    loop {
        let report = ctx.orchestrator.run_cycle().await;
        if report.success {
            health.mark_ok("sync");
        } else {
            health.mark_error("sync", &report.summary);
        }
        let wait = poll_interval(ctx.store.as_ref(), &ctx.config.sync);
        tracing::debug!(seconds = wait.as_secs(), "next sync scheduled");
        tokio::time::sleep(wait).await;
    }
}

/// Interval from the last stored policy, else the configured default; never
/// below the configured minimum.
pub fn poll_interval(store: &dyn StateStore, sync: &SyncConfig) -> Duration {
    let stored = match PolicySnapshot::load(store) {
        Ok(snapshot) => snapshot.map(|s| s.poll_interval_sec),
        Err(e) => {
            tracing::warn!("policy snapshot unreadable: {e}");
            None
        }
    };
    let seconds = stored
        .filter(|s| *s > 0)
        .unwrap_or(sync.default_poll_interval_secs)
        .max(sync.min_poll_interval_secs.max(1));
    Duration::from_secs(seconds)
}

async fn run_job_runner(ctx: AgentContext, health: HealthRegistry) -> Result<()> {
    let poll_secs = ctx.config.reliability.job_poll_secs.max(MIN_JOB_POLL_SECONDS);
    let mut interval = tokio::time::interval(Duration::from_secs(poll_secs));
    let scheduler = ctx.push.scheduler();

    loop {
        interval.tick().await;
        let jobs = match scheduler.due_jobs(Utc::now()) {
            Ok(jobs) => jobs,
            Err(e) => {
                health.mark_error("jobs", e.to_string());
                tracing::warn!("retry job query failed: {e}");
                continue;
            }
        };

        for job in jobs {
            // The run reschedules itself on failure.
            scheduler.cancel(&job.key)?;
            if job.key != PUSH_TOKEN_RETRY {
                tracing::warn!(key = job.key.as_str(), "dropping retry job with unknown key");
                continue;
            }
            match ctx.push.run(&ctx.backend).await {
                Ok(outcome) => {
                    tracing::info!(outcome = outcome.as_ref(), "push token retry ran");
                    health.mark_ok("jobs");
                }
                Err(e) => {
                    tracing::warn!("push token retry failed: {e}");
                    health.mark_error("jobs", e.to_string());
                }
            }
        }
    }
}
