//! One synchronization cycle: push token, policy, inbox, dispatch, ack.

mod credentials;

use crate::commands::CommandDispatcher;
use crate::error::{AgentError, Result};
use crate::gateway::{AckRecord, BackendClient, Command};
use crate::push::PushTokenSync;
use crate::store::{EnrolmentIdentity, PolicySnapshot, StateStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use credentials::refresh_mqtt_credentials;

pub const SYNC_IN_PROGRESS: &str = "sync_in_progress";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub success: bool,
    pub summary: String,
    /// Ack records sent to the backend this cycle.
    pub acked: usize,
}

impl CycleReport {
    fn failed(summary: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: summary.into(),
            acked: 0,
        }
    }
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    backend: BackendClient,
    store: Arc<dyn StateStore>,
    dispatcher: CommandDispatcher,
    push: Option<PushTokenSync>,
    default_poll_interval_secs: u64,
    in_flight: Arc<AtomicBool>,
}

impl SyncOrchestrator {
    pub fn new(
        backend: BackendClient,
        store: Arc<dyn StateStore>,
        dispatcher: CommandDispatcher,
        default_poll_interval_secs: u64,
    ) -> Self {
        Self {
            backend,
            store,
            dispatcher,
            push: None,
            default_poll_interval_secs,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run push-token registration at the start of every cycle.
    #[must_use]
    pub fn with_push(mut self, push: PushTokenSync) -> Self {
        self.push = Some(push);
        self
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Run one cycle. A second call while a cycle is in flight returns
    /// `sync_in_progress` without doing any work. Errors never escape; they
    /// become the failure summary.
    pub async fn run_cycle(&self) -> CycleReport {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("sync already running; skipped");
            return CycleReport::failed(SYNC_IN_PROGRESS);
        }
        let _in_flight = InFlight(&self.in_flight);

        let request_id = format!("{:x}", chrono::Utc::now().timestamp_millis());
        tracing::info!(request_id = request_id.as_str(), "sync start");
        match self.cycle(&request_id).await {
            Ok(acked) => {
                let summary = format!("sync done, commands acked={acked}");
                tracing::info!(request_id = request_id.as_str(), acked, "sync done");
                CycleReport {
                    success: true,
                    summary,
                    acked,
                }
            }
            Err(e) => {
                let summary = match e {
                    AgentError::Gateway(gateway) => gateway.to_string(),
                    other => other.to_string(),
                };
                tracing::warn!(request_id = request_id.as_str(), "sync error: {summary}");
                CycleReport::failed(summary)
            }
        }
    }

    async fn cycle(&self, request_id: &str) -> Result<usize> {
        let store = self.store.as_ref();
        let identity = EnrolmentIdentity::load(store)?;
        let session = self.backend.session(&identity)?;

        if let Some(push) = &self.push {
            match push.run(&self.backend).await {
                Ok(outcome) => tracing::debug!(request_id, outcome = outcome.as_ref(), "push token sync"),
                Err(e) => tracing::warn!(request_id, "push token sync failed: {e}"),
            }
        }

        let policy = session.get_policy().await?;
        if let Some(policy_json) = policy.policy {
            let snapshot = PolicySnapshot {
                policy_json,
                etag: policy.policy_etag,
                poll_interval_sec: policy
                    .poll_interval_sec
                    .unwrap_or(self.default_poll_interval_secs),
            };
            snapshot.save(store)?;
            tracing::info!(
                request_id,
                etag = snapshot.etag.as_deref().unwrap_or(""),
                poll_interval_sec = snapshot.poll_interval_sec,
                "policy saved"
            );
        }

        let is_device_owner = self.dispatcher.facade().is_device_owner();
        let results = session.post_inbox(is_device_owner).await?;
        tracing::info!(request_id, size = results.len(), "inbox fetched");

        let mut acks: Vec<AckRecord> = Vec::with_capacity(results.len());
        for entry in &results {
            let Some(cmd) = Command::from_value(entry) else {
                tracing::warn!(request_id, "inbox entry is not an object; skipped");
                continue;
            };
            acks.push(self.dispatcher.dispatch(&session, &cmd, request_id).await);
        }

        if acks.is_empty() {
            tracing::info!(request_id, "no acks to send");
        } else {
            session.post_ack(&acks).await?;
            tracing::info!(request_id, count = acks.len(), "ack sent");
        }
        Ok(acks.len())
    }
}
