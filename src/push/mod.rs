//! Push-token registration with persisted exponential backoff.
//!
//! One run probes the producer for a token, registers it with the backend
//! when it changed (or the last registration is stale) and otherwise
//! schedules a retry job. Every attempt persists [`PushTokenState`].

pub mod backoff;
pub mod jobs;
pub mod state;
pub mod token;

use crate::config::PushConfig;
use crate::error::{GatewayError, Result};
use crate::facade::PolicyEnforcementFacade;
use crate::gateway::BackendClient;
use crate::store::{EnrolmentIdentity, StateStore};
use std::sync::Arc;

pub use backoff::{BackoffPolicy, compute_backoff_ms};
pub use jobs::{JobScheduler, PUSH_TOKEN_RETRY, PendingJob, StoreJobScheduler};
pub use state::PushTokenState;
pub use token::{FileTokenProducer, TokenInfo, TokenProducer};

/// Result of one registration attempt.
#[derive(Debug, Clone, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PushSyncOutcome {
    /// No device token; nothing attempted.
    NotEnrolled,
    /// No push token from any source; retry scheduled.
    WaitingForToken { retry_in_ms: u64 },
    /// Backend already has this token.
    UpToDate,
    Registered,
    Failed {
        error: String,
        auth_failure: bool,
        retry_in_ms: u64,
    },
}

#[derive(Clone)]
pub struct PushTokenSync {
    store: Arc<dyn StateStore>,
    facade: Arc<dyn PolicyEnforcementFacade>,
    producer: Arc<dyn TokenProducer>,
    scheduler: Arc<dyn JobScheduler>,
    backoff: BackoffPolicy,
    producer_package: String,
    resync_after_ms: i64,
    /// Serialises runs triggered by the sync cycle and the retry job.
    running: Arc<tokio::sync::Mutex<()>>,
}

impl PushTokenSync {
    pub fn new(
        config: &PushConfig,
        store: Arc<dyn StateStore>,
        facade: Arc<dyn PolicyEnforcementFacade>,
        producer: Arc<dyn TokenProducer>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        Self {
            store,
            facade,
            producer,
            scheduler,
            backoff: BackoffPolicy::from_config(config),
            producer_package: config.producer_package.clone(),
            resync_after_ms: i64::try_from(config.resync_after_secs.saturating_mul(1_000))
                .unwrap_or(i64::MAX),
            running: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn scheduler(&self) -> &Arc<dyn JobScheduler> {
        &self.scheduler
    }

    pub async fn run(&self, backend: &BackendClient) -> Result<PushSyncOutcome> {
        let _guard = self.running.lock().await;
        let store = self.store.as_ref();

        let identity = EnrolmentIdentity::load(store)?;
        let session = match backend.session(&identity) {
            Ok(session) => session,
            Err(GatewayError::MissingDeviceToken) => {
                tracing::info!("no device token; push token sync skipped");
                return Ok(PushSyncOutcome::NotEnrolled);
            }
            Err(e) => return Err(e.into()),
        };

        let mut state = PushTokenState::load(store)?;
        let Some(token) = self.fetch_token() else {
            state.waiting_for_core = true;
            state.backoff_attempts = self.backoff.bump(state.backoff_attempts);
            state.save(store)?;
            tracing::info!(attempts = state.backoff_attempts, "no push token yet; asking producer to refresh");
            self.producer.request_refresh();
            let retry_in_ms = self.schedule_retry(state.backoff_attempts)?;
            return Ok(PushSyncOutcome::WaitingForToken { retry_in_ms });
        };

        state.waiting_for_core = false;
        state.cached_token = Some(token.token.clone());
        state.cached_updated_at = token.updated_at;
        state.cached_enabled = token.enabled;

        let now_ms = chrono::Utc::now().timestamp_millis();
        if !state.should_sync(&token.token, token.enabled, now_ms, self.resync_after_ms) {
            state.save(store)?;
            token::write_restrictions(self.facade.as_ref(), &self.producer_package, &token);
            return Ok(PushSyncOutcome::UpToDate);
        }

        tracing::info!(len = token.token.len(), enabled = token.enabled, "POST /push-token start");
        match session.post_push_token(&token.token, token.enabled).await {
            Ok(_) => {
                state.last_synced_token = Some(token.token.clone());
                state.last_synced_enabled = token.enabled;
                state.last_sync_time = now_ms;
                state.backoff_attempts = 0;
                state.save(store)?;
                tracing::info!("POST /push-token success");
                token::write_restrictions(self.facade.as_ref(), &self.producer_package, &token);
                self.producer.notify_registered(&token);
                self.scheduler.cancel(PUSH_TOKEN_RETRY)?;
                Ok(PushSyncOutcome::Registered)
            }
            Err(e) => {
                state.backoff_attempts = self.backoff.bump(state.backoff_attempts);
                state.save(store)?;
                let auth_failure = e.is_auth_failure();
                if auth_failure {
                    EnrolmentIdentity::set_rotate_required(store, true)?;
                }
                tracing::warn!(
                    attempts = state.backoff_attempts,
                    auth_failure,
                    "POST /push-token failed: {e}"
                );
                let retry_in_ms = self.schedule_retry(state.backoff_attempts)?;
                Ok(PushSyncOutcome::Failed {
                    error: e.to_string(),
                    auth_failure,
                    retry_in_ms,
                })
            }
        }
    }

    /// Primary source first, then the producer's application restrictions.
    fn fetch_token(&self) -> Option<TokenInfo> {
        self.producer
            .current_token()
            .or_else(|| token::read_restrictions(self.facade.as_ref(), &self.producer_package))
    }

    fn schedule_retry(&self, attempts: u32) -> Result<u64> {
        let delay_ms = self.backoff.delay_ms(attempts);
        self.scheduler
            .schedule(PUSH_TOKEN_RETRY, delay_ms, self.backoff.base_ms)?;
        Ok(delay_ms)
    }
}
