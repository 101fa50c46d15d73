//! Durable retry jobs: at most one pending job per key, each with a minimum
//! latency before it becomes due.

use crate::error::StoreError;
use crate::store::{StateStore, StateStoreExt};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const JOBS_NS: &str = "jobs";
const PENDING_KEY: &str = "pending";

/// Key of the push-token registration retry job.
pub const PUSH_TOKEN_RETRY: &str = "push_token_retry";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingJob {
    pub key: String,
    pub due_at: DateTime<Utc>,
    pub backoff_base_ms: u64,
    pub scheduled_at: DateTime<Utc>,
}

impl PendingJob {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

pub trait JobScheduler: Send + Sync {
    /// Schedule `key` to run after `delay_ms`, replacing any pending job with
    /// the same key.
    fn schedule(&self, key: &str, delay_ms: u64, backoff_base_ms: u64) -> Result<PendingJob, StoreError>;

    /// Returns whether a pending job was removed.
    fn cancel(&self, key: &str) -> Result<bool, StoreError>;

    fn pending(&self, key: &str) -> Result<Option<PendingJob>, StoreError>;

    /// Jobs whose minimum latency has elapsed, earliest first.
    fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<PendingJob>, StoreError>;
}

/// [`JobScheduler`] persisted in the state store, so pending retries
/// survive restarts.
#[derive(Clone)]
pub struct StoreJobScheduler {
    store: Arc<dyn StateStore>,
}

impl StoreJobScheduler {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn jobs(&self) -> Result<BTreeMap<String, PendingJob>, StoreError> {
        Ok(self.store.load(JOBS_NS, PENDING_KEY)?.unwrap_or_default())
    }

    fn write(&self, jobs: &BTreeMap<String, PendingJob>) -> Result<(), StoreError> {
        self.store.save(JOBS_NS, PENDING_KEY, jobs)
    }
}

impl JobScheduler for StoreJobScheduler {
    fn schedule(&self, key: &str, delay_ms: u64, backoff_base_ms: u64) -> Result<PendingJob, StoreError> {
        let now = Utc::now();
        let delay = i64::try_from(delay_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .unwrap_or(Duration::MAX);
        let job = PendingJob {
            key: key.to_string(),
            due_at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
            backoff_base_ms: backoff_base_ms.max(delay_ms),
            scheduled_at: now,
        };
        let mut jobs = self.jobs()?;
        jobs.insert(key.to_string(), job.clone());
        self.write(&jobs)?;
        tracing::info!(key, delay_ms, due_at = %job.due_at, "retry scheduled");
        Ok(job)
    }

    fn cancel(&self, key: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs()?;
        let removed = jobs.remove(key).is_some();
        if removed {
            self.write(&jobs)?;
            tracing::info!(key, "pending retry cancelled");
        }
        Ok(removed)
    }

    fn pending(&self, key: &str) -> Result<Option<PendingJob>, StoreError> {
        Ok(self.jobs()?.remove(key))
    }

    fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<PendingJob>, StoreError> {
        let mut due: Vec<PendingJob> = self
            .jobs()?
            .into_values()
            .filter(|job| job.is_due(now))
            .collect();
        due.sort_by_key(|job| job.due_at);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn scheduler() -> StoreJobScheduler {
        StoreJobScheduler::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn schedule_replaces_pending_job() {
        let jobs = scheduler();
        jobs.schedule(PUSH_TOKEN_RETRY, 1_000, 300_000).unwrap();
        let second = jobs.schedule(PUSH_TOKEN_RETRY, 600_000, 300_000).unwrap();

        assert_eq!(jobs.pending(PUSH_TOKEN_RETRY).unwrap(), Some(second.clone()));
        assert_eq!(second.backoff_base_ms, 600_000);
        assert!(jobs.due_jobs(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn due_jobs_respects_minimum_latency() {
        let jobs = scheduler();
        jobs.schedule("a", 0, 10).unwrap();
        jobs.schedule("b", 60_000, 10).unwrap();

        let due = jobs.due_jobs(Utc::now()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key, "a");

        let later = Utc::now() + Duration::minutes(2);
        let keys: Vec<String> = jobs.due_jobs(later).unwrap().into_iter().map(|j| j.key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn cancel_reports_whether_anything_was_pending() {
        let jobs = scheduler();
        assert!(!jobs.cancel(PUSH_TOKEN_RETRY).unwrap());
        jobs.schedule(PUSH_TOKEN_RETRY, 5, 5).unwrap();
        assert!(jobs.cancel(PUSH_TOKEN_RETRY).unwrap());
        assert!(jobs.pending(PUSH_TOKEN_RETRY).unwrap().is_none());
    }

    #[test]
    fn huge_delay_saturates() {
        let jobs = scheduler();
        let job = jobs.schedule("far", u64::MAX, 1).unwrap();
        assert!(job.due_at > Utc::now());
    }
}
