use crate::error::StoreError;
use crate::store::{StateStore, StateStoreExt};
use serde::{Deserialize, Serialize};

const PUSH_NS: &str = "push_token";
const STATE_KEY: &str = "state";

fn enabled_by_default() -> bool {
    true
}

/// Push-token registration progress, persisted after every attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTokenState {
    #[serde(default)]
    pub cached_token: Option<String>,
    #[serde(default)]
    pub cached_updated_at: i64,
    #[serde(default = "enabled_by_default")]
    pub cached_enabled: bool,
    #[serde(default)]
    pub last_synced_token: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub last_synced_enabled: bool,
    /// Unix millis of the last successful registration, 0 if never.
    #[serde(default)]
    pub last_sync_time: i64,
    /// No token was available from any source on the last attempt.
    #[serde(default)]
    pub waiting_for_core: bool,
    #[serde(default)]
    pub backoff_attempts: u32,
}

impl Default for PushTokenState {
    fn default() -> Self {
        Self {
            cached_token: None,
            cached_updated_at: 0,
            cached_enabled: true,
            last_synced_token: None,
            last_synced_enabled: true,
            last_sync_time: 0,
            waiting_for_core: false,
            backoff_attempts: 0,
        }
    }
}

impl PushTokenState {
    pub fn load(store: &dyn StateStore) -> Result<Self, StoreError> {
        Ok(store.load(PUSH_NS, STATE_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<(), StoreError> {
        store.save(PUSH_NS, STATE_KEY, self)
    }

    /// Registration is due when the token or its enabled flag changed, or the
    /// last sync is older than `resync_after_ms`.
    pub fn should_sync(&self, token: &str, enabled: bool, now_ms: i64, resync_after_ms: i64) -> bool {
        self.last_synced_token.as_deref() != Some(token)
            || self.last_synced_enabled != enabled
            || now_ms.saturating_sub(self.last_sync_time) > resync_after_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const DAY_MS: i64 = 24 * 60 * 60 * 1_000;

    fn synced(token: &str, at: i64) -> PushTokenState {
        PushTokenState {
            last_synced_token: Some(token.into()),
            last_sync_time: at,
            ..PushTokenState::default()
        }
    }

    #[test]
    fn defaults_when_missing() {
        let store = MemoryStore::new();
        let state = PushTokenState::load(&store).unwrap();
        assert_eq!(state.backoff_attempts, 0);
        assert!(state.cached_enabled);
    }

    #[test]
    fn persists_round_trip() {
        let store = MemoryStore::new();
        let state = PushTokenState {
            backoff_attempts: 3,
            waiting_for_core: true,
            ..PushTokenState::default()
        };
        state.save(&store).unwrap();
        assert_eq!(PushTokenState::load(&store).unwrap(), state);
    }

    #[test]
    fn sync_needed_on_change_or_staleness() {
        let now = 10 * DAY_MS;
        let state = synced("tok-a", now - 1_000);
        assert!(!state.should_sync("tok-a", true, now, DAY_MS));
        assert!(state.should_sync("tok-b", true, now, DAY_MS));
        assert!(state.should_sync("tok-a", false, now, DAY_MS));

        let stale = synced("tok-a", now - DAY_MS - 1);
        assert!(stale.should_sync("tok-a", true, now, DAY_MS));
    }

    #[test]
    fn never_synced_always_needs_sync() {
        assert!(PushTokenState::default().should_sync("tok", true, 0, DAY_MS));
    }
}
