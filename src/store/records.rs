use super::{StateStore, StateStoreExt};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const POLICY_NS: &str = "policy";
const POLICY_KEY: &str = "snapshot";
const ENROLMENT_NS: &str = "enrolment";
const IDENTITY_KEY: &str = "identity";

/// Last policy document received from the backend. Replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub policy_json: Value,
    pub etag: Option<String>,
    pub poll_interval_sec: u64,
}

impl PolicySnapshot {
    pub fn load(store: &dyn StateStore) -> Result<Option<Self>, StoreError> {
        store.load(POLICY_NS, POLICY_KEY)
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<(), StoreError> {
        store.save(POLICY_NS, POLICY_KEY, self)
    }
}

/// Long-lived device identity written by the enrolment flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolmentIdentity {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_token: Option<String>,
    #[serde(default)]
    pub mqtt_password: Option<String>,
    #[serde(default)]
    pub rotate_required: bool,
}

impl EnrolmentIdentity {
    pub fn load(store: &dyn StateStore) -> Result<Self, StoreError> {
        Ok(store.load(ENROLMENT_NS, IDENTITY_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<(), StoreError> {
        store.save(ENROLMENT_NS, IDENTITY_KEY, self)
    }

    /// Device token, treating an empty string as absent.
    pub fn token(&self) -> Option<&str> {
        self.device_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn set_rotate_required(store: &dyn StateStore, rotate_required: bool) -> Result<(), StoreError> {
        let mut identity = Self::load(store)?;
        identity.rotate_required = rotate_required;
        identity.save(store)
    }

    pub fn set_mqtt_password(store: &dyn StateStore, password: &str) -> Result<(), StoreError> {
        let mut identity = Self::load(store)?;
        identity.mqtt_password = Some(password.to_string());
        identity.save(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn policy_snapshot_overwrites_previous() {
        let store = MemoryStore::new();
        let first = PolicySnapshot {
            policy_json: json!({"camera": false}),
            etag: Some("e1".into()),
            poll_interval_sec: 30,
        };
        first.save(&store).unwrap();

        let second = PolicySnapshot {
            policy_json: json!({"wifi": true}),
            etag: None,
            poll_interval_sec: 60,
        };
        second.save(&store).unwrap();

        assert_eq!(PolicySnapshot::load(&store).unwrap(), Some(second));
    }

    #[test]
    fn identity_defaults_when_missing() {
        let store = MemoryStore::new();
        let identity = EnrolmentIdentity::load(&store).unwrap();
        assert!(identity.token().is_none());
        assert!(!identity.rotate_required);
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let identity = EnrolmentIdentity {
            device_token: Some(String::new()),
            ..EnrolmentIdentity::default()
        };
        assert!(identity.token().is_none());
    }

    #[test]
    fn rotate_required_preserves_other_fields() {
        let store = MemoryStore::new();
        EnrolmentIdentity {
            device_id: Some("dev-1".into()),
            device_token: Some("tok".into()),
            mqtt_password: None,
            rotate_required: false,
        }
        .save(&store)
        .unwrap();

        EnrolmentIdentity::set_rotate_required(&store, true).unwrap();
        let identity = EnrolmentIdentity::load(&store).unwrap();
        assert!(identity.rotate_required);
        assert_eq!(identity.token(), Some("tok"));
        assert_eq!(identity.device_id.as_deref(), Some("dev-1"));
    }
}
