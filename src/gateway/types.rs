use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Inbound ──────────────────────────────────────────────────────

/// `GET /policy` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyResponse {
    #[serde(default)]
    pub policy_etag: Option<String>,
    /// Accepts any JSON number; values that are not a positive whole number
    /// of seconds decode as absent.
    #[serde(default, deserialize_with = "lenient_interval")]
    pub poll_interval_sec: Option<u64>,
    #[serde(default)]
    pub policy: Option<Value>,
}

fn lenient_interval<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(interval_secs))
}

fn interval_secs(value: &Value) -> Option<u64> {
    let secs = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (secs > 0).then_some(secs)
}

/// `POST /inbox` response. Entries are decoded one by one so that a single
/// malformed command does not discard the rest of the queue.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboxResponse {
    #[serde(default)]
    pub results: Option<Vec<Value>>,
}

/// One queued command, as delivered by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: i64,
    pub qid: Option<String>,
    /// Type exactly as delivered; resolution is case-insensitive.
    pub kind: String,
    pub payload: Option<Map<String, Value>>,
    pub audit: Option<Map<String, Value>>,
}

impl Command {
    pub fn new(id: i64, kind: impl Into<String>) -> Self {
        Self {
            id,
            qid: None,
            kind: kind.into(),
            payload: None,
            audit: None,
        }
    }

    #[must_use]
    pub fn with_qid(mut self, qid: impl Into<String>) -> Self {
        self.qid = Some(qid.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = as_object(Some(payload));
        self
    }

    /// Decode one inbox entry. Returns `None` only for entries that are not
    /// JSON objects; every field is read leniently so any object can be
    /// acked. A missing or non-numeric id decodes as `-1`; the type may be
    /// carried under `type` or `command`, and is empty when neither holds a
    /// scalar.
    pub fn from_value(value: &Value) -> Option<Self> {
        let entry = value.as_object()?;
        let field = |key: &str| entry.get(key).and_then(value_as_string);
        let kind = field("type")
            .filter(|k| !k.is_empty())
            .or_else(|| field("command"))
            .unwrap_or_default();
        Some(Self {
            id: entry.get("id").and_then(value_as_i64).unwrap_or(-1),
            qid: field("qid"),
            kind,
            payload: as_object(entry.get("payload").cloned()),
            audit: as_object(entry.get("audit").cloned()),
        })
    }

    /// Identifier used to correlate telemetry: the queue id when present,
    /// otherwise the numeric id.
    pub fn request_ref(&self) -> Option<String> {
        self.qid
            .clone()
            .or_else(|| (self.id >= 0).then(|| self.id.to_string()))
    }
}

fn as_object(value: Option<Value>) -> Option<Map<String, Value>> {
    match value {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `POST /mqtt/credentials` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MqttCredentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

// ── Outbound ─────────────────────────────────────────────────────

/// Result of one processed command. Always echoes the command's id/qid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRecord {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl AckRecord {
    /// Envelope populated from the command, not yet successful.
    pub fn envelope(cmd: &Command) -> Self {
        Self {
            id: cmd.id,
            qid: cmd.qid.clone(),
            command: cmd.kind.clone(),
            success: false,
            error: None,
            meta: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InboxRequest {
    pub is_device_owner: bool,
}

#[derive(Debug, Serialize)]
pub struct AckBatch<'a> {
    pub commands: &'a [AckRecord],
}

/// One entry of the installed-package inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub package: String,
    pub version_code: i64,
    pub enabled_state: i32,
    pub last_update: i64,
    pub first_install: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer: Option<String>,
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,
    pub system_app: bool,
}

#[derive(Debug, Serialize)]
pub struct InventoryUpload<'a> {
    pub request_id: &'a str,
    pub timestamp: i64,
    pub packages: &'a [PackageRecord],
    pub device_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct PushTokenRequest<'a> {
    pub token: &'a str,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct LockScreenTelemetry<'a> {
    pub request_id: &'a str,
    pub timestamp: i64,
    pub lock_screen: &'a Value,
}

#[derive(Debug, Serialize)]
pub struct PasswordChangeState<'a> {
    pub request_id: &'a str,
    pub changed: bool,
    pub status: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_decodes_type_alias_and_string_id() {
        let cmd = Command::from_value(&json!({
            "id": "42",
            "command": "WIPE",
            "payload": {"wipe_external_storage": true}
        }))
        .unwrap();
        assert_eq!(cmd.id, 42);
        assert_eq!(cmd.kind, "WIPE");
        assert!(cmd.payload.unwrap().contains_key("wipe_external_storage"));
    }

    #[test]
    fn command_prefers_type_over_command() {
        let cmd = Command::from_value(&json!({"id": 1, "type": "hide_app", "command": "wipe"}))
            .unwrap();
        assert_eq!(cmd.kind, "hide_app");
    }

    #[test]
    fn command_without_id_gets_sentinel() {
        let cmd = Command::from_value(&json!({"type": "wipe", "qid": 7})).unwrap();
        assert_eq!(cmd.id, -1);
        assert_eq!(cmd.qid.as_deref(), Some("7"));
        assert_eq!(cmd.request_ref().as_deref(), Some("7"));
    }

    #[test]
    fn non_object_payload_is_dropped() {
        let cmd = Command::from_value(&json!({"id": 3, "type": "wipe", "payload": [1, 2]})).unwrap();
        assert!(cmd.payload.is_none());
    }

    #[test]
    fn non_object_entries_are_rejected() {
        assert!(Command::from_value(&json!("wipe")).is_none());
        assert!(Command::from_value(&Value::Null).is_none());
    }

    #[test]
    fn numeric_type_still_decodes_for_an_ack() {
        let cmd = Command::from_value(&json!({"id": 9, "type": 7})).unwrap();
        assert_eq!(cmd.id, 9);
        assert_eq!(cmd.kind, "7");
    }

    #[test]
    fn non_string_command_alias_is_ignored_when_type_present() {
        let cmd = Command::from_value(&json!({"id": 10, "type": "wipe", "command": 5})).unwrap();
        assert_eq!(cmd.kind, "wipe");
    }

    #[test]
    fn structured_type_decodes_as_empty_kind() {
        let cmd = Command::from_value(&json!({"id": 11, "type": {"name": "wipe"}, "qid": []}))
            .unwrap();
        assert_eq!(cmd.id, 11);
        assert!(cmd.kind.is_empty());
        assert!(cmd.qid.is_none());
    }

    #[test]
    fn poll_interval_tolerates_odd_numbers() {
        let decode = |body: Value| {
            serde_json::from_value::<PolicyResponse>(body)
                .unwrap()
                .poll_interval_sec
        };
        assert_eq!(decode(json!({"poll_interval_sec": 120})), Some(120));
        assert_eq!(decode(json!({"poll_interval_sec": 90.7})), Some(90));
        assert_eq!(decode(json!({"poll_interval_sec": "45"})), Some(45));
        assert_eq!(decode(json!({"poll_interval_sec": -5})), None);
        assert_eq!(decode(json!({"poll_interval_sec": 0})), None);
        assert_eq!(decode(json!({"poll_interval_sec": true})), None);
        assert_eq!(decode(json!({"poll_interval_sec": null})), None);
        assert_eq!(decode(json!({})), None);
    }

    #[test]
    fn ack_omits_absent_fields() {
        let cmd = Command::new(5, "wipe");
        let mut ack = AckRecord::envelope(&cmd);
        ack.success = true;
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json, json!({"id": 5, "command": "wipe", "success": true}));
    }
}
