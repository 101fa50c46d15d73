use super::payload;
use super::steps::StepLog;
use super::{HandlerContext, Outcome};
use crate::error::{Result, StoreError};
use crate::facade::{PasswordComplexity, PasswordMinimum, PasswordPolicyState, PasswordQuality, level};
use crate::gateway::{Command, DeviceSession};
use crate::store::{StateStore, StateStoreExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;
use strum::IntoEnumIterator;

const PENDING_NS: &str = "password_change";
const PENDING_KEY: &str = "pending";
/// Expiration applied to force an immediate password change.
const EXPIRE_NOW_MS: u64 = 1_000;

/// Password change requested by the backend and not yet reported done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPasswordChange {
    pub request_id: String,
}

impl PendingPasswordChange {
    pub fn load(store: &dyn StateStore) -> std::result::Result<Option<Self>, StoreError> {
        store.load(PENDING_NS, PENDING_KEY)
    }

    pub fn save(&self, store: &dyn StateStore) -> std::result::Result<(), StoreError> {
        store.save(PENDING_NS, PENDING_KEY, self)
    }

    pub fn clear(store: &dyn StateStore) -> std::result::Result<(), StoreError> {
        store.remove(PENDING_NS, PENDING_KEY)
    }
}

/// Report a completed password change for the pending request, if any.
/// The pending record is kept when the report fails so it can be retried.
pub async fn report_password_changed(
    store: &dyn StateStore,
    session: &DeviceSession,
) -> Result<Option<String>> {
    let Some(pending) = PendingPasswordChange::load(store)? else {
        return Ok(None);
    };
    session
        .post_password_change_state(&pending.request_id, true, "changed")
        .await?;
    PendingPasswordChange::clear(store)?;
    tracing::info!(request_id = pending.request_id.as_str(), "password change reported");
    Ok(Some(pending.request_id))
}

pub fn set_password_policy(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let Some(body) = cmd.payload.as_ref() else {
        return Ok(Outcome::fail("missing_payload"));
    };
    let Some(policy) = payload::object(body, "password_policy") else {
        return Ok(Outcome::fail("missing_password_policy"));
    };
    let facade = ctx.facade;
    let mut log = StepLog::new();

    if let Some(raw) = payload::string(policy, "quality") {
        match PasswordQuality::from_str(&raw) {
            Ok(quality) => {
                if log
                    .check("quality_error", facade.set_password_quality(quality))
                    .is_some()
                {
                    log.set("quality", quality.to_string());
                }
            }
            Err(_) => log.failed("quality_error", "invalid_value"),
        }
    }

    if policy.contains_key("expiration_seconds") {
        let seconds = payload::integer(policy, "expiration_seconds")
            .and_then(|s| u64::try_from(s).ok())
            .unwrap_or(0);
        match seconds.checked_mul(1_000) {
            None => log.failed("expiration_error", "invalid_value"),
            Some(ms) => {
                if log
                    .check("expiration_error", facade.set_password_expiration_timeout(ms))
                    .is_some()
                {
                    log.set("expiration_seconds", seconds);
                }
            }
        }
    }

    if policy.contains_key("history_length") {
        let length = int_field(policy, "history_length");
        if log
            .check("history_error", facade.set_password_history_length(length))
            .is_some()
        {
            log.set("history_length", length);
        }
    }

    for minimum in PasswordMinimum::iter() {
        let key = minimum.as_ref();
        if !policy.contains_key(key) {
            continue;
        }
        let value = int_field(policy, key);
        if log
            .check(
                &format!("{key}_error"),
                facade.set_password_minimum(minimum, value),
            )
            .is_some()
        {
            log.set(key, value);
        }
    }

    match facade.password_policy_state() {
        Ok(state) => log.set("snapshot", policy_snapshot(&state)),
        Err(e) => log.set("snapshot_error", e.to_string()),
    }
    Ok(log.finish())
}

pub fn set_password_complexity(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let Some(body) = cmd.payload.as_ref() else {
        return Ok(Outcome::fail("missing_payload"));
    };
    let Some(raw) = payload::string(body, "password_complexity")
        .or_else(|| payload::string(body, "required_password_complexity"))
    else {
        return Ok(Outcome::fail("missing_password_complexity"));
    };
    if !ctx.facade.supports(level::R) {
        return Ok(Outcome::fail("capability_unavailable: requires_api_30"));
    }
    let Ok(complexity) = PasswordComplexity::from_str(&raw) else {
        return Ok(Outcome::fail("invalid_value"));
    };

    ctx.facade.set_required_password_complexity(complexity)?;
    let current = ctx
        .facade
        .lock_screen_state()
        .ok()
        .and_then(|state| state.password_complexity)
        .map_or_else(|| "unknown".to_string(), |c| c.to_string());
    Ok(Outcome::ok()
        .with("password_complexity", complexity.to_string())
        .with("request_id", ctx.request_id(cmd))
        .with("current_complexity", current))
}

pub fn request_password_change(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let Some(body) = cmd.payload.as_ref() else {
        return Ok(Outcome::fail("missing_payload"));
    };
    let message = payload::string(body, "message");
    let request_id = ctx.request_id(cmd);
    let mut log = StepLog::new();

    match ctx.facade.prompt_password_change(message.as_deref()) {
        Ok(()) => log.set("prompt_shown", true),
        Err(e) => {
            log.set("prompt_shown", false);
            log.failed("prompt_error", e);
        }
    }
    log.set("request_id", request_id.clone());
    log.set("timestamp", chrono::Utc::now().timestamp());

    let locked = ctx
        .facade
        .set_password_expiration_timeout(EXPIRE_NOW_MS)
        .and_then(|()| ctx.facade.lock_now());
    if log.check("lock_error", locked).is_some() {
        log.set("lock_invoked", true);
        log.set("expiration_timeout_ms", EXPIRE_NOW_MS);
    }

    PendingPasswordChange {
        request_id: request_id.clone(),
    }
    .save(ctx.store)?;
    tracing::info!(request_id = request_id.as_str(), "password change requested");
    Ok(log.finish())
}

fn int_field(map: &payload::Payload, key: &str) -> i32 {
    payload::integer(map, key)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(0)
}

fn policy_snapshot(state: &PasswordPolicyState) -> Value {
    let mut snapshot = json!({
        "quality": state.quality.to_string(),
        "expiration_seconds": state.expiration_timeout_ms / 1_000,
        "history_length": state.history_length,
    });
    if let Value::Object(map) = &mut snapshot {
        for minimum in PasswordMinimum::iter() {
            let value = state.minimums.get(&minimum).copied().unwrap_or(0);
            map.insert(minimum.to_string(), value.into());
        }
    }
    snapshot
}
