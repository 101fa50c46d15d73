use super::payload::{self, Payload};
use super::steps::StepLog;
use super::{HandlerContext, Outcome};
use crate::facade::{KeyguardFeature, LockScreenState, PasswordComplexity, level};
use crate::gateway::Command;
use serde_json::{Map, Value, json};
use std::str::FromStr;
use strum::IntoEnumIterator;

const MILLIS_PER_SECOND: u64 = 1_000;

pub async fn set_lock_screen(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let Some(body) = cmd.payload.as_ref() else {
        return Ok(Outcome::fail("missing_payload"));
    };
    let Some(lock) = payload::object(body, "lock_screen") else {
        return Ok(Outcome::fail("missing_lock_screen"));
    };
    let facade = ctx.facade;
    let mut log = StepLog::new();

    if lock.contains_key("message") {
        let message = payload::string(lock, "message").unwrap_or_default();
        if log
            .check("message_error", facade.set_lock_screen_message(&message))
            .is_some()
        {
            log.set("message", message);
        }
    }

    if let Some(seconds) = non_negative(lock, "max_time_to_lock_seconds") {
        match seconds.checked_mul(MILLIS_PER_SECOND) {
            None => log.failed("max_time_to_lock_seconds_error", "invalid_value"),
            Some(ms) => {
                if log
                    .check("max_time_to_lock_seconds_error", facade.set_max_time_to_lock(ms))
                    .is_some()
                {
                    log.set("max_time_to_lock_seconds", seconds);
                }
            }
        }
    }

    if let Some(seconds) = non_negative(lock, "strong_auth_timeout_seconds") {
        if !facade.supports(level::O) {
            log.skipped("strong_auth_timeout", "requires_api_26");
        } else {
            match seconds.checked_mul(MILLIS_PER_SECOND) {
                None => log.failed("strong_auth_timeout_seconds_error", "invalid_value"),
                Some(ms) => {
                    if log
                        .check(
                            "strong_auth_timeout_seconds_error",
                            facade.set_required_strong_auth_timeout(ms),
                        )
                        .is_some()
                    {
                        log.set("strong_auth_timeout_seconds", seconds);
                    }
                }
            }
        }
    }

    if let Some(count) = payload::integer(lock, "max_failed_password_for_wipe").filter(|c| *c >= 0)
    {
        let count = i32::try_from(count).unwrap_or(i32::MAX);
        if log
            .check(
                "max_failed_password_for_wipe_error",
                facade.set_max_failed_passwords_for_wipe(count),
            )
            .is_some()
        {
            log.set("max_failed_password_for_wipe", count);
        }
    }

    let requested_features = payload::object(lock, "keyguard_features");
    if let Some(requested) = requested_features {
        apply_keyguard_features(ctx, requested, &mut log);
    }

    let trust_agent = payload::object(lock, "trust_agent").and_then(|ta| {
        let component = payload::string(ta, "component").and_then(|c| normalize_component(&c))?;
        Some((component, payload::object(ta, "config").cloned()))
    });
    if let Some((component, config)) = &trust_agent {
        let config_map = config.clone().unwrap_or_default();
        if log
            .check(
                "trust_agent_error",
                facade.set_trust_agent_configuration(component, &config_map),
            )
            .is_some()
        {
            log.set("trust_agent", json!({"component": component, "config": config}));
        }
    }

    if lock.contains_key("password_complexity") {
        let requested = payload::string(lock, "password_complexity");
        match requested {
            Some(value) if facade.supports(level::R) => {
                match PasswordComplexity::from_str(&value) {
                    Ok(complexity) => {
                        if log
                            .check(
                                "password_complexity_error",
                                facade.set_required_password_complexity(complexity),
                            )
                            .is_some()
                        {
                            log.set("password_complexity", complexity.to_string());
                        }
                    }
                    Err(_) => log.failed("password_complexity_error", "invalid_value"),
                }
            }
            _ => log.skipped("password_complexity", "requires_api_30"),
        }
    }

    let request_id = ctx.request_id(cmd);
    match facade.lock_screen_state() {
        Ok(state) => {
            let snapshot = telemetry_snapshot(
                &state,
                trust_agent.as_ref().map(|(component, _)| component.as_str()),
                requested_features,
            );
            match ctx
                .session
                .post_lock_screen_state(&request_id, &snapshot)
                .await
            {
                Ok(_) => log.set("telemetry_sent", true),
                Err(e) => log.set("telemetry_error", e.to_string()),
            }
        }
        Err(e) => log.set("telemetry_error", e.to_string()),
    }

    let outcome = log.finish();
    tracing::info!(
        request_id = request_id.as_str(),
        success = outcome.success,
        "set_lock_screen applied"
    );
    Ok(outcome)
}

fn non_negative(map: &Payload, key: &str) -> Option<u64> {
    payload::integer(map, key).and_then(|v| u64::try_from(v).ok())
}

fn apply_keyguard_features(ctx: &HandlerContext<'_>, requested: &Payload, log: &mut StepLog) {
    let Some(state) = log.check("keyguard_error", ctx.facade.lock_screen_state()) else {
        return;
    };
    let mut disabled = state.keyguard_disabled;
    let mut per_key = Vec::new();
    for feature in KeyguardFeature::iter() {
        if !requested.contains_key(feature.as_ref()) {
            continue;
        }
        let value = payload::boolean(requested, feature.as_ref(), false);
        if value {
            disabled.insert(feature);
        } else {
            disabled.remove(&feature);
        }
        per_key.push(json!({"key": feature.as_ref(), "value": value}));
    }
    if log
        .check(
            "keyguard_error",
            ctx.facade.set_keyguard_disabled_features(&disabled),
        )
        .is_some()
        && !per_key.is_empty()
    {
        log.set("per_key", per_key);
    }
}

/// `pkg/.Service` expands to `pkg/pkg.Service`; strings without a package
/// part are rejected.
fn normalize_component(raw: &str) -> Option<String> {
    let (package, class) = raw.split_once('/')?;
    if package.is_empty() || class.is_empty() {
        return None;
    }
    if let Some(short) = class.strip_prefix('.') {
        Some(format!("{package}/{package}.{short}"))
    } else {
        Some(raw.to_string())
    }
}

/// Lock-screen state as reported to the backend. Keyguard features always
/// list every known flag; unknown requested keys are echoed as requested.
fn telemetry_snapshot(
    state: &LockScreenState,
    trust_agent: Option<&str>,
    requested_features: Option<&Payload>,
) -> Value {
    let mut snapshot = Map::new();
    if let Some(message) = &state.message {
        snapshot.insert("message".into(), message.clone().into());
    }
    snapshot.insert(
        "max_time_to_lock_seconds".into(),
        (state.max_time_to_lock_ms / MILLIS_PER_SECOND).into(),
    );
    if let Some(ms) = state.strong_auth_timeout_ms {
        snapshot.insert(
            "strong_auth_timeout_seconds".into(),
            (ms / MILLIS_PER_SECOND).into(),
        );
    }
    snapshot.insert(
        "max_failed_password_for_wipe".into(),
        state.max_failed_passwords_for_wipe.into(),
    );

    let mut features: Map<String, Value> = KeyguardFeature::iter()
        .map(|f| {
            (
                f.as_ref().to_string(),
                Value::Bool(state.keyguard_disabled.contains(&f)),
            )
        })
        .collect();
    if let Some(requested) = requested_features {
        for key in requested.keys() {
            if !features.contains_key(key) {
                features.insert(key.clone(), payload::boolean(requested, key, false).into());
            }
        }
    }
    snapshot.insert("keyguard_features".into(), features.into());

    if let Some(component) = trust_agent
        && let Some(config) = state.trust_agents.get(component)
    {
        snapshot.insert(
            "trust_agent".into(),
            json!({"component": component, "config": config}),
        );
    }
    if let Some(complexity) = state.password_complexity {
        snapshot.insert("password_complexity".into(), complexity.to_string().into());
    }
    Value::Object(snapshot)
}
