use crate::app::context::AgentContext;
use crate::commands::PendingPasswordChange;
use crate::daemon::state_file_path;
use crate::push::{PUSH_TOKEN_RETRY, PushTokenState};
use crate::store::{EnrolmentIdentity, PolicySnapshot};
use anyhow::Result;

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn millis_to_rfc3339(millis: i64) -> String {
    if millis <= 0 {
        return "never".into();
    }
    chrono::DateTime::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |at| at.to_rfc3339())
}

pub fn render_status(ctx: &AgentContext) -> Result<String> {
    let store = ctx.store.as_ref();
    let config = &ctx.config;
    let identity = EnrolmentIdentity::load(store)?;

    let mut lines = vec![
        "◆ fleetsync status".to_string(),
        String::new(),
        format!("Version:     {}", env!("CARGO_PKG_VERSION")),
        format!("Config:      {}", config.config_path.display()),
        format!("Data dir:    {}", config.data_dir.display()),
        format!("Backend:     {}", ctx.backend.base_url()),
        format!(
            "Device:      level {} (owner: {})",
            ctx.facade.platform_level(),
            yes_no(ctx.facade.is_device_owner())
        ),
        String::new(),
        "Enrolment".to_string(),
        format!(
            "  device id:       {}",
            identity.device_id.as_deref().unwrap_or("(none)")
        ),
        format!("  device token:    {}", yes_no(identity.token().is_some())),
        format!("  mqtt password:   {}", yes_no(identity.mqtt_password.is_some())),
        format!("  rotate required: {}", yes_no(identity.rotate_required)),
    ];

    lines.push(String::new());
    lines.push("Policy".to_string());
    match PolicySnapshot::load(store)? {
        Some(policy) => {
            lines.push(format!(
                "  etag:          {}",
                policy.etag.as_deref().unwrap_or("(none)")
            ));
            lines.push(format!("  poll interval: {}s", policy.poll_interval_sec));
        }
        None => lines.push("  (not fetched yet)".to_string()),
    }

    let push = PushTokenState::load(store)?;
    lines.push(String::new());
    lines.push("Push token".to_string());
    lines.push(format!(
        "  registered:       {}",
        yes_no(push.last_synced_token.is_some())
    ));
    lines.push(format!(
        "  last sync:        {}",
        millis_to_rfc3339(push.last_sync_time)
    ));
    lines.push(format!("  waiting for token: {}", yes_no(push.waiting_for_core)));
    lines.push(format!("  backoff attempts: {}", push.backoff_attempts));
    if let Some(job) = ctx.push.scheduler().pending(PUSH_TOKEN_RETRY)? {
        lines.push(format!("  retry due:        {}", job.due_at.to_rfc3339()));
    }

    if let Some(pending) = PendingPasswordChange::load(store)? {
        lines.push(String::new());
        lines.push(format!("Password change pending: {}", pending.request_id));
    }

    let daemon_state = state_file_path(config);
    lines.push(String::new());
    lines.push(format!(
        "Daemon state: {}",
        if daemon_state.exists() {
            daemon_state.display().to_string()
        } else {
            "(daemon not running)".to_string()
        }
    ));

    Ok(lines.join("\n"))
}
