use super::payload;
use super::restrictions::NO_CONFIG_LOCATION;
use super::{HandlerContext, Outcome};
use crate::facade::{Scope, WipeFlags, level};
use crate::gateway::Command;

pub fn set_location(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let enabled = cmd
        .payload
        .as_ref()
        .is_some_and(|body| payload::boolean(body, "enabled", false));

    if !ctx.facade.supports(level::R) {
        return Ok(Outcome::fail("capability_unavailable: requires_api_30")
            .with("current_state", ctx.facade.location_enabled()));
    }

    let applied = ctx
        .facade
        .set_location_enabled(enabled)
        .and_then(|()| {
            ctx.facade
                .set_user_restriction(Scope::Own, NO_CONFIG_LOCATION, true)
        });
    let current = ctx.facade.location_enabled();
    tracing::info!(enabled, current, "set_location invoked");
    Ok(match applied {
        Ok(()) => Outcome::ok().with("enabled", enabled),
        Err(e) => Outcome::fail(e.to_string()),
    }
    .with("current_state", current))
}

pub fn wipe(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let flags = cmd
        .payload
        .as_ref()
        .map(|body| WipeFlags {
            external_storage: payload::boolean(body, "wipe_external_storage", false),
            reset_protection_data: payload::boolean(body, "wipe_reset_protection_data", false),
        })
        .unwrap_or_default();

    let (strategy, result) = if ctx.facade.supports(level::U) {
        ("wipe_device", ctx.facade.wipe_device(flags))
    } else if ctx.facade.is_org_owned_managed_profile() {
        // Parent-scope wipe takes no flags.
        ("parent_profile", ctx.facade.wipe_parent_profile())
    } else {
        ("wipe_data", ctx.facade.wipe_data(flags))
    };
    tracing::warn!(flags = flags.bits(), strategy, "wipe invoked");

    let outcome = match result {
        Ok(()) => Outcome::ok(),
        Err(e) => Outcome::fail(e.to_string()),
    };
    Ok(outcome
        .with("flags", flags.bits())
        .with("strategy", strategy))
}
