use super::payload;
use super::{HandlerContext, Outcome};
use crate::facade::{PolicyEnforcementFacade, Scope};
use crate::gateway::Command;
use serde_json::{Map, Value, json};

/// User restriction keys the agent reads and writes.
pub const SUPPORTED_USER_RESTRICTIONS: &[&str] = &[
    "no_add_managed_profile",
    "no_add_user",
    "no_adjust_volume",
    "no_control_apps",
    "no_bluetooth",
    "no_change_wifi_state",
    "no_config_bluetooth",
    "no_config_cell_broadcasts",
    "no_config_credentials",
    "no_config_mobile_networks",
    "no_config_tethering",
    "no_config_vpn",
    "no_config_wifi",
    "no_content_capture",
    "no_content_suggestions",
    "no_create_windows",
    "no_system_error_dialogs",
    "no_data_roaming",
    "no_debugging_features",
    "no_factory_reset",
    "no_fun",
    "no_install_apps",
    "no_install_unknown_sources",
    "no_install_unknown_sources_globally",
    "no_modify_accounts",
    "no_physical_media",
    "no_network_reset",
    "no_outgoing_beam",
    "no_outgoing_calls",
    "no_remove_managed_profile",
    "no_remove_user",
    "no_safe_boot",
    "no_set_user_icon",
    "no_set_wallpaper",
    "no_share_location",
    "no_sms",
    "no_uninstall_apps",
    "no_unmute_microphone",
    "no_usb_file_transfer",
    "ensure_verify_apps",
    "no_autofill",
    "no_bluetooth_sharing",
    "no_user_switch",
    "no_config_location",
    "no_airplane_mode",
    "no_config_brightness",
    "no_config_date_time",
    "no_config_screen_timeout",
    "no_ambient_display",
    "no_printing",
    "disallow_config_private_dns",
    "disallow_microphone_toggle",
    "disallow_camera_toggle",
    "no_wifi_tethering",
    "no_sharing_admin_configured_wifi",
    "no_wifi_direct",
    "no_add_wifi_config",
    "no_cellular_2g",
    "disallow_config_default_apps",
    "no_config_locale",
    "no_ultra_wideband_radio",
    "no_assist_content",
    "no_sim_globally",
    "no_add_private_profile",
];

pub const NO_CONFIG_LOCATION: &str = "no_config_location";

/// Canonical key for a requested restriction name, if supported.
pub fn resolve_key(key: &str) -> Option<&'static str> {
    SUPPORTED_USER_RESTRICTIONS
        .iter()
        .copied()
        .find(|supported| *supported == key)
}

/// Organization-owned managed profiles apply device-wide restrictions
/// through the parent profile.
pub fn target_scope(facade: &dyn PolicyEnforcementFacade) -> Scope {
    if facade.is_org_owned_managed_profile() {
        Scope::Parent
    } else {
        Scope::Own
    }
}

pub fn get_user_restrictions(ctx: &HandlerContext<'_>) -> anyhow::Result<Outcome> {
    let scope = target_scope(ctx.facade);
    let active = ctx.facade.user_restrictions(scope)?;
    let restrictions: Map<String, Value> = SUPPORTED_USER_RESTRICTIONS
        .iter()
        .map(|key| ((*key).to_string(), Value::Bool(active.contains(*key))))
        .collect();
    Ok(Outcome::ok().with("restrictions", restrictions))
}

pub fn set_user_restrictions(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let Some(requested) = cmd
        .payload
        .as_ref()
        .and_then(|body| payload::object(body, "restrictions"))
    else {
        return Ok(Outcome::fail("missing_restrictions"));
    };

    let scope = target_scope(ctx.facade);
    let mut all_ok = true;
    let mut per_key = Vec::with_capacity(requested.len());
    for key in requested.keys() {
        let Some(resolved) = resolve_key(key) else {
            all_ok = false;
            per_key.push(json!({
                "key": key,
                "resolved_key": Value::Null,
                "success": false,
                "message": "unsupported_key",
            }));
            continue;
        };
        let value = payload::boolean(requested, key, false);
        match ctx.facade.set_user_restriction(scope, resolved, value) {
            Ok(()) => per_key.push(json!({
                "key": key,
                "resolved_key": resolved,
                "success": true,
                "value": value,
            })),
            Err(e) => {
                all_ok = false;
                tracing::warn!(key = resolved, "user restriction apply failed: {e}");
                per_key.push(json!({
                    "key": key,
                    "resolved_key": resolved,
                    "success": false,
                    "value": value,
                    "message": e.to_string(),
                }));
            }
        }
    }

    let mut meta = Map::new();
    meta.insert("all_ok".into(), all_ok.into());
    meta.insert("scope".into(), json!(scope));
    meta.insert("per_key".into(), per_key.into());
    Ok(Outcome::aggregate(all_ok, meta))
}
