use super::payload::{self, Payload};
use super::{HandlerContext, Outcome, inventory};
use crate::gateway::Command;
use anyhow::Context;
use serde_json::{Map, Value, json};

fn empty() -> Payload {
    Map::new()
}

pub async fn uninstall_app(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let body = cmd.payload.clone().unwrap_or_else(empty);
    let Some(package) = payload::string(&body, "package_name") else {
        return Ok(Outcome::fail("missing_package_name"));
    };

    ctx.facade
        .uninstall_package(&package)
        .with_context(|| format!("uninstall {package}"))?;
    tracing::info!(package = package.as_str(), "uninstall invoked");

    let inventory = inventory::report(ctx, &ctx.request_id(cmd)).await;
    Ok(Outcome::ok()
        .with("package_name", package)
        .with_meta(inventory))
}

pub async fn suspend_app(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let body = cmd.payload.clone().unwrap_or_else(empty);
    let packages = payload::string_list(&body, "packages");
    if packages.is_empty() {
        return Ok(Outcome::fail("missing_packages"));
    }
    let suspended = payload::boolean(&body, "suspended", true);

    let refused = ctx.facade.set_packages_suspended(&packages, suspended)?;
    let per_package: Vec<Value> = packages
        .iter()
        .map(|package| {
            let applied = !refused.contains(package);
            json!({"package": package, "success": applied})
        })
        .collect();
    tracing::info!(suspended, count = packages.len(), refused = refused.len(), "suspend_app invoked");

    let mut meta = Map::new();
    meta.insert("suspended".into(), suspended.into());
    meta.insert("packages".into(), per_package.into());
    if !refused.is_empty() {
        meta.insert("refused".into(), json!(refused));
    }
    meta.extend(inventory::report(ctx, &ctx.request_id(cmd)).await);
    Ok(Outcome::aggregate(refused.is_empty(), meta))
}

pub async fn hide_app(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let body = cmd.payload.clone().unwrap_or_else(empty);
    let packages = payload::string_list(&body, "packages");
    if packages.is_empty() {
        return Ok(Outcome::fail("missing_packages"));
    }
    let hidden = payload::boolean(&body, "hidden", true);

    let mut all_ok = true;
    let mut per_package = Vec::with_capacity(packages.len());
    for package in &packages {
        let entry = match ctx.facade.set_application_hidden(package, hidden) {
            Ok(true) => json!({"package": package, "success": true}),
            Ok(false) => {
                all_ok = false;
                json!({"package": package, "success": false, "message": "not_applied"})
            }
            Err(e) => {
                all_ok = false;
                json!({"package": package, "success": false, "message": e.to_string()})
            }
        };
        per_package.push(entry);
    }
    tracing::info!(hidden, count = packages.len(), all_ok, "hide_app invoked");

    let mut meta = Map::new();
    meta.insert("hidden".into(), hidden.into());
    meta.insert("packages".into(), per_package.into());
    meta.extend(inventory::report(ctx, &ctx.request_id(cmd)).await);
    Ok(Outcome::aggregate(all_ok, meta))
}

pub async fn block_uninstall(ctx: &HandlerContext<'_>, cmd: &Command) -> anyhow::Result<Outcome> {
    let body = cmd.payload.clone().unwrap_or_else(empty);
    let packages = payload::string_list(&body, "packages");
    if packages.is_empty() {
        return Ok(Outcome::fail("missing_packages"));
    }
    let blocked = payload::boolean(&body, "blocked", true);

    let mut all_ok = true;
    let mut per_package = Vec::with_capacity(packages.len());
    for package in &packages {
        match ctx.facade.set_uninstall_blocked(package, blocked) {
            Ok(()) => per_package.push(json!({"package": package, "blocked": blocked})),
            Err(e) => {
                all_ok = false;
                tracing::warn!(package = package.as_str(), "block_uninstall failed: {e}");
                per_package.push(json!({
                    "package": package,
                    "blocked": !blocked,
                    "message": e.to_string(),
                }));
            }
        }
    }

    let mut meta = Map::new();
    meta.insert("blocked".into(), blocked.into());
    meta.insert("packages".into(), per_package.into());
    if all_ok {
        meta.extend(inventory::report(ctx, &ctx.request_id(cmd)).await);
    }
    Ok(Outcome::aggregate(all_ok, meta))
}
