use super::HandlerContext;
use serde_json::{Map, Value};

/// Collect the installed-package inventory and upload it. Failures are
/// reported in the returned meta entries and never fail the command.
pub async fn report(ctx: &HandlerContext<'_>, request_id: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    let packages = match ctx.facade.installed_packages() {
        Ok(packages) => packages,
        Err(e) => {
            tracing::warn!(request_id, "inventory collection failed: {e}");
            meta.insert("inventory_error".into(), e.to_string().into());
            return meta;
        }
    };
    meta.insert("inventory_count".into(), packages.len().into());

    match ctx.session.post_inventory(request_id, &packages).await {
        Ok(Some(_)) => {
            tracing::debug!(request_id, count = packages.len(), "inventory uploaded");
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(request_id, "inventory upload failed: {e}");
            meta.insert("inventory_error".into(), e.to_string().into());
        }
    }
    meta
}
