//! Command dispatcher: maps each inbox command to a handler and turns the
//! handler's result into an ack record.

mod apps;
mod device;
mod install;
mod inventory;
pub mod journal;
mod lock_screen;
mod password;
pub mod payload;
mod restrictions;
mod steps;
pub mod types;

use crate::artifacts::{ArtifactFetcher, PackageInstaller};
use crate::facade::PolicyEnforcementFacade;
use crate::gateway::{AckRecord, Command, DeviceSession};
use crate::store::StateStore;
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

pub use journal::CommandJournal;
pub use password::{PendingPasswordChange, report_password_changed};
pub use restrictions::SUPPORTED_USER_RESTRICTIONS;
pub use types::{CommandKind, Outcome};

/// Everything a handler may touch while processing one command.
pub struct HandlerContext<'a> {
    pub facade: &'a dyn PolicyEnforcementFacade,
    pub session: &'a DeviceSession,
    pub fetcher: &'a ArtifactFetcher,
    pub installer: &'a dyn PackageInstaller,
    pub store: &'a dyn StateStore,
    pub max_artifact_bytes: u64,
    /// Identifier of the sync cycle, used when the command has neither a
    /// queue id nor a numeric id.
    pub cycle_request_id: &'a str,
}

impl HandlerContext<'_> {
    /// Request id for telemetry: `qid`, else the command id, else the cycle id.
    pub fn request_id(&self, cmd: &Command) -> String {
        cmd.request_ref()
            .unwrap_or_else(|| self.cycle_request_id.to_string())
    }
}

/// Long-lived dispatcher dependencies.
#[derive(Clone)]
pub struct CommandDispatcher {
    facade: Arc<dyn PolicyEnforcementFacade>,
    fetcher: ArtifactFetcher,
    installer: Arc<dyn PackageInstaller>,
    store: Arc<dyn StateStore>,
    journal: CommandJournal,
    max_artifact_bytes: u64,
}

impl CommandDispatcher {
    pub fn new(
        facade: Arc<dyn PolicyEnforcementFacade>,
        fetcher: ArtifactFetcher,
        installer: Arc<dyn PackageInstaller>,
        store: Arc<dyn StateStore>,
        journal_capacity: usize,
        max_artifact_bytes: u64,
    ) -> Self {
        Self {
            journal: CommandJournal::new(Arc::clone(&store), journal_capacity),
            facade,
            fetcher,
            installer,
            store,
            max_artifact_bytes,
        }
    }

    pub fn facade(&self) -> &Arc<dyn PolicyEnforcementFacade> {
        &self.facade
    }

    pub fn journal(&self) -> &CommandJournal {
        &self.journal
    }

    /// Process one command. Never fails: unknown types, handler errors and
    /// handler panics all become a failed ack carrying the command's
    /// id/qid/type.
    pub async fn dispatch(
        &self,
        session: &DeviceSession,
        cmd: &Command,
        cycle_request_id: &str,
    ) -> AckRecord {
        let mut ack = AckRecord::envelope(cmd);
        let Ok(kind) = CommandKind::from_str(&cmd.kind) else {
            tracing::warn!(id = cmd.id, command = cmd.kind.as_str(), "unsupported command type");
            ack.error = Some("unsupported_type".into());
            return ack;
        };

        if kind.is_journaled()
            && let Some(previous) = self.replay(cmd)
        {
            tracing::info!(id = cmd.id, command = kind.as_ref(), "redelivered command; replaying ack");
            return previous;
        }

        let ctx = HandlerContext {
            facade: self.facade.as_ref(),
            session,
            fetcher: &self.fetcher,
            installer: self.installer.as_ref(),
            store: self.store.as_ref(),
            max_artifact_bytes: self.max_artifact_bytes,
            cycle_request_id,
        };

        let started = std::time::Instant::now();
        let result = AssertUnwindSafe(run_handler(kind, &ctx, cmd))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(outcome)) => {
                ack.success = outcome.success;
                ack.error = outcome.error;
                if !outcome.meta.is_empty() {
                    ack.meta = Some(outcome.meta);
                }
            }
            Ok(Err(e)) => {
                ack.error = Some(format!("{e:#}"));
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(id = cmd.id, command = kind.as_ref(), "handler panicked: {message}");
                ack.error = Some(message);
            }
        }

        tracing::info!(
            id = cmd.id,
            qid = cmd.qid.as_deref().unwrap_or(""),
            command = kind.as_ref(),
            success = ack.success,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "command processed"
        );

        if kind.is_journaled()
            && let Err(e) = self.journal.record(&ack)
        {
            tracing::warn!(id = cmd.id, "failed to journal applied command: {e}");
        }
        ack
    }

    fn replay(&self, cmd: &Command) -> Option<AckRecord> {
        let mut previous = match self.journal.lookup(cmd.id, &cmd.kind) {
            Ok(found) => found?,
            Err(e) => {
                tracing::warn!(id = cmd.id, "command journal unreadable: {e}");
                return None;
            }
        };
        previous.qid.clone_from(&cmd.qid);
        previous.command.clone_from(&cmd.kind);
        previous
            .meta
            .get_or_insert_with(serde_json::Map::new)
            .insert("replayed".into(), Value::Bool(true));
        Some(previous)
    }
}

async fn run_handler(
    kind: CommandKind,
    ctx: &HandlerContext<'_>,
    cmd: &Command,
) -> anyhow::Result<Outcome> {
    match kind {
        CommandKind::InstallApkPackage => install::install_apk_package(ctx, cmd).await,
        CommandKind::UninstallApp => apps::uninstall_app(ctx, cmd).await,
        CommandKind::SuspendApp => apps::suspend_app(ctx, cmd).await,
        CommandKind::HideApp => apps::hide_app(ctx, cmd).await,
        CommandKind::BlockUninstall => apps::block_uninstall(ctx, cmd).await,
        CommandKind::GetUserRestrictions => restrictions::get_user_restrictions(ctx),
        CommandKind::SetUserRestrictions => restrictions::set_user_restrictions(ctx, cmd),
        CommandKind::SetLocation => device::set_location(ctx, cmd),
        CommandKind::Wipe => device::wipe(ctx, cmd),
        CommandKind::SetLockScreen => lock_screen::set_lock_screen(ctx, cmd).await,
        CommandKind::SetPasswordPolicy => password::set_password_policy(ctx, cmd),
        CommandKind::SetPasswordComplexity => password::set_password_complexity(ctx, cmd),
        CommandKind::RequestPasswordChange => password::request_password_change(ctx, cmd),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".into()
    }
}
