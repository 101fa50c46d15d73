use crate::app::context::AgentContext;
use crate::app::status::render_status;
use crate::cli::{Cli, Commands};
use crate::commands::report_password_changed;
use crate::config::Config;
use crate::push::PushSyncOutcome;
use crate::store::EnrolmentIdentity;
use crate::sync::refresh_mqtt_credentials;
use anyhow::{Result, bail};

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let ctx = AgentContext::from_config(config)?;

    match cli.command {
        Commands::Sync => {
            let report = ctx.orchestrator.run_cycle().await;
            if !report.success {
                bail!("sync failed: {}", report.summary);
            }
            println!("✅ {}", report.summary);
            Ok(())
        }

        Commands::PushToken => {
            let outcome = ctx.push.run(&ctx.backend).await?;
            match &outcome {
                PushSyncOutcome::NotEnrolled => println!("⚠️  Not enrolled: no device token"),
                PushSyncOutcome::WaitingForToken { retry_in_ms } => {
                    println!("⏳ No push token yet; retry in {}s", retry_in_ms / 1_000);
                }
                PushSyncOutcome::UpToDate => println!("✅ Push token already registered"),
                PushSyncOutcome::Registered => println!("✅ Push token registered"),
                PushSyncOutcome::Failed {
                    error,
                    auth_failure,
                    retry_in_ms,
                } => {
                    if *auth_failure {
                        println!("⚠️  Device credentials rejected; rotation required");
                    }
                    bail!("push token registration failed: {error} (retry in {}s)", retry_in_ms / 1_000);
                }
            }
            Ok(())
        }

        Commands::Daemon => crate::daemon::run(ctx).await,

        Commands::Status => {
            println!("{}", render_status(&ctx)?);
            Ok(())
        }

        Commands::RefreshCredentials => {
            let identity = EnrolmentIdentity::load(ctx.store.as_ref())?;
            let session = ctx.backend.session(&identity)?;
            let username = refresh_mqtt_credentials(ctx.store.as_ref(), &session).await?;
            println!("✅ MQTT credentials refreshed for {username}");
            Ok(())
        }

        Commands::PasswordChanged => {
            let identity = EnrolmentIdentity::load(ctx.store.as_ref())?;
            let session = ctx.backend.session(&identity)?;
            match report_password_changed(ctx.store.as_ref(), &session).await? {
                Some(request_id) => println!("✅ Password change reported (request {request_id})"),
                None => println!("No password change pending"),
            }
            Ok(())
        }
    }
}
