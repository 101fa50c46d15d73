use crate::artifacts::{ArtifactFetcher, DirectoryInstaller};
use crate::commands::CommandDispatcher;
use crate::config::{Config, enrolment_from_env};
use crate::facade::{PolicyEnforcementFacade, SimulatedDevice};
use crate::gateway::BackendClient;
use crate::push::{FileTokenProducer, PushTokenSync, StoreJobScheduler};
use crate::store::{EnrolmentIdentity, JsonFileStore, StateStore};
use crate::sync::SyncOrchestrator;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Every long-lived component, wired from the config.
#[derive(Clone)]
pub struct AgentContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn StateStore>,
    pub facade: Arc<dyn PolicyEnforcementFacade>,
    pub backend: BackendClient,
    pub push: PushTokenSync,
    pub orchestrator: SyncOrchestrator,
}

impl AgentContext {
    pub fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn StateStore> = Arc::new(
            JsonFileStore::open(config.state_path()).context("Failed to open state store")?,
        );
        seed_enrolment(store.as_ref())?;

        let facade: Arc<dyn PolicyEnforcementFacade> =
            Arc::new(SimulatedDevice::from_config(&config.device));
        let backend = BackendClient::from_config(&config.backend);
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&facade),
            ArtifactFetcher::from_config(&config),
            Arc::new(DirectoryInstaller::new(config.packages_dir())),
            Arc::clone(&store),
            config.sync.journal_capacity,
            config.artifacts.max_bytes,
        );
        let push = PushTokenSync::new(
            &config.push,
            Arc::clone(&store),
            Arc::clone(&facade),
            Arc::new(FileTokenProducer::from_config(config.push.token_file.as_deref())),
            Arc::new(StoreJobScheduler::new(Arc::clone(&store))),
        );
        let orchestrator = SyncOrchestrator::new(
            backend.clone(),
            Arc::clone(&store),
            dispatcher,
            config.sync.default_poll_interval_secs,
        )
        .with_push(push.clone());

        Ok(Self {
            config: Arc::new(config),
            store,
            facade,
            backend,
            push,
            orchestrator,
        })
    }
}

/// Store enrolment values passed through the environment.
fn seed_enrolment(store: &dyn StateStore) -> Result<()> {
    let Some((device_id, token)) = enrolment_from_env() else {
        return Ok(());
    };
    let mut identity = EnrolmentIdentity::load(store)?;
    if identity.device_token.as_deref() == Some(token.as_str())
        && (device_id.is_empty() || identity.device_id.as_deref() == Some(device_id.as_str()))
    {
        return Ok(());
    }
    identity.device_token = Some(token);
    if !device_id.is_empty() {
        identity.device_id = Some(device_id);
    }
    identity.rotate_required = false;
    identity.save(store)?;
    tracing::info!("enrolment identity seeded from environment");
    Ok(())
}
