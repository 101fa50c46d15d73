#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use fleetsync::artifacts::{ArtifactFetcher, DirectoryInstaller};
use fleetsync::commands::CommandDispatcher;
use fleetsync::config::PushConfig;
use fleetsync::facade::{PolicyEnforcementFacade, SimulatedDevice};
use fleetsync::gateway::BackendClient;
use fleetsync::push::{JobScheduler, PushTokenSync, StoreJobScheduler, TokenInfo, TokenProducer};
use fleetsync::store::{EnrolmentIdentity, MemoryStore, StateStore};
use fleetsync::sync::SyncOrchestrator;

pub const DEVICE_TOKEN: &str = "device-token-1";
pub const MAX_ARTIFACT_BYTES: u64 = 1024 * 1024;

/// Backend mock, in-memory state and a simulated device wired together.
pub struct AgentHarness {
    pub server: MockServer,
    pub store: Arc<MemoryStore>,
    pub device: Arc<SimulatedDevice>,
    pub backend: BackendClient,
    pub scheduler: Arc<StoreJobScheduler>,
    tmp: TempDir,
}

impl AgentHarness {
    pub async fn new() -> Self {
        Self::with_device(SimulatedDevice::new(34)).await
    }

    pub async fn with_device(device: SimulatedDevice) -> Self {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let backend = BackendClient::new(&server.uri(), reqwest::Client::new());
        Self {
            scheduler: Arc::new(StoreJobScheduler::new(
                Arc::clone(&store) as Arc<dyn StateStore>
            )),
            server,
            store,
            device: Arc::new(device),
            backend,
            tmp: TempDir::new().expect("temp dir"),
        }
    }

    pub fn enrol(&self) {
        EnrolmentIdentity {
            device_id: Some("dev-1".into()),
            device_token: Some(DEVICE_TOKEN.into()),
            ..EnrolmentIdentity::default()
        }
        .save(self.store.as_ref())
        .expect("save identity");
    }

    pub fn identity(&self) -> EnrolmentIdentity {
        EnrolmentIdentity::load(self.store.as_ref()).expect("load identity")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.tmp.path().join("downloads")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.tmp.path().join("packages")
    }

    pub fn fetcher(&self) -> ArtifactFetcher {
        ArtifactFetcher::new(reqwest::Client::new(), self.download_dir())
    }

    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(
            Arc::clone(&self.device) as Arc<dyn PolicyEnforcementFacade>,
            self.fetcher(),
            Arc::new(DirectoryInstaller::new(self.packages_dir())),
            Arc::clone(&self.store) as Arc<dyn StateStore>,
            64,
            MAX_ARTIFACT_BYTES,
        )
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.backend.clone(),
            Arc::clone(&self.store) as Arc<dyn StateStore>,
            self.dispatcher(),
            30,
        )
    }

    pub fn push_sync(&self, producer: Arc<FakeProducer>) -> PushTokenSync {
        PushTokenSync::new(
            &PushConfig::default(),
            Arc::clone(&self.store) as Arc<dyn StateStore>,
            Arc::clone(&self.device) as Arc<dyn PolicyEnforcementFacade>,
            producer,
            Arc::clone(&self.scheduler) as Arc<dyn JobScheduler>,
        )
    }

    pub async fn mount_json(&self, http_method: &str, route: &str, status: u16, body: Value) {
        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_policy(&self, body: Value) {
        self.mount_json("GET", "/policy", 200, body).await;
    }

    pub async fn mount_inbox(&self, results: Value) {
        self.mount_json("POST", "/inbox", 200, json!({ "results": results }))
            .await;
    }

    pub async fn requests_to(&self, route: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == route)
            .collect()
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }
}

pub fn body_json(request: &Request) -> Value {
    serde_json::from_slice(&request.body).expect("json request body")
}

/// Token producer under test control.
#[derive(Default)]
pub struct FakeProducer {
    token: Mutex<Option<TokenInfo>>,
    refreshes: AtomicU32,
    registered: Mutex<Vec<TokenInfo>>,
}

impl FakeProducer {
    pub fn with_token(token: &str) -> Arc<Self> {
        let producer = Self::default();
        producer.set_token(Some(TokenInfo::new(token, 1_700_000_000_000)));
        Arc::new(producer)
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_token(&self, token: Option<TokenInfo>) {
        *self.token.lock().expect("token lock") = token;
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn registered(&self) -> Vec<TokenInfo> {
        self.registered.lock().expect("registered lock").clone()
    }
}

impl TokenProducer for FakeProducer {
    fn current_token(&self) -> Option<TokenInfo> {
        self.token.lock().expect("token lock").clone()
    }

    fn request_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_registered(&self, token: &TokenInfo) {
        self.registered
            .lock()
            .expect("registered lock")
            .push(token.clone());
    }
}
