//! HTTP gateway to the management backend.
//!
//! Every call carries the device token twice (`X-Device-Token` and
//! `Authorization: Device <token>`) and uses a bounded timeout. Non-2xx
//! responses surface as [`GatewayError::Status`] with the response body
//! attached; nothing here retries.

pub mod http_client;
pub mod types;

use crate::config::BackendConfig;
use crate::error::GatewayError;
use crate::store::EnrolmentIdentity;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use types::{
    AckRecord, Command, InboxResponse, MqttCredentials, PackageRecord, PolicyResponse,
};
use types::{
    AckBatch, InboxRequest, InventoryUpload, LockScreenTelemetry, PasswordChangeState,
    PushTokenRequest,
};

const DEVICE_TOKEN_HEADER: &str = "X-Device-Token";

/// Shared HTTP client plus backend base URL. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(
            &config.base_url,
            http_client::build_backend_client(config.timeout_secs, config.connect_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bind the client to the enrolled device. Fails with
    /// [`GatewayError::MissingDeviceToken`] before any network I/O when the
    /// device has no token.
    pub fn session(&self, identity: &EnrolmentIdentity) -> Result<DeviceSession, GatewayError> {
        let token = identity.token().ok_or(GatewayError::MissingDeviceToken)?;
        Ok(DeviceSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            auth_header: format!("Device {token}"),
            token: token.to_string(),
            device_id: identity.device_id.clone().filter(|id| !id.is_empty()),
        })
    }
}

/// Authenticated view of the backend for one device.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    client: Client,
    base_url: String,
    token: String,
    /// Pre-computed `"Device <token>"` header value.
    auth_header: String,
    device_id: Option<String>,
}

impl DeviceSession {
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// `GET /policy`
    pub async fn get_policy(&self) -> Result<PolicyResponse, GatewayError> {
        let endpoint = "GET /policy";
        let request = self.authorize(self.client.get(self.url("/policy")));
        let body = Self::execute(endpoint, request).await?;
        decode(endpoint, &body)
    }

    /// `POST /inbox`
    pub async fn post_inbox(&self, is_device_owner: bool) -> Result<Vec<Value>, GatewayError> {
        let response: InboxResponse =
            self.post_json("POST /inbox", "/inbox", &InboxRequest { is_device_owner })
                .await?;
        Ok(response.results.unwrap_or_default())
    }

    /// `POST /ack`
    pub async fn post_ack(&self, records: &[AckRecord]) -> Result<Value, GatewayError> {
        self.post_json("POST /ack", "/ack", &AckBatch { commands: records })
            .await
    }

    /// `POST /inventory`. Returns `Ok(None)` without contacting the backend
    /// when the package list is empty.
    pub async fn post_inventory(
        &self,
        request_id: &str,
        packages: &[PackageRecord],
    ) -> Result<Option<Value>, GatewayError> {
        if packages.is_empty() {
            tracing::debug!(request_id, "inventory empty; upload skipped");
            return Ok(None);
        }
        let body = InventoryUpload {
            request_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            packages,
            device_id: self.device_id(),
        };
        self.post_json("POST /inventory", "/inventory", &body)
            .await
            .map(Some)
    }

    /// `POST /push-token`
    pub async fn post_push_token(&self, token: &str, enabled: bool) -> Result<Value, GatewayError> {
        self.post_json(
            "POST /push-token",
            "/push-token",
            &PushTokenRequest { token, enabled },
        )
        .await
    }

    /// `POST /lock-screen/state`
    pub async fn post_lock_screen_state(
        &self,
        request_id: &str,
        lock_screen: &Value,
    ) -> Result<Value, GatewayError> {
        let body = LockScreenTelemetry {
            request_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            lock_screen,
        };
        self.post_json("POST /lock-screen/state", "/lock-screen/state", &body)
            .await
    }

    /// `POST /password-change/state`
    pub async fn post_password_change_state(
        &self,
        request_id: &str,
        changed: bool,
        status: &str,
    ) -> Result<Value, GatewayError> {
        let body = PasswordChangeState {
            request_id,
            changed,
            status,
        };
        self.post_json("POST /password-change/state", "/password-change/state", &body)
            .await
    }

    /// `POST /mqtt/credentials`
    pub async fn post_mqtt_credentials(&self) -> Result<MqttCredentials, GatewayError> {
        self.post_json("POST /mqtt/credentials", "/mqtt/credentials", &serde_json::json!({}))
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(DEVICE_TOKEN_HEADER, &self.token)
            .header("Authorization", &self.auth_header)
    }

    async fn post_json<B, T>(&self, endpoint: &str, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorize(self.client.post(self.url(path))).json(body);
        let text = Self::execute(endpoint, request).await?;
        decode(endpoint, &text)
    }

    /// Send the request and return the raw body of a 2xx response.
    async fn execute(endpoint: &str, request: reqwest::RequestBuilder) -> Result<String, GatewayError> {
        let response = request.send().await.map_err(|e| GatewayError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| GatewayError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
        tracing::info!(
            endpoint,
            status = status.as_u16(),
            body_len = body.len(),
            "backend call"
        );
        if !status.is_success() {
            return Err(GatewayError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Decode a 2xx body. Empty and `null` bodies decode as `null` for opaque
/// responses and as an empty object for typed ones.
fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, GatewayError> {
    let trimmed = body.trim();
    let parsed = if trimmed.is_empty() || trimmed == "null" {
        serde_json::from_str("null").or_else(|_| serde_json::from_str("{}"))
    } else {
        serde_json::from_str(trimmed)
    };
    parsed.map_err(|e| GatewayError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn identity(token: &str) -> EnrolmentIdentity {
        EnrolmentIdentity {
            device_id: Some("dev-1".into()),
            device_token: Some(token.into()),
            ..EnrolmentIdentity::default()
        }
    }

    fn session_for(server: &MockServer) -> DeviceSession {
        BackendClient::new(&server.uri(), Client::new())
            .session(&identity("tok-1"))
            .unwrap()
    }

    #[test]
    fn session_requires_token() {
        let client = BackendClient::new("http://localhost", Client::new());
        let err = client.session(&EnrolmentIdentity::default()).unwrap_err();
        assert!(matches!(err, GatewayError::MissingDeviceToken));
        assert_eq!(err.to_string(), "missing_device_token");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = BackendClient::new("http://localhost/api/", Client::new());
        assert_eq!(client.base_url(), "http://localhost/api");
    }

    #[tokio::test]
    async fn policy_sends_both_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/policy"))
            .and(header("X-Device-Token", "tok-1"))
            .and(header("Authorization", "Device tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "policy_etag": "e1",
                "poll_interval_sec": 60,
                "policy": {"camera": false}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let policy = session_for(&server).get_policy().await.unwrap();
        assert_eq!(policy.policy_etag.as_deref(), Some("e1"));
        assert_eq!(policy.poll_interval_sec, Some(60));
    }

    #[tokio::test]
    async fn non_success_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/policy"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = session_for(&server).get_policy().await.unwrap_err();
        assert!(err.is_auth_failure());
        match err {
            GatewayError::Status { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad token");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn inbox_posts_owner_flag_and_tolerates_missing_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inbox"))
            .and(body_json(json!({"is_device_owner": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let results = session_for(&server).post_inbox(true).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn ack_wraps_records_in_commands_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ack"))
            .and(body_json(json!({"commands": [{"id": 1, "command": "wipe", "success": true}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acked": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let mut ack = AckRecord::envelope(&Command::new(1, "wipe"));
        ack.success = true;
        let response = session_for(&server).post_ack(&[ack]).await.unwrap();
        assert_eq!(response["acked"], 1);
    }

    #[tokio::test]
    async fn empty_inventory_is_not_uploaded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inventory"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = session_for(&server).post_inventory("req-1", &[]).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn empty_body_decodes_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push-token"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let response = session_for(&server)
            .post_push_token("fcm-1", true)
            .await
            .unwrap();
        assert!(response.is_null());
    }

    #[tokio::test]
    async fn mqtt_credentials_are_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mqtt/credentials"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"username": "dev-1", "password": "s3cret"})),
            )
            .mount(&server)
            .await;

        let creds = session_for(&server).post_mqtt_credentials().await.unwrap();
        assert_eq!(creds.password.as_deref(), Some("s3cret"));
    }
}
