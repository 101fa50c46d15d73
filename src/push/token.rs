use crate::facade::PolicyEnforcementFacade;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Application-restriction keys the producer package reads its token from.
pub const RESTRICTION_TOKEN_KEY: &str = "fcm_registration_token";
pub const RESTRICTION_UPDATED_AT_KEY: &str = "fcm_token_updated_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token: String,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TokenInfo {
    pub fn new(token: impl Into<String>, updated_at: i64) -> Self {
        let token = token.into();
        Self {
            enabled: !token.is_empty(),
            token,
            updated_at,
        }
    }
}

/// The messaging client that owns the push token.
pub trait TokenProducer: Send + Sync {
    /// Token from the producer's primary source, if it has one.
    fn current_token(&self) -> Option<TokenInfo>;

    /// Ask the producer to obtain a fresh token.
    fn request_refresh(&self);

    /// Tell the producer its token is registered with the backend.
    fn notify_registered(&self, token: &TokenInfo);
}

/// Producer that publishes its token as a JSON file
/// (`{"token": "...", "updated_at": <millis>}`). Signals back to the
/// producer are marker files next to it.
#[derive(Debug, Clone)]
pub struct FileTokenProducer {
    token_file: Option<PathBuf>,
}

impl FileTokenProducer {
    pub fn new(token_file: Option<PathBuf>) -> Self {
        Self { token_file }
    }

    /// Expands `~` in the configured path.
    pub fn from_config(token_file: Option<&str>) -> Self {
        Self::new(token_file.map(|raw| PathBuf::from(shellexpand::tilde(raw).as_ref())))
    }

    fn sibling(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(suffix);
        path.with_file_name(name)
    }

    fn write_marker(&self, suffix: &str, body: &Value) {
        let Some(path) = &self.token_file else {
            return;
        };
        let marker = Self::sibling(path, suffix);
        let data = serde_json::to_vec(body).unwrap_or_default();
        if let Err(e) = std::fs::write(&marker, data) {
            tracing::warn!(path = %marker.display(), "failed to signal token producer: {e}");
        }
    }
}

impl TokenProducer for FileTokenProducer {
    fn current_token(&self) -> Option<TokenInfo> {
        let path = self.token_file.as_ref()?;
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(path = %path.display(), "token file unavailable: {e}");
                return None;
            }
        };
        match serde_json::from_str::<TokenInfo>(&raw) {
            Ok(info) if !info.token.is_empty() => {
                tracing::debug!(len = info.token.len(), updated_at = info.updated_at, "token from producer file");
                Some(info)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "token file unreadable: {e}");
                None
            }
        }
    }

    fn request_refresh(&self) {
        self.write_marker(
            ".refresh",
            &serde_json::json!({"requested_at": chrono::Utc::now().timestamp_millis()}),
        );
    }

    fn notify_registered(&self, token: &TokenInfo) {
        self.write_marker(
            ".registered",
            &serde_json::to_value(token).unwrap_or(Value::Null),
        );
    }
}

/// Token the producer package left in its application restrictions.
pub fn read_restrictions(facade: &dyn PolicyEnforcementFacade, package: &str) -> Option<TokenInfo> {
    let restrictions = match facade.application_restrictions(package) {
        Ok(restrictions) => restrictions,
        Err(e) => {
            tracing::warn!(package, "reading producer restrictions failed: {e}");
            return None;
        }
    };
    let token = restrictions
        .get(RESTRICTION_TOKEN_KEY)
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())?;
    let updated_at = restrictions
        .get(RESTRICTION_UPDATED_AT_KEY)
        .and_then(Value::as_i64)
        .unwrap_or(0);
    Some(TokenInfo::new(token, updated_at))
}

/// Write `token` into the producer's application restrictions, keeping any
/// other keys already present. A missing timestamp becomes "now".
pub fn write_restrictions(facade: &dyn PolicyEnforcementFacade, package: &str, token: &TokenInfo) {
    let mut restrictions: Map<String, Value> =
        facade.application_restrictions(package).unwrap_or_default();
    let updated_at = if token.updated_at > 0 {
        token.updated_at
    } else {
        chrono::Utc::now().timestamp_millis()
    };
    restrictions.insert(RESTRICTION_TOKEN_KEY.into(), token.token.clone().into());
    restrictions.insert(RESTRICTION_UPDATED_AT_KEY.into(), updated_at.into());
    match facade.set_application_restrictions(package, restrictions) {
        Ok(()) => tracing::debug!(package, updated_at, "token written to producer restrictions"),
        Err(e) => tracing::warn!(package, "writing producer restrictions failed: {e}"),
    }
}
