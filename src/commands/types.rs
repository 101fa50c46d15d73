use serde_json::{Map, Value};

/// Command types understood by the dispatcher. Parsing is case-insensitive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CommandKind {
    InstallApkPackage,
    UninstallApp,
    SuspendApp,
    HideApp,
    BlockUninstall,
    GetUserRestrictions,
    SetUserRestrictions,
    SetLocation,
    Wipe,
    SetLockScreen,
    SetPasswordPolicy,
    SetPasswordComplexity,
    RequestPasswordChange,
}

impl CommandKind {
    /// Commands whose effect must not be repeated when the backend
    /// redelivers them.
    pub fn is_journaled(self) -> bool {
        matches!(self, Self::Wipe | Self::RequestPasswordChange)
    }
}

/// Result of one handler run, merged into the command's ack envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub error: Option<String>,
    pub meta: Map<String, Value>,
}

impl Outcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            meta: Map::new(),
        }
    }

    /// `partial_failure` unless `all_ok`.
    pub fn aggregate(all_ok: bool, meta: Map<String, Value>) -> Self {
        Self {
            success: all_ok,
            error: (!all_ok).then(|| "partial_failure".to_string()),
            meta,
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta.extend(meta);
        self
    }
}
