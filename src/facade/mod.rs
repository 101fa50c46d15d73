//! Policy enforcement facade.
//!
//! A single trait over the platform's device-policy, package and restriction
//! services. Capabilities that only exist from a given platform level are
//! gated by the caller via [`PolicyEnforcementFacade::supports`]; an
//! implementation asked for an unavailable capability returns
//! [`FacadeError::Unsupported`].

pub mod simulated;

use crate::error::FacadeError;
use crate::gateway::PackageRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

pub use simulated::SimulatedDevice;

/// Platform levels at which gated capabilities appear.
pub mod level {
    pub const N: u32 = 24;
    pub const O: u32 = 26;
    pub const R: u32 = 30;
    pub const U: u32 = 34;
}

/// Which user a restriction applies to. `Parent` is the personal side of an
/// organization-owned device with a managed profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Own,
    Parent,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeyguardFeature {
    DisableSecureCamera,
    DisableSecureNotifications,
    DisableUnredactedNotifications,
    DisableTrustAgents,
    DisableFaceUnlock,
    DisableFingerprint,
    DisableIrisUnlock,
    DisableShortcuts,
    DisableWidgets,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PasswordQuality {
    #[default]
    Unspecified,
    Something,
    Numeric,
    NumericComplex,
    Alphabetic,
    Alphanumeric,
    Complex,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PasswordComplexity {
    #[default]
    None,
    Low,
    Medium,
    High,
}

/// Minimum-character requirements, named by their policy field.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum PasswordMinimum {
    #[strum(serialize = "min_length")]
    Length,
    #[strum(serialize = "min_letters")]
    Letters,
    #[strum(serialize = "min_digits")]
    Digits,
    #[strum(serialize = "min_lowercase")]
    Lowercase,
    #[strum(serialize = "min_uppercase")]
    Uppercase,
    #[strum(serialize = "min_symbols")]
    Symbols,
    #[strum(serialize = "min_nonletter")]
    NonLetter,
}

/// Factory-reset options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WipeFlags {
    pub external_storage: bool,
    pub reset_protection_data: bool,
}

impl WipeFlags {
    pub const EXTERNAL_STORAGE: u32 = 0x0001;
    pub const RESET_PROTECTION_DATA: u32 = 0x0002;

    pub fn bits(self) -> u32 {
        let mut bits = 0;
        if self.external_storage {
            bits |= Self::EXTERNAL_STORAGE;
        }
        if self.reset_protection_data {
            bits |= Self::RESET_PROTECTION_DATA;
        }
        bits
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockScreenState {
    pub message: Option<String>,
    pub max_time_to_lock_ms: u64,
    /// `None` below platform level O.
    pub strong_auth_timeout_ms: Option<u64>,
    pub max_failed_passwords_for_wipe: i32,
    pub keyguard_disabled: BTreeSet<KeyguardFeature>,
    pub trust_agents: BTreeMap<String, Map<String, Value>>,
    /// `None` below platform level R.
    pub password_complexity: Option<PasswordComplexity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordPolicyState {
    pub quality: PasswordQuality,
    pub expiration_timeout_ms: u64,
    pub history_length: i32,
    pub minimums: BTreeMap<PasswordMinimum, i32>,
}

pub trait PolicyEnforcementFacade: Send + Sync {
    fn platform_level(&self) -> u32;

    fn supports(&self, level: u32) -> bool {
        self.platform_level() >= level
    }

    fn is_device_owner(&self) -> bool;

    /// Organization-owned device with a managed profile. Always false below
    /// platform level R.
    fn is_org_owned_managed_profile(&self) -> bool;

    // ── Packages ────────────────────────────────────────────────────────
    fn installed_packages(&self) -> Result<Vec<PackageRecord>, FacadeError>;

    fn uninstall_package(&self, package: &str) -> Result<(), FacadeError>;

    /// Returns the packages the platform refused to change.
    fn set_packages_suspended(
        &self,
        packages: &[String],
        suspended: bool,
    ) -> Result<Vec<String>, FacadeError>;

    /// Returns whether the platform accepted the change.
    fn set_application_hidden(&self, package: &str, hidden: bool) -> Result<bool, FacadeError>;

    fn set_uninstall_blocked(&self, package: &str, blocked: bool) -> Result<(), FacadeError>;

    /// Managed configuration of another package.
    fn application_restrictions(&self, package: &str) -> Result<Map<String, Value>, FacadeError>;

    fn set_application_restrictions(
        &self,
        package: &str,
        restrictions: Map<String, Value>,
    ) -> Result<(), FacadeError>;

    // ── User restrictions ──────────────────────────────────────────────
    /// Keys currently set for `scope`.
    fn user_restrictions(&self, scope: Scope) -> Result<BTreeSet<String>, FacadeError>;

    fn set_user_restriction(&self, scope: Scope, key: &str, enabled: bool)
    -> Result<(), FacadeError>;

    // ── Location ───────────────────────────────────────────────────────
    fn location_enabled(&self) -> bool;

    fn set_location_enabled(&self, enabled: bool) -> Result<(), FacadeError>;

    // ── Wipe ───────────────────────────────────────────────────────────
    fn wipe_device(&self, flags: WipeFlags) -> Result<(), FacadeError>;

    fn wipe_parent_profile(&self) -> Result<(), FacadeError>;

    fn wipe_data(&self, flags: WipeFlags) -> Result<(), FacadeError>;

    // ── Lock screen ────────────────────────────────────────────────────
    fn lock_screen_state(&self) -> Result<LockScreenState, FacadeError>;

    fn set_lock_screen_message(&self, message: &str) -> Result<(), FacadeError>;

    fn set_max_time_to_lock(&self, millis: u64) -> Result<(), FacadeError>;

    fn set_required_strong_auth_timeout(&self, millis: u64) -> Result<(), FacadeError>;

    fn set_max_failed_passwords_for_wipe(&self, count: i32) -> Result<(), FacadeError>;

    fn set_keyguard_disabled_features(
        &self,
        features: &BTreeSet<KeyguardFeature>,
    ) -> Result<(), FacadeError>;

    fn set_trust_agent_configuration(
        &self,
        component: &str,
        config: &Map<String, Value>,
    ) -> Result<(), FacadeError>;

    fn set_required_password_complexity(
        &self,
        complexity: PasswordComplexity,
    ) -> Result<(), FacadeError>;

    // ── Password ───────────────────────────────────────────────────────
    fn password_policy_state(&self) -> Result<PasswordPolicyState, FacadeError>;

    fn set_password_quality(&self, quality: PasswordQuality) -> Result<(), FacadeError>;

    fn set_password_expiration_timeout(&self, millis: u64) -> Result<(), FacadeError>;

    fn set_password_history_length(&self, length: i32) -> Result<(), FacadeError>;

    fn set_password_minimum(&self, which: PasswordMinimum, value: i32) -> Result<(), FacadeError>;

    fn lock_now(&self) -> Result<(), FacadeError>;

    /// Show the "set new password" prompt to the user.
    fn prompt_password_change(&self, message: Option<&str>) -> Result<(), FacadeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn wipe_flag_bits() {
        assert_eq!(WipeFlags::default().bits(), 0);
        let both = WipeFlags {
            external_storage: true,
            reset_protection_data: true,
        };
        assert_eq!(both.bits(), 3);
    }

    #[test]
    fn keyguard_names_are_snake_case() {
        assert_eq!(
            KeyguardFeature::DisableSecureCamera.as_ref(),
            "disable_secure_camera"
        );
        assert_eq!(KeyguardFeature::iter().count(), 9);
        assert!(KeyguardFeature::from_str("disable_bogus").is_err());
    }

    #[test]
    fn quality_and_complexity_parse_case_insensitively() {
        assert_eq!(
            PasswordQuality::from_str("NUMERIC_COMPLEX").unwrap(),
            PasswordQuality::NumericComplex
        );
        assert_eq!(
            PasswordComplexity::from_str("High").unwrap(),
            PasswordComplexity::High
        );
        assert!(PasswordComplexity::from_str("extreme").is_err());
    }

    #[test]
    fn minimum_field_names() {
        let names: Vec<String> = PasswordMinimum::iter().map(|m| m.to_string()).collect();
        assert_eq!(names.first().map(String::as_str), Some("min_length"));
        assert_eq!(names.last().map(String::as_str), Some("min_nonletter"));
    }
}
