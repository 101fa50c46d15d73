use super::{
    KeyguardFeature, LockScreenState, PasswordComplexity, PasswordMinimum, PasswordPolicyState,
    PasswordQuality, PolicyEnforcementFacade, Scope, WipeFlags, level,
};
use crate::config::DeviceConfig;
use crate::error::FacadeError;
use crate::gateway::PackageRecord;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// Package name the agent reports for itself in inventory.
pub const AGENT_PACKAGE: &str = "dev.fleetsync.agent";

#[derive(Debug, Default)]
struct DeviceState {
    packages: BTreeMap<String, PackageRecord>,
    refuse_suspend: BTreeSet<String>,
    blocked_uninstall: BTreeSet<String>,
    app_restrictions: BTreeMap<String, Map<String, Value>>,
    restrictions: BTreeMap<Scope, BTreeSet<String>>,
    location_enabled: bool,
    lock: LockScreenState,
    password: PasswordPolicyState,
    wiped: Option<String>,
    lock_count: u32,
    prompts: Vec<Option<String>>,
    failures: BTreeMap<&'static str, String>,
    #[cfg(test)]
    panics: BTreeSet<&'static str>,
    calls: Vec<String>,
}

/// In-memory device used by the CLI and tests.
///
/// Mutating calls are recorded in order (see [`SimulatedDevice::calls`]) and
/// any operation can be made to fail with [`SimulatedDevice::fail`].
#[derive(Debug)]
pub struct SimulatedDevice {
    platform_level: u32,
    device_owner: bool,
    org_owned_profile: bool,
    state: Mutex<DeviceState>,
}

impl SimulatedDevice {
    pub fn new(platform_level: u32) -> Self {
        Self {
            platform_level,
            device_owner: true,
            org_owned_profile: false,
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        let mut device = Self::new(config.platform_level);
        device.device_owner = config.device_owner;
        device.org_owned_profile = config.organization_owned_profile;
        device.add_package(PackageRecord {
            package: AGENT_PACKAGE.into(),
            version_code: 1,
            enabled_state: 0,
            last_update: 0,
            first_install: 0,
            installer: None,
            hidden: false,
            suspended: Some(false),
            system_app: false,
        });
        device
    }

    #[must_use]
    pub fn with_org_owned_profile(mut self, org_owned: bool) -> Self {
        self.org_owned_profile = org_owned;
        self
    }

    #[must_use]
    pub fn with_device_owner(mut self, device_owner: bool) -> Self {
        self.device_owner = device_owner;
        self
    }

    pub fn add_package(&self, record: PackageRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.packages.insert(record.package.clone(), record);
        }
    }

    /// Installed package with default metadata.
    pub fn add_simple_package(&self, package: &str) {
        self.add_package(PackageRecord {
            package: package.into(),
            version_code: 1,
            enabled_state: 0,
            last_update: 0,
            first_install: 0,
            installer: None,
            hidden: false,
            suspended: (self.platform_level >= level::N).then_some(false),
            system_app: false,
        });
    }

    /// Make the platform refuse to suspend `package`.
    pub fn refuse_suspend(&self, package: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.refuse_suspend.insert(package.to_string());
        }
    }

    /// Make the named operation fail with `message` from now on.
    pub fn fail(&self, operation: &'static str, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert(operation, message.to_string());
        }
    }

    /// Make the named operation panic, as a crashing platform service would.
    #[cfg(test)]
    pub(crate) fn panic_on(&self, operation: &'static str) {
        if let Ok(mut state) = self.state.lock() {
            state.panics.insert(operation);
        }
    }

    /// Mutating operations performed so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    /// Wipe strategy invoked, if any.
    pub fn wiped(&self) -> Option<String> {
        self.state.lock().ok().and_then(|state| state.wiped.clone())
    }

    pub fn lock_count(&self) -> u32 {
        self.state.lock().map(|state| state.lock_count).unwrap_or(0)
    }

    pub fn prompts(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .map(|state| state.prompts.clone())
            .unwrap_or_default()
    }

    fn state(&self) -> Result<MutexGuard<'_, DeviceState>, FacadeError> {
        self.state
            .lock()
            .map_err(|_| FacadeError::Failed("device state poisoned".into()))
    }

    /// Lock state for a mutating operation, honouring injected failures and
    /// recording the call.
    fn mutate(&self, operation: &'static str) -> Result<MutexGuard<'_, DeviceState>, FacadeError> {
        let mut state = self.state()?;
        #[cfg(test)]
        if state.panics.contains(operation) {
            drop(state);
            panic!("{operation} crashed");
        }
        if let Some(message) = state.failures.get(operation) {
            return Err(FacadeError::Failed(message.clone()));
        }
        state.calls.push(operation.to_string());
        Ok(state)
    }

    fn require(&self, capability: &'static str, required: u32) -> Result<(), FacadeError> {
        if self.platform_level >= required {
            Ok(())
        } else {
            Err(FacadeError::Unsupported {
                capability,
                required,
                actual: self.platform_level,
            })
        }
    }
}

impl PolicyEnforcementFacade for SimulatedDevice {
    fn platform_level(&self) -> u32 {
        self.platform_level
    }

    fn is_device_owner(&self) -> bool {
        self.device_owner
    }

    fn is_org_owned_managed_profile(&self) -> bool {
        self.platform_level >= level::R && self.org_owned_profile
    }

    fn installed_packages(&self) -> Result<Vec<PackageRecord>, FacadeError> {
        Ok(self.state()?.packages.values().cloned().collect())
    }

    fn uninstall_package(&self, package: &str) -> Result<(), FacadeError> {
        let mut state = self.mutate("uninstall_package")?;
        if state.blocked_uninstall.contains(package) {
            return Err(FacadeError::Denied(format!("uninstall blocked for {package}")));
        }
        state.packages.remove(package);
        Ok(())
    }

    fn set_packages_suspended(
        &self,
        packages: &[String],
        suspended: bool,
    ) -> Result<Vec<String>, FacadeError> {
        let mut state = self.mutate("set_packages_suspended")?;
        let mut refused = Vec::new();
        for package in packages {
            if state.refuse_suspend.contains(package) {
                refused.push(package.clone());
                continue;
            }
            match state.packages.get_mut(package) {
                Some(record) => record.suspended = Some(suspended),
                None => refused.push(package.clone()),
            }
        }
        Ok(refused)
    }

    fn set_application_hidden(&self, package: &str, hidden: bool) -> Result<bool, FacadeError> {
        let mut state = self.mutate("set_application_hidden")?;
        Ok(match state.packages.get_mut(package) {
            Some(record) => {
                record.hidden = hidden;
                true
            }
            None => false,
        })
    }

    fn set_uninstall_blocked(&self, package: &str, blocked: bool) -> Result<(), FacadeError> {
        let mut state = self.mutate("set_uninstall_blocked")?;
        if blocked {
            state.blocked_uninstall.insert(package.to_string());
        } else {
            state.blocked_uninstall.remove(package);
        }
        Ok(())
    }

    fn application_restrictions(&self, package: &str) -> Result<Map<String, Value>, FacadeError> {
        Ok(self
            .state()?
            .app_restrictions
            .get(package)
            .cloned()
            .unwrap_or_default())
    }

    fn set_application_restrictions(
        &self,
        package: &str,
        restrictions: Map<String, Value>,
    ) -> Result<(), FacadeError> {
        let mut state = self.mutate("set_application_restrictions")?;
        state
            .app_restrictions
            .insert(package.to_string(), restrictions);
        Ok(())
    }

    fn user_restrictions(&self, scope: Scope) -> Result<BTreeSet<String>, FacadeError> {
        Ok(self
            .state()?
            .restrictions
            .get(&scope)
            .cloned()
            .unwrap_or_default())
    }

    fn set_user_restriction(
        &self,
        scope: Scope,
        key: &str,
        enabled: bool,
    ) -> Result<(), FacadeError> {
        if scope == Scope::Parent && !self.is_org_owned_managed_profile() {
            return Err(FacadeError::Denied("no parent profile".into()));
        }
        let mut state = self.mutate("set_user_restriction")?;
        let keys = state.restrictions.entry(scope).or_default();
        if enabled {
            keys.insert(key.to_string());
        } else {
            keys.remove(key);
        }
        Ok(())
    }

    fn location_enabled(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.location_enabled)
            .unwrap_or(false)
    }

    fn set_location_enabled(&self, enabled: bool) -> Result<(), FacadeError> {
        self.require("set_location_enabled", level::R)?;
        self.mutate("set_location_enabled")?.location_enabled = enabled;
        Ok(())
    }

    fn wipe_device(&self, flags: WipeFlags) -> Result<(), FacadeError> {
        self.require("wipe_device", level::U)?;
        self.mutate("wipe_device")?.wiped = Some(format!("wipe_device flags={}", flags.bits()));
        Ok(())
    }

    fn wipe_parent_profile(&self) -> Result<(), FacadeError> {
        if !self.is_org_owned_managed_profile() {
            return Err(FacadeError::Denied("no parent profile".into()));
        }
        self.mutate("wipe_parent_profile")?.wiped = Some("wipe_parent_profile".into());
        Ok(())
    }

    fn wipe_data(&self, flags: WipeFlags) -> Result<(), FacadeError> {
        self.mutate("wipe_data")?.wiped = Some(format!("wipe_data flags={}", flags.bits()));
        Ok(())
    }

    fn lock_screen_state(&self) -> Result<LockScreenState, FacadeError> {
        let mut snapshot = self.state()?.lock.clone();
        if self.platform_level < level::O {
            snapshot.strong_auth_timeout_ms = None;
        } else if snapshot.strong_auth_timeout_ms.is_none() {
            snapshot.strong_auth_timeout_ms = Some(0);
        }
        snapshot.password_complexity = (self.platform_level >= level::R)
            .then(|| snapshot.password_complexity.unwrap_or_default());
        Ok(snapshot)
    }

    fn set_lock_screen_message(&self, message: &str) -> Result<(), FacadeError> {
        self.mutate("set_lock_screen_message")?.lock.message =
            (!message.is_empty()).then(|| message.to_string());
        Ok(())
    }

    fn set_max_time_to_lock(&self, millis: u64) -> Result<(), FacadeError> {
        self.mutate("set_max_time_to_lock")?.lock.max_time_to_lock_ms = millis;
        Ok(())
    }

    fn set_required_strong_auth_timeout(&self, millis: u64) -> Result<(), FacadeError> {
        self.require("set_required_strong_auth_timeout", level::O)?;
        self.mutate("set_required_strong_auth_timeout")?
            .lock
            .strong_auth_timeout_ms = Some(millis);
        Ok(())
    }

    fn set_max_failed_passwords_for_wipe(&self, count: i32) -> Result<(), FacadeError> {
        self.mutate("set_max_failed_passwords_for_wipe")?
            .lock
            .max_failed_passwords_for_wipe = count;
        Ok(())
    }

    fn set_keyguard_disabled_features(
        &self,
        features: &BTreeSet<KeyguardFeature>,
    ) -> Result<(), FacadeError> {
        self.mutate("set_keyguard_disabled_features")?
            .lock
            .keyguard_disabled
            .clone_from(features);
        Ok(())
    }

    fn set_trust_agent_configuration(
        &self,
        component: &str,
        config: &Map<String, Value>,
    ) -> Result<(), FacadeError> {
        self.mutate("set_trust_agent_configuration")?
            .lock
            .trust_agents
            .insert(component.to_string(), config.clone());
        Ok(())
    }

    fn set_required_password_complexity(
        &self,
        complexity: PasswordComplexity,
    ) -> Result<(), FacadeError> {
        self.require("set_required_password_complexity", level::R)?;
        self.mutate("set_required_password_complexity")?
            .lock
            .password_complexity = Some(complexity);
        Ok(())
    }

    fn password_policy_state(&self) -> Result<PasswordPolicyState, FacadeError> {
        Ok(self.state()?.password.clone())
    }

    fn set_password_quality(&self, quality: PasswordQuality) -> Result<(), FacadeError> {
        self.mutate("set_password_quality")?.password.quality = quality;
        Ok(())
    }

    fn set_password_expiration_timeout(&self, millis: u64) -> Result<(), FacadeError> {
        self.mutate("set_password_expiration_timeout")?
            .password
            .expiration_timeout_ms = millis;
        Ok(())
    }

    fn set_password_history_length(&self, length: i32) -> Result<(), FacadeError> {
        self.mutate("set_password_history_length")?
            .password
            .history_length = length;
        Ok(())
    }

    fn set_password_minimum(&self, which: PasswordMinimum, value: i32) -> Result<(), FacadeError> {
        self.mutate("set_password_minimum")?
            .password
            .minimums
            .insert(which, value);
        Ok(())
    }

    fn lock_now(&self) -> Result<(), FacadeError> {
        self.mutate("lock_now")?.lock_count += 1;
        Ok(())
    }

    fn prompt_password_change(&self, message: Option<&str>) -> Result<(), FacadeError> {
        self.mutate("prompt_password_change")?
            .prompts
            .push(message.map(str::to_string));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_requires_level_r() {
        let device = SimulatedDevice::new(29);
        let err = device.set_location_enabled(true).unwrap_err();
        assert!(matches!(
            err,
            FacadeError::Unsupported {
                required: 30,
                actual: 29,
                ..
            }
        ));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn org_owned_profile_is_ignored_below_level_r() {
        let device = SimulatedDevice::new(28).with_org_owned_profile(true);
        assert!(!device.is_org_owned_managed_profile());
        let device = SimulatedDevice::new(30).with_org_owned_profile(true);
        assert!(device.is_org_owned_managed_profile());
    }

    #[test]
    fn suspend_reports_refused_and_unknown_packages() {
        let device = SimulatedDevice::new(34);
        device.add_simple_package("com.a");
        device.add_simple_package("com.b");
        device.refuse_suspend("com.b");

        let refused = device
            .set_packages_suspended(&["com.a".into(), "com.b".into(), "com.c".into()], true)
            .unwrap();
        assert_eq!(refused, vec!["com.b".to_string(), "com.c".to_string()]);
    }

    #[test]
    fn injected_failure_is_not_recorded() {
        let device = SimulatedDevice::new(34);
        device.fail("lock_now", "keyguard busy");
        let err = device.lock_now().unwrap_err();
        assert_eq!(err.to_string(), "keyguard busy");
        assert_eq!(device.lock_count(), 0);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn lock_screen_state_hides_gated_fields() {
        let device = SimulatedDevice::new(24);
        let state = device.lock_screen_state().unwrap();
        assert!(state.strong_auth_timeout_ms.is_none());
        assert!(state.password_complexity.is_none());
    }

    #[test]
    fn from_config_seeds_agent_package() {
        let device = SimulatedDevice::from_config(&DeviceConfig::default());
        let packages = device.installed_packages().unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].package, AGENT_PACKAGE);
    }
}
