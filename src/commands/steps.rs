use super::Outcome;
use serde_json::{Map, Value};
use std::fmt::Display;

/// Collects per-field results for handlers that apply several independent
/// settings. Any failed step turns the outcome into `partial_failure`;
/// skipped steps do not.
#[derive(Debug, Default)]
pub struct StepLog {
    meta: Map<String, Value>,
    all_ok: bool,
}

impl StepLog {
    pub fn new() -> Self {
        Self {
            meta: Map::new(),
            all_ok: true,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.meta.insert(key.to_string(), value.into());
    }

    /// Record `<field>_skipped = reason`.
    pub fn skipped(&mut self, field: &str, reason: &str) {
        self.set(&format!("{field}_skipped"), reason);
    }

    /// Record `error_key = message` and mark the run as partially failed.
    pub fn failed(&mut self, error_key: &str, message: impl Display) {
        self.all_ok = false;
        self.set(error_key, message.to_string());
    }

    /// Unwrap a step result, recording the error under `error_key`.
    pub fn check<T, E: Display>(&mut self, error_key: &str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.failed(error_key, e);
                None
            }
        }
    }

    pub fn all_ok(&self) -> bool {
        self.all_ok
    }

    pub fn finish(self) -> Outcome {
        Outcome::aggregate(self.all_ok, self.meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_steps_do_not_fail() {
        let mut log = StepLog::new();
        log.set("message", "hello");
        log.skipped("password_complexity", "requires_api_30");
        let outcome = log.finish();
        assert!(outcome.success);
        assert_eq!(
            outcome.meta["password_complexity_skipped"],
            "requires_api_30"
        );
    }

    #[test]
    fn failed_check_marks_partial_failure() {
        let mut log = StepLog::new();
        let value: Option<u32> = log.check("keyguard_error", Err::<u32, _>("denied"));
        assert!(value.is_none());
        assert!(!log.all_ok());
        let outcome = log.finish();
        assert_eq!(outcome.error.as_deref(), Some("partial_failure"));
        assert_eq!(outcome.meta["keyguard_error"], "denied");
    }
}
