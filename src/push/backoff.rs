use crate::config::PushConfig;

/// Exponential backoff with a ceiling and a bounded attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &PushConfig) -> Self {
        Self {
            base_ms: config.base_retry_ms,
            max_ms: config.max_retry_ms,
            max_attempts: config.max_backoff_attempts,
        }
    }

    pub fn delay_ms(&self, attempts: u32) -> u64 {
        compute_backoff_ms(self.base_ms, self.max_ms, attempts)
    }

    /// Attempt counter after one more failure; stops growing at the cap.
    pub fn bump(&self, attempts: u32) -> u32 {
        if attempts < self.max_attempts {
            attempts + 1
        } else {
            attempts
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&PushConfig::default())
    }
}

/// `min(base * 2^(max(attempts, 1) - 1), max)`, saturating.
pub fn compute_backoff_ms(base_ms: u64, max_ms: u64, attempts: u32) -> u64 {
    let exponent = attempts.max(1) - 1;
    let factor = 1_u64.checked_shl(exponent).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(max_ms)
}
