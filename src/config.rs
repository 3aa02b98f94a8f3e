use crate::domain::keys::KeySpace;
use crate::error::{Result, WithdrawError};
use std::time::Duration;

/// Entries kept in each user's withdrawal history.
pub const HISTORY_LIMIT: usize = 1000;

pub const DEFAULT_KEY_PREFIX: &str = "wallet";
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Lease timings used by the lock-guarded strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// Lease lifetime. Must exceed the critical-section duration.
    pub ttl: Duration,
    /// Total time spent polling for the lease before giving up.
    pub wait_budget: Duration,
    pub retry_delay: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(5000),
            wait_budget: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(10),
        }
    }
}

/// Everything the engine reads from its environment, captured once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub key_prefix: String,
    pub max_retries: u32,
    pub history_limit: usize,
    pub lock: LockSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            history_limit: HISTORY_LIMIT,
            lock: LockSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Checks the values that would make a strategy loop or never acquire.
    pub fn validate(self) -> Result<Self> {
        if self.key_prefix.is_empty() {
            return Err(WithdrawError::Config("key prefix must not be empty".into()));
        }
        if self.max_retries == 0 {
            return Err(WithdrawError::Config("max retries must be at least 1".into()));
        }
        if self.history_limit == 0 {
            return Err(WithdrawError::Config("history limit must be at least 1".into()));
        }
        if self.lock.ttl.is_zero() {
            return Err(WithdrawError::Config("lock ttl must be positive".into()));
        }
        if self.lock.retry_delay.is_zero() {
            return Err(WithdrawError::Config(
                "lock retry delay must be positive".into(),
            ));
        }
        Ok(self)
    }

    pub fn keys(&self) -> KeySpace {
        KeySpace::new(self.key_prefix.clone())
    }
}
