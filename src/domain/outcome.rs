use serde::{Deserialize, Serialize};
use std::fmt;

/// The shared status vocabulary every strategy reports in.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawStatus {
    Ok,
    Insufficient,
    Missing,
    LockBusy,
    Conflict,
}

impl WithdrawStatus {
    pub const ALL: [WithdrawStatus; 5] = [
        WithdrawStatus::Ok,
        WithdrawStatus::Insufficient,
        WithdrawStatus::Missing,
        WithdrawStatus::LockBusy,
        WithdrawStatus::Conflict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawStatus::Ok => "ok",
            WithdrawStatus::Insufficient => "insufficient",
            WithdrawStatus::Missing => "missing",
            WithdrawStatus::LockBusy => "lock_busy",
            WithdrawStatus::Conflict => "conflict",
        }
    }
}

impl fmt::Display for WithdrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single withdrawal attempt.
///
/// Every domain and contention outcome is represented here; only
/// infrastructure failures are reported as `Err`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawOutcome {
    pub status: WithdrawStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub new_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl WithdrawOutcome {
    pub fn ok(new_balance: i64) -> Self {
        Self {
            status: WithdrawStatus::Ok,
            attempt: None,
            new_balance: Some(new_balance),
            error: None,
        }
    }

    pub fn insufficient() -> Self {
        Self::rejected(WithdrawStatus::Insufficient, "insufficient funds")
    }

    pub fn missing() -> Self {
        Self::rejected(WithdrawStatus::Missing, "balance not found")
    }

    pub fn lock_busy() -> Self {
        Self::rejected(WithdrawStatus::LockBusy, "lock not acquired within wait budget")
    }

    pub fn conflict() -> Self {
        Self::rejected(WithdrawStatus::Conflict, "retries exhausted")
    }

    fn rejected(status: WithdrawStatus, reason: &str) -> Self {
        Self {
            status,
            attempt: None,
            new_balance: None,
            error: Some(reason.to_string()),
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == WithdrawStatus::Ok
    }
}
