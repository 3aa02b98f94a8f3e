//! The interchangeable withdrawal strategies.
//!
//! All of them perform "read balance, verify, decrement, log" and answer in
//! the same [`WithdrawOutcome`] vocabulary, so callers can swap them freely.

pub mod lock_guarded;
pub mod optimistic;
pub mod script;

use crate::domain::balance::Amount;
use crate::domain::outcome::WithdrawOutcome;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

pub use lock_guarded::LockGuardedStrategy;
pub use optimistic::OptimisticStrategy;
pub use script::ScriptStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    /// Read, check, compare-and-swap; retried with backoff.
    Optimistic,
    /// One server-side script.
    Script,
    /// Lease with token-verified release.
    Lock,
    /// Lease with unconditional release. Never selected by default.
    LockUnsafe,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Optimistic,
        StrategyKind::Script,
        StrategyKind::Lock,
        StrategyKind::LockUnsafe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Optimistic => "optimistic",
            StrategyKind::Script => "script",
            StrategyKind::Lock => "lock",
            StrategyKind::LockUnsafe => "lock-unsafe",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimistic" | "watch" => Ok(StrategyKind::Optimistic),
            "script" | "lua" => Ok(StrategyKind::Script),
            "lock" | "lock-safe" => Ok(StrategyKind::Lock),
            "lock-unsafe" => Ok(StrategyKind::LockUnsafe),
            other => Err(format!(
                "unknown strategy '{other}' (expected optimistic, script, lock or lock-unsafe)"
            )),
        }
    }
}

/// One way of performing a withdrawal against the shared store.
///
/// Implementations report every domain and contention outcome through
/// `Ok(WithdrawOutcome)`; `Err` is reserved for a broken store or corrupt
/// data.
#[async_trait]
pub trait WithdrawStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn withdraw(&self, user: &str, amount: Amount) -> Result<WithdrawOutcome>;
}
