use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Reply of a conditional decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasReply {
    pub applied: bool,
    /// Balance after the decrement; `None` when not applied.
    pub new_value: Option<i64>,
}

/// Reply of the server-side withdrawal script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    Applied(i64),
    Missing,
    Insufficient,
    /// The stored balance is not a canonical integer; carries the raw value.
    Corrupt(String),
}

/// The operations the engine needs from a remote key-value store.
///
/// Each call is one round trip and is atomic on the store side. Anything
/// spanning several calls has no atomicity unless guarded by a lease.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short backend name used in reports.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Creates `key` with a TTL only if it does not exist.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Decrements `balance_key` by `amount` only if it still holds `expected`,
    /// pushing `amount` onto the history list in the same step.
    async fn compare_and_swap_decrement(
        &self,
        balance_key: &str,
        history_key: &str,
        expected: i64,
        amount: i64,
        history_limit: usize,
    ) -> Result<CasReply>;

    /// Unconditional decrement plus history push, applied as one unit.
    async fn decrement_and_log(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<i64>;

    /// Read, check, decrement and log in one indivisible server-side step.
    async fn atomic_withdraw(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<ScriptReply>;

    /// Deletes `key` only if it still holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Up to `limit` most recent history entries, newest first.
    async fn history(&self, key: &str, limit: usize) -> Result<Vec<String>>;
}

pub type KeyValueStoreBox = Box<dyn KeyValueStore>;
pub type SharedStore = Arc<dyn KeyValueStore>;
