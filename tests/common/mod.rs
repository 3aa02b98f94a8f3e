#![allow(dead_code)]

use async_trait::async_trait;
use kv_withdraw::application::engine::WithdrawalEngine;
use kv_withdraw::config::{EngineConfig, LockSettings};
use kv_withdraw::domain::ports::{CasReply, KeyValueStore, ScriptReply, SharedStore};
use kv_withdraw::error::Result;
use kv_withdraw::infrastructure::in_memory::InMemoryStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lease timings generous enough that nobody waits out the budget in tests.
pub fn patient_lock() -> LockSettings {
    LockSettings {
        ttl: Duration::from_secs(5),
        wait_budget: Duration::from_secs(10),
        retry_delay: Duration::from_millis(1),
    }
}

pub fn config(max_retries: u32) -> EngineConfig {
    EngineConfig {
        key_prefix: "test".to_string(),
        max_retries,
        lock: patient_lock(),
        ..EngineConfig::default()
    }
}

pub fn engine_over(store: SharedStore, max_retries: u32) -> WithdrawalEngine {
    WithdrawalEngine::new(store, config(max_retries)).expect("valid config")
}

pub fn engine() -> WithdrawalEngine {
    engine_over(Arc::new(InMemoryStore::new()), 100)
}

/// A store where another writer always sneaks in between the read and the
/// conditional write: every compare-and-swap first bumps the balance by one,
/// so the caller's expected value is always stale.
pub struct ContendedStore {
    inner: InMemoryStore,
}

impl ContendedStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
        }
    }
}

#[async_trait]
impl KeyValueStore for ContendedStore {
    fn backend(&self) -> &'static str {
        "contended"
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_swap_decrement(
        &self,
        balance_key: &str,
        history_key: &str,
        expected: i64,
        amount: i64,
        history_limit: usize,
    ) -> Result<CasReply> {
        if let Some(current) = self.inner.get(balance_key).await? {
            let bumped = current.parse::<i64>().unwrap_or(0) + 1;
            self.inner.set(balance_key, &bumped.to_string()).await?;
        }
        self.inner
            .compare_and_swap_decrement(balance_key, history_key, expected, amount, history_limit)
            .await
    }

    async fn decrement_and_log(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<i64> {
        self.inner
            .decrement_and_log(balance_key, history_key, amount, history_limit)
            .await
    }

    async fn atomic_withdraw(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<ScriptReply> {
        self.inner
            .atomic_withdraw(balance_key, history_key, amount, history_limit)
            .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn history(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        self.inner.history(key, limit).await
    }
}

/// How long one `decrement_and_log` call stalls around the real write.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stall {
    pub before: Duration,
    pub after: Duration,
}

/// A store whose successive `decrement_and_log` calls stall as scripted,
/// so a lease holder can be made to outlive its TTL at a chosen point in
/// the critical section. Calls beyond the script do not stall.
pub struct StallingStore {
    inner: InMemoryStore,
    stalls: Mutex<VecDeque<Stall>>,
}

impl StallingStore {
    pub fn new(stalls: impl IntoIterator<Item = Stall>) -> Self {
        Self {
            inner: InMemoryStore::new(),
            stalls: Mutex::new(stalls.into_iter().collect()),
        }
    }

    fn next_stall(&self) -> Stall {
        self.stalls.lock().unwrap().pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl KeyValueStore for StallingStore {
    fn backend(&self) -> &'static str {
        "stalling"
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_swap_decrement(
        &self,
        balance_key: &str,
        history_key: &str,
        expected: i64,
        amount: i64,
        history_limit: usize,
    ) -> Result<CasReply> {
        self.inner
            .compare_and_swap_decrement(balance_key, history_key, expected, amount, history_limit)
            .await
    }

    async fn decrement_and_log(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<i64> {
        let stall = self.next_stall();
        tokio::time::sleep(stall.before).await;
        let value = self
            .inner
            .decrement_and_log(balance_key, history_key, amount, history_limit)
            .await?;
        tokio::time::sleep(stall.after).await;
        Ok(value)
    }

    async fn atomic_withdraw(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<ScriptReply> {
        self.inner
            .atomic_withdraw(balance_key, history_key, amount, history_limit)
            .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn history(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        self.inner.history(key, limit).await
    }
}
