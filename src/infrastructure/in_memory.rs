use crate::domain::balance::parse_canonical;
use crate::domain::ports::{CasReply, KeyValueStore, ScriptReply};
use crate::error::{Result, WithdrawError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn text(value: impl Into<String>) -> Self {
        Self {
            value: Value::Text(value.into()),
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    /// Looks up a key, evicting it first if its TTL has passed.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn text(&mut self, key: &str) -> Result<Option<String>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(WithdrawError::wrong_type(key)),
        }
    }

    fn integer(&mut self, key: &str) -> Result<Option<i64>> {
        match self.text(key)? {
            None => Ok(None),
            Some(raw) => match parse_canonical(&raw) {
                Some(n) => Ok(Some(n)),
                None => Err(WithdrawError::CorruptValue {
                    key: key.to_string(),
                    value: raw,
                }),
            },
        }
    }

    /// Fails unless `key` is absent or already a list. Called before the
    /// balance is touched so a bad history key never leaves a half-applied
    /// withdrawal behind.
    fn check_history(&mut self, key: &str) -> Result<()> {
        match self.live(key) {
            None
            | Some(Entry {
                value: Value::List(_),
                ..
            }) => Ok(()),
            Some(_) => Err(WithdrawError::wrong_type(key)),
        }
    }

    fn push_history(&mut self, key: &str, amount: i64, limit: usize) -> Result<()> {
        if self.live(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::List(VecDeque::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                list.push_front(amount.to_string());
                list.truncate(limit);
                Ok(())
            }
            _ => Err(WithdrawError::wrong_type(key)),
        }
    }
}

/// A process-local stand-in for the remote store.
///
/// Each operation holds one mutex for its whole duration, which gives the
/// same per-command atomicity a single-threaded remote server would. An
/// optional latency is slept before every operation to mimic a network round
/// trip, so interleavings between calls look like they do against a real
/// server.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    keyspace: Arc<Mutex<Keyspace>>,
    latency: Duration,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store with no simulated latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that sleeps `latency` before every operation.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "in-memory"
    }

    async fn ping(&self) -> Result<()> {
        self.round_trip().await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.round_trip().await;
        self.keyspace.lock().await.text(key)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.round_trip().await;
        let mut keyspace = self.keyspace.lock().await;
        keyspace.entries.insert(key.to_string(), Entry::text(value));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.round_trip().await;
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.live(key).is_some() {
            return Ok(false);
        }
        keyspace.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn compare_and_swap_decrement(
        &self,
        balance_key: &str,
        history_key: &str,
        expected: i64,
        amount: i64,
        history_limit: usize,
    ) -> Result<CasReply> {
        self.round_trip().await;
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.text(balance_key)? != Some(expected.to_string()) {
            return Ok(CasReply {
                applied: false,
                new_value: None,
            });
        }
        keyspace.check_history(history_key)?;
        let new_value = expected - amount;
        keyspace
            .entries
            .insert(balance_key.to_string(), Entry::text(new_value.to_string()));
        keyspace.push_history(history_key, amount, history_limit)?;
        Ok(CasReply {
            applied: true,
            new_value: Some(new_value),
        })
    }

    async fn decrement_and_log(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<i64> {
        self.round_trip().await;
        let mut keyspace = self.keyspace.lock().await;
        keyspace.check_history(history_key)?;
        let new_value = keyspace
            .integer(balance_key)?
            .unwrap_or(0)
            .checked_sub(amount)
            .ok_or_else(|| {
                WithdrawError::StoreUnavailable(format!("decrement of '{balance_key}' would overflow"))
            })?;
        keyspace
            .entries
            .insert(balance_key.to_string(), Entry::text(new_value.to_string()));
        keyspace.push_history(history_key, amount, history_limit)?;
        Ok(new_value)
    }

    async fn atomic_withdraw(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<ScriptReply> {
        self.round_trip().await;
        let mut keyspace = self.keyspace.lock().await;
        let Some(raw) = keyspace.text(balance_key)? else {
            return Ok(ScriptReply::Missing);
        };
        let Some(balance) = parse_canonical(&raw) else {
            return Ok(ScriptReply::Corrupt(raw));
        };
        if balance < amount {
            return Ok(ScriptReply::Insufficient);
        }
        keyspace.check_history(history_key)?;
        let new_value = balance - amount;
        keyspace
            .entries
            .insert(balance_key.to_string(), Entry::text(new_value.to_string()));
        keyspace.push_history(history_key, amount, history_limit)?;
        Ok(ScriptReply::Applied(new_value))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.round_trip().await;
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.text(key)?.as_deref() == Some(expected) {
            keyspace.entries.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.round_trip().await;
        self.keyspace.lock().await.entries.remove(key);
        Ok(())
    }

    async fn history(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        self.round_trip().await;
        let mut keyspace = self.keyspace.lock().await;
        match keyspace.live(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.iter().take(limit).cloned().collect()),
            Some(_) => Err(WithdrawError::wrong_type(key)),
        }
    }
}
