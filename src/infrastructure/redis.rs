use crate::domain::ports::{CasReply, KeyValueStore, ScriptReply};
use crate::error::{Result, WithdrawError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;

// Every decrementing script checks the history key before writing, so a
// wrong-typed history list fails the call with the balance untouched.

// Reply codes: 0 stale, 1 applied, 2 history key has the wrong type.
const CAS_DECREMENT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current ~= ARGV[1] then
  return {0, 0}
end
local kind = redis.call('TYPE', KEYS[2])['ok']
if kind ~= 'none' and kind ~= 'list' then
  return {2, 0}
end
local value = redis.call('DECRBY', KEYS[1], ARGV[2])
redis.call('LPUSH', KEYS[2], ARGV[2])
redis.call('LTRIM', KEYS[2], 0, tonumber(ARGV[3]) - 1)
return {1, value}
"#;

// Reply codes: 0 applied, 1 missing, 2 insufficient, 3 corrupt balance,
// 4 history key has the wrong type.
const WITHDRAW: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return {1, 0}
end
if raw ~= '0' and not string.match(raw, '^-?[1-9]%d*$') then
  return {3, 0}
end
local amount = tonumber(ARGV[1])
if tonumber(raw) < amount then
  return {2, 0}
end
local kind = redis.call('TYPE', KEYS[2])['ok']
if kind ~= 'none' and kind ~= 'list' then
  return {4, 0}
end
local value = redis.call('DECRBY', KEYS[1], amount)
redis.call('LPUSH', KEYS[2], amount)
redis.call('LTRIM', KEYS[2], 0, tonumber(ARGV[2]) - 1)
return {0, value}
"#;

// Same codes as WITHDRAW; a missing balance decrements from zero.
const DECREMENT_AND_LOG: &str = r#"
local kind = redis.call('TYPE', KEYS[2])['ok']
if kind ~= 'none' and kind ~= 'list' then
  return {4, 0}
end
local raw = redis.call('GET', KEYS[1])
if raw and raw ~= '0' and not string.match(raw, '^-?[1-9]%d*$') then
  return {3, 0}
end
local value = redis.call('DECRBY', KEYS[1], ARGV[1])
redis.call('LPUSH', KEYS[2], ARGV[1])
redis.call('LTRIM', KEYS[2], 0, tonumber(ARGV[2]) - 1)
return {0, value}
"#;

const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// A store backed by a Redis server.
///
/// Conditional writes and the withdrawal sequence run as Lua scripts, which
/// Redis executes without interleaving any other client's commands.
///
/// `Clone` shares the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    cas_decrement: Script,
    withdraw: Script,
    decrement_and_log: Script,
    compare_and_delete: Script,
}

impl RedisStore {
    /// Connects to the server at `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            cas_decrement: Script::new(CAS_DECREMENT),
            withdraw: Script::new(WITHDRAW),
            decrement_and_log: Script::new(DECREMENT_AND_LOG),
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_swap_decrement(
        &self,
        balance_key: &str,
        history_key: &str,
        expected: i64,
        amount: i64,
        history_limit: usize,
    ) -> Result<CasReply> {
        let mut conn = self.conn.clone();
        let (applied, value): (i64, i64) = self
            .cas_decrement
            .key(balance_key)
            .key(history_key)
            .arg(expected)
            .arg(amount)
            .arg(history_limit)
            .invoke_async(&mut conn)
            .await?;
        match applied {
            0 => Ok(CasReply {
                applied: false,
                new_value: None,
            }),
            1 => Ok(CasReply {
                applied: true,
                new_value: Some(value),
            }),
            _ => Err(WithdrawError::wrong_type(history_key)),
        }
    }

    async fn decrement_and_log(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<i64> {
        let mut conn = self.conn.clone();
        let (code, value): (i64, i64) = self
            .decrement_and_log
            .key(balance_key)
            .key(history_key)
            .arg(amount)
            .arg(history_limit)
            .invoke_async(&mut conn)
            .await?;
        match code {
            0 => Ok(value),
            3 => {
                let raw = self.get(balance_key).await?.unwrap_or_default();
                Err(WithdrawError::CorruptValue {
                    key: balance_key.to_string(),
                    value: raw,
                })
            }
            _ => Err(WithdrawError::wrong_type(history_key)),
        }
    }

    async fn atomic_withdraw(
        &self,
        balance_key: &str,
        history_key: &str,
        amount: i64,
        history_limit: usize,
    ) -> Result<ScriptReply> {
        let mut conn = self.conn.clone();
        let (code, value): (i64, i64) = self
            .withdraw
            .key(balance_key)
            .key(history_key)
            .arg(amount)
            .arg(history_limit)
            .invoke_async(&mut conn)
            .await?;
        match code {
            0 => Ok(ScriptReply::Applied(value)),
            1 => Ok(ScriptReply::Missing),
            2 => Ok(ScriptReply::Insufficient),
            3 => {
                let raw = self.get(balance_key).await?.unwrap_or_default();
                Ok(ScriptReply::Corrupt(raw))
            }
            _ => Err(WithdrawError::wrong_type(history_key)),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn history(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(limit as i64 - 1)
            .query_async(&mut conn)
            .await?;
        Ok(entries)
    }
}
