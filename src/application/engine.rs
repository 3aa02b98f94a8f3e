use crate::application::strategies::{
    LockGuardedStrategy, OptimisticStrategy, ScriptStrategy, StrategyKind, WithdrawStrategy,
};
use crate::config::EngineConfig;
use crate::domain::balance::{Amount, Balance};
use crate::domain::keys::KeySpace;
use crate::domain::outcome::WithdrawOutcome;
use crate::domain::ports::SharedStore;
use crate::error::{Result, WithdrawError};
use tracing::info;

/// The main entry point for withdrawals.
///
/// `WithdrawalEngine` holds one of each strategy over the same store and
/// configuration. Cloning is cheap and every clone talks to the same store,
/// so concurrent callers each get their own handle.
#[derive(Clone)]
pub struct WithdrawalEngine {
    store: SharedStore,
    keys: KeySpace,
    config: EngineConfig,
    optimistic: OptimisticStrategy,
    script: ScriptStrategy,
    lock: LockGuardedStrategy,
    lock_unsafe: LockGuardedStrategy,
}

impl WithdrawalEngine {
    /// Creates a new `WithdrawalEngine`.
    ///
    /// # Arguments
    ///
    /// * `store` - The key-value store holding balances, histories and leases.
    /// * `config` - Key prefix, retry budget and lease timings; validated here.
    pub fn new(store: SharedStore, config: EngineConfig) -> Result<Self> {
        let config = config.validate()?;
        let keys = config.keys();
        Ok(Self {
            optimistic: OptimisticStrategy::new(
                store.clone(),
                keys.clone(),
                config.max_retries,
                config.history_limit,
            ),
            script: ScriptStrategy::new(store.clone(), keys.clone(), config.history_limit),
            lock: LockGuardedStrategy::new(
                store.clone(),
                keys.clone(),
                config.lock,
                config.history_limit,
            ),
            lock_unsafe: LockGuardedStrategy::with_unsafe_release(
                store.clone(),
                keys.clone(),
                config.lock,
                config.history_limit,
            ),
            store,
            keys,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn strategy(&self, kind: StrategyKind) -> &dyn WithdrawStrategy {
        match kind {
            StrategyKind::Optimistic => &self.optimistic,
            StrategyKind::Script => &self.script,
            StrategyKind::Lock => &self.lock,
            StrategyKind::LockUnsafe => &self.lock_unsafe,
        }
    }

    /// Withdraws `amount` from `user` using the given strategy.
    ///
    /// A non-positive amount is rejected with `InvalidAmount` before the
    /// store is touched.
    pub async fn withdraw(
        &self,
        kind: StrategyKind,
        user: &str,
        amount: i64,
    ) -> Result<WithdrawOutcome> {
        let amount = Amount::new(amount)?;
        let outcome = self.strategy(kind).withdraw(user, amount).await?;
        info!(
            strategy = %kind,
            user,
            amount = amount.value(),
            status = %outcome.status,
            attempt = outcome.attempt,
            new_balance = outcome.new_balance,
            "withdrawal finished"
        );
        Ok(outcome)
    }

    /// Sets `user`'s balance to exactly `balance`, whatever it held before.
    pub async fn init_balance(&self, user: &str, balance: i64) -> Result<()> {
        self.store
            .set(&self.keys.balance(user), &balance.to_string())
            .await
    }

    /// Initializes the balance and drops the user's withdrawal history.
    pub async fn reset(&self, user: &str, balance: i64) -> Result<()> {
        self.store.delete(&self.keys.history(user)).await?;
        self.init_balance(user, balance).await
    }

    pub async fn balance(&self, user: &str) -> Result<Option<Balance>> {
        let key = self.keys.balance(user);
        match self.store.get(&key).await? {
            Some(raw) => Balance::parse(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Most recent withdrawals first, at most `limit` of them.
    pub async fn history(&self, user: &str, limit: usize) -> Result<Vec<i64>> {
        let key = self.keys.history(user);
        self.store
            .history(&key, limit.min(self.config.history_limit))
            .await?
            .into_iter()
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|_| WithdrawError::CorruptValue {
                        key: key.clone(),
                        value: raw,
                    })
            })
            .collect()
    }

    /// Pings the store and returns the backend name.
    pub async fn health(&self) -> Result<&'static str> {
        self.store.ping().await?;
        Ok(self.store.backend())
    }
}
