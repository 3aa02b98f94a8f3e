use super::{StrategyKind, WithdrawStrategy};
use crate::application::lease::{Acquisition, LeaseLock, ReleasePolicy};
use crate::config::LockSettings;
use crate::domain::balance::{Amount, Balance};
use crate::domain::keys::KeySpace;
use crate::domain::outcome::WithdrawOutcome;
use crate::domain::ports::SharedStore;
use crate::error::Result;
use async_trait::async_trait;
use tracing::warn;

pub const SAFE_NAMESPACE: &str = "withdraw";
pub const UNSAFE_NAMESPACE: &str = "withdraw-unsafe";

/// Pessimistic concurrency: take a per-user lease, then read and write the
/// balance with plain commands while holding it.
///
/// The plain read-then-decrement is only as correct as the lease. With the
/// safe release policy that holds as long as the TTL outlives the critical
/// section; the unsafe policy can delete a successor's lease and let two
/// callers in at once.
#[derive(Clone)]
pub struct LockGuardedStrategy {
    store: SharedStore,
    keys: KeySpace,
    lock: LeaseLock,
    settings: LockSettings,
    history_limit: usize,
}

impl LockGuardedStrategy {
    /// Lock-guarded withdrawals with token-verified release.
    pub fn new(
        store: SharedStore,
        keys: KeySpace,
        settings: LockSettings,
        history_limit: usize,
    ) -> Self {
        Self::with_policy(store, keys, settings, history_limit, ReleasePolicy::Safe)
    }

    /// Lock-guarded withdrawals whose release deletes the lease without
    /// checking who holds it. Kept for comparison against [`Self::new`].
    pub fn with_unsafe_release(
        store: SharedStore,
        keys: KeySpace,
        settings: LockSettings,
        history_limit: usize,
    ) -> Self {
        Self::with_policy(store, keys, settings, history_limit, ReleasePolicy::Unsafe)
    }

    fn with_policy(
        store: SharedStore,
        keys: KeySpace,
        settings: LockSettings,
        history_limit: usize,
        policy: ReleasePolicy,
    ) -> Self {
        Self {
            lock: LeaseLock::new(store.clone(), policy),
            store,
            keys,
            settings,
            history_limit,
        }
    }

    pub fn policy(&self) -> ReleasePolicy {
        self.lock.policy()
    }

    pub fn lock_key(&self, user: &str) -> String {
        let namespace = match self.policy() {
            ReleasePolicy::Safe => SAFE_NAMESPACE,
            ReleasePolicy::Unsafe => UNSAFE_NAMESPACE,
        };
        self.keys.lock(namespace, user)
    }

    async fn critical_section(&self, user: &str, amount: Amount) -> Result<WithdrawOutcome> {
        let balance_key = self.keys.balance(user);
        let Some(raw) = self.store.get(&balance_key).await? else {
            return Ok(WithdrawOutcome::missing());
        };
        let balance = Balance::parse(&balance_key, &raw)?;
        if !balance.covers(amount) {
            return Ok(WithdrawOutcome::insufficient());
        }
        let new_balance = self
            .store
            .decrement_and_log(
                &balance_key,
                &self.keys.history(user),
                amount.value(),
                self.history_limit,
            )
            .await?;
        Ok(WithdrawOutcome::ok(new_balance))
    }
}

#[async_trait]
impl WithdrawStrategy for LockGuardedStrategy {
    fn kind(&self) -> StrategyKind {
        match self.policy() {
            ReleasePolicy::Safe => StrategyKind::Lock,
            ReleasePolicy::Unsafe => StrategyKind::LockUnsafe,
        }
    }

    async fn withdraw(&self, user: &str, amount: Amount) -> Result<WithdrawOutcome> {
        let lock_key = self.lock_key(user);
        let guard = match self.lock.acquire_with(&lock_key, &self.settings).await? {
            Acquisition::Acquired(guard) => guard,
            Acquisition::Busy => return Ok(WithdrawOutcome::lock_busy()),
        };

        let outcome = self.critical_section(user, amount).await;

        // The decrement, if any, already happened; a failed release only
        // leaves the lease to expire on its own.
        if let Err(e) = guard.release().await {
            warn!(key = %lock_key, error = %e, "lease release failed");
        }

        Ok(outcome?.with_attempt(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::WithdrawStatus;
    use crate::domain::ports::KeyValueStore;
    use crate::error::WithdrawError;
    use crate::infrastructure::in_memory::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn settings() -> LockSettings {
        LockSettings {
            ttl: Duration::from_secs(5),
            wait_budget: Duration::from_millis(30),
            retry_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_withdraw_releases_lease() {
        let store = Arc::new(InMemoryStore::new());
        let keys = KeySpace::new("t");
        store.set(&keys.balance("u"), "50").await.unwrap();
        let strategy = LockGuardedStrategy::new(store.clone(), keys.clone(), settings(), 1000);

        let outcome = strategy.withdraw("u", Amount::new(20).unwrap()).await.unwrap();
        assert_eq!(outcome.status, WithdrawStatus::Ok);
        assert_eq!(outcome.new_balance, Some(30));
        assert_eq!(store.get(&strategy.lock_key("u")).await.unwrap(), None);
        assert_eq!(store.history(&keys.history("u"), 10).await.unwrap(), vec!["20"]);
    }

    #[tokio::test]
    async fn test_early_returns_release_lease() {
        let store = Arc::new(InMemoryStore::new());
        let keys = KeySpace::new("t");
        let strategy = LockGuardedStrategy::new(store.clone(), keys.clone(), settings(), 1000);

        let outcome = strategy.withdraw("u", Amount::new(1).unwrap()).await.unwrap();
        assert_eq!(outcome.status, WithdrawStatus::Missing);
        assert_eq!(store.get(&strategy.lock_key("u")).await.unwrap(), None);

        store.set(&keys.balance("u"), "0").await.unwrap();
        let outcome = strategy.withdraw("u", Amount::new(1).unwrap()).await.unwrap();
        assert_eq!(outcome.status, WithdrawStatus::Insufficient);
        assert_eq!(store.get(&strategy.lock_key("u")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_inside_section_releases_lease() {
        let store = Arc::new(InMemoryStore::new());
        let keys = KeySpace::new("t");
        store.set(&keys.balance("u"), "garbage").await.unwrap();
        let strategy = LockGuardedStrategy::new(store.clone(), keys, settings(), 1000);

        let result = strategy.withdraw("u", Amount::new(1).unwrap()).await;
        assert!(matches!(result, Err(WithdrawError::CorruptValue { .. })));
        assert_eq!(store.get(&strategy.lock_key("u")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_held_lease_reports_lock_busy() {
        let store = Arc::new(InMemoryStore::new());
        let keys = KeySpace::new("t");
        store.set(&keys.balance("u"), "50").await.unwrap();
        let strategy = LockGuardedStrategy::new(store.clone(), keys.clone(), settings(), 1000);

        store
            .set_if_absent(&strategy.lock_key("u"), "someone-else", Duration::from_secs(5))
            .await
            .unwrap();

        let outcome = strategy.withdraw("u", Amount::new(1).unwrap()).await.unwrap();
        assert_eq!(outcome.status, WithdrawStatus::LockBusy);
        assert_eq!(store.get(&keys.balance("u")).await.unwrap().as_deref(), Some("50"));
        // The foreign lease is untouched.
        assert_eq!(
            store.get(&strategy.lock_key("u")).await.unwrap().as_deref(),
            Some("someone-else")
        );
    }

    #[test]
    fn test_variants_use_separate_namespaces() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let keys = KeySpace::new("t");
        let safe = LockGuardedStrategy::new(store.clone(), keys.clone(), settings(), 1000);
        let unsafe_ = LockGuardedStrategy::with_unsafe_release(store, keys, settings(), 1000);

        assert_eq!(safe.kind(), StrategyKind::Lock);
        assert_eq!(unsafe_.kind(), StrategyKind::LockUnsafe);
        assert_ne!(safe.lock_key("u"), unsafe_.lock_key("u"));
    }
}
