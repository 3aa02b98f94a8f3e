use super::{StrategyKind, WithdrawStrategy};
use crate::domain::balance::{Amount, Balance};
use crate::domain::keys::KeySpace;
use crate::domain::outcome::WithdrawOutcome;
use crate::domain::ports::SharedStore;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Backoff after losing the race on attempt `attempt`: 5ms per attempt,
/// capped at 50ms.
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(u64::from(attempt.saturating_mul(5)).min(50))
}

/// Optimistic concurrency: no lock is held; a conditional write detects
/// interference after the fact and the loop retries.
#[derive(Clone)]
pub struct OptimisticStrategy {
    store: SharedStore,
    keys: KeySpace,
    max_retries: u32,
    history_limit: usize,
}

impl OptimisticStrategy {
    pub fn new(store: SharedStore, keys: KeySpace, max_retries: u32, history_limit: usize) -> Self {
        Self {
            store,
            keys,
            max_retries,
            history_limit,
        }
    }
}

#[async_trait]
impl WithdrawStrategy for OptimisticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Optimistic
    }

    async fn withdraw(&self, user: &str, amount: Amount) -> Result<WithdrawOutcome> {
        let balance_key = self.keys.balance(user);
        let history_key = self.keys.history(user);

        for attempt in 1..=self.max_retries {
            let Some(raw) = self.store.get(&balance_key).await? else {
                return Ok(WithdrawOutcome::missing().with_attempt(attempt));
            };
            let balance = Balance::parse(&balance_key, &raw)?;
            // Insufficiency is a verdict, not a conflict: no retry.
            if !balance.covers(amount) {
                return Ok(WithdrawOutcome::insufficient().with_attempt(attempt));
            }

            let reply = self
                .store
                .compare_and_swap_decrement(
                    &balance_key,
                    &history_key,
                    balance.0,
                    amount.value(),
                    self.history_limit,
                )
                .await?;
            if reply.applied {
                let new_balance = reply.new_value.unwrap_or((balance - amount).0);
                return Ok(WithdrawOutcome::ok(new_balance).with_attempt(attempt));
            }

            debug!(user, attempt, seen = balance.0, "balance changed underneath, retrying");
            if attempt < self.max_retries {
                tokio::time::sleep(backoff(attempt)).await;
            }
        }

        Ok(WithdrawOutcome::conflict().with_attempt(self.max_retries))
    }
}
