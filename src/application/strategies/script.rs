use super::{StrategyKind, WithdrawStrategy};
use crate::domain::balance::Amount;
use crate::domain::keys::KeySpace;
use crate::domain::outcome::WithdrawOutcome;
use crate::domain::ports::{ScriptReply, SharedStore};
use crate::error::{Result, WithdrawError};
use async_trait::async_trait;

/// The whole withdrawal as one atomic server-side script. One round trip,
/// nothing to retry.
#[derive(Clone)]
pub struct ScriptStrategy {
    store: SharedStore,
    keys: KeySpace,
    history_limit: usize,
}

impl ScriptStrategy {
    pub fn new(store: SharedStore, keys: KeySpace, history_limit: usize) -> Self {
        Self {
            store,
            keys,
            history_limit,
        }
    }
}

#[async_trait]
impl WithdrawStrategy for ScriptStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Script
    }

    async fn withdraw(&self, user: &str, amount: Amount) -> Result<WithdrawOutcome> {
        let balance_key = self.keys.balance(user);
        let reply = self
            .store
            .atomic_withdraw(
                &balance_key,
                &self.keys.history(user),
                amount.value(),
                self.history_limit,
            )
            .await?;

        let outcome = match reply {
            ScriptReply::Applied(new_balance) => WithdrawOutcome::ok(new_balance),
            ScriptReply::Missing => WithdrawOutcome::missing(),
            ScriptReply::Insufficient => WithdrawOutcome::insufficient(),
            ScriptReply::Corrupt(value) => {
                return Err(WithdrawError::CorruptValue {
                    key: balance_key,
                    value,
                });
            }
        };
        Ok(outcome.with_attempt(1))
    }
}
