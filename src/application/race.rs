use crate::application::engine::WithdrawalEngine;
use crate::application::strategies::StrategyKind;
use crate::domain::balance::Amount;
use crate::domain::outcome::WithdrawStatus;
use crate::error::Result;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::task::JoinSet;
use tracing::warn;

/// What happened when many withdrawals hit one balance at once.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RaceReport {
    pub strategy: &'static str,
    pub user: String,
    pub requests: usize,
    pub initial_balance: i64,
    pub statuses: BTreeMap<WithdrawStatus, usize>,
    /// Withdrawals that ended in an infrastructure error.
    pub failures: usize,
    /// Sum of the amounts reported `ok`.
    pub withdrawn: i64,
    pub expected_balance: i64,
    pub final_balance: Option<i64>,
    pub history_len: usize,
    /// The store disagrees with what the callers were told.
    pub lost_updates: bool,
    /// The balance went below zero, i.e. two callers passed the
    /// sufficiency check on the same funds.
    pub overdrawn: bool,
}

impl RaceReport {
    pub fn count(&self, status: WithdrawStatus) -> usize {
        self.statuses.get(&status).copied().unwrap_or(0)
    }
}

/// Amounts for a race: `base` each, moved by up to `jitter` either way and
/// never below 1.
pub fn jittered_amounts<R: Rng>(
    base: i64,
    jitter: i64,
    count: usize,
    rng: &mut R,
) -> Result<Vec<Amount>> {
    (0..count)
        .map(|_| {
            let offset = if jitter > 0 {
                rng.gen_range(-jitter..=jitter)
            } else {
                0
            };
            Amount::new(base.saturating_add(offset).max(1))
        })
        .collect()
}

/// Resets `user` to `initial`, fires every withdrawal in `amounts` as its
/// own task, and compares what callers saw with what the store holds.
pub async fn race(
    engine: &WithdrawalEngine,
    kind: StrategyKind,
    user: &str,
    initial: i64,
    amounts: &[Amount],
) -> Result<RaceReport> {
    engine.reset(user, initial).await?;

    let mut tasks = JoinSet::new();
    for &amount in amounts {
        let engine = engine.clone();
        let user = user.to_string();
        tasks.spawn(async move { (amount, engine.strategy(kind).withdraw(&user, amount).await) });
    }

    let mut statuses = BTreeMap::new();
    let mut failures = 0;
    let mut withdrawn = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((amount, Ok(outcome))) => {
                if outcome.is_ok() {
                    withdrawn = amount.value().saturating_add(withdrawn);
                }
                *statuses.entry(outcome.status).or_insert(0) += 1;
            }
            Ok((_, Err(e))) => {
                warn!(strategy = %kind, error = %e, "withdrawal failed");
                failures += 1;
            }
            Err(e) => {
                warn!(strategy = %kind, error = %e, "withdrawal task aborted");
                failures += 1;
            }
        }
    }

    let expected_balance = initial.saturating_sub(withdrawn);
    let final_balance = engine.balance(user).await?.map(|b| b.0);
    let history_len = engine
        .history(user, engine.config().history_limit)
        .await?
        .len();

    Ok(RaceReport {
        strategy: kind.as_str(),
        user: user.to_string(),
        requests: amounts.len(),
        initial_balance: initial,
        statuses,
        failures,
        withdrawn,
        expected_balance,
        final_balance,
        history_len,
        lost_updates: final_balance != Some(expected_balance),
        overdrawn: final_balance.is_some_and(|b| b < 0),
    })
}
