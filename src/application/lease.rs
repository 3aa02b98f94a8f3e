use crate::config::LockSettings;
use crate::domain::ports::SharedStore;
use crate::error::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// How a lease holder gives the lease back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Delete the lease only if it still carries our token.
    Safe,
    /// Delete the lease whoever holds it. If our TTL already ran out and
    /// someone else acquired the key, this removes *their* lease.
    Unsafe,
}

/// Result of an acquisition attempt.
#[derive(Debug)]
pub enum Acquisition {
    Acquired(LeaseGuard),
    /// The wait budget ran out while someone else held the lease.
    Busy,
}

/// A TTL-bounded exclusive key in the shared store.
#[derive(Clone)]
pub struct LeaseLock {
    store: SharedStore,
    policy: ReleasePolicy,
}

impl LeaseLock {
    pub fn new(store: SharedStore, policy: ReleasePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> ReleasePolicy {
        self.policy
    }

    /// Polls `set_if_absent` every `retry_delay` until it wins or more than
    /// `wait_budget` has elapsed.
    pub async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        wait_budget: Duration,
        retry_delay: Duration,
    ) -> Result<Acquisition> {
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            if self.store.set_if_absent(key, &token, ttl).await? {
                debug!(key, polls, "lease acquired");
                return Ok(Acquisition::Acquired(LeaseGuard {
                    store: self.store.clone(),
                    key: key.to_string(),
                    token,
                    policy: self.policy,
                    released: false,
                }));
            }
            if started.elapsed() > wait_budget {
                debug!(key, polls, "lease busy, wait budget exhausted");
                return Ok(Acquisition::Busy);
            }
            tokio::time::sleep(retry_delay).await;
        }
    }

    pub async fn acquire_with(&self, key: &str, settings: &LockSettings) -> Result<Acquisition> {
        self.acquire(key, settings.ttl, settings.wait_budget, settings.retry_delay)
            .await
    }
}

/// Proof of holding a lease.
///
/// Call [`LeaseGuard::release`] on every exit path. If the guard is dropped
/// without it (a cancelled future, a panic), a release is spawned on the
/// current runtime so the key does not linger until its TTL.
pub struct LeaseGuard {
    store: SharedStore,
    key: String,
    token: String,
    policy: ReleasePolicy,
    released: bool,
}

impl LeaseGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the store still holds our token under the lease key.
    pub async fn is_held(&self) -> Result<bool> {
        Ok(self.store.get(&self.key).await?.as_deref() == Some(self.token.as_str()))
    }

    /// Gives the lease back.
    ///
    /// Returns whether a key was removed by this call. Under the unsafe
    /// policy that is always reported as `true`, even when the key removed
    /// belonged to another holder.
    pub async fn release(mut self) -> Result<bool> {
        self.released = true;
        release(&self.store, &self.key, &self.token, self.policy).await
    }
}

async fn release(
    store: &SharedStore,
    key: &str,
    token: &str,
    policy: ReleasePolicy,
) -> Result<bool> {
    match policy {
        ReleasePolicy::Safe => {
            let removed = store.compare_and_delete(key, token).await?;
            if !removed {
                warn!(key, "lease expired before release; left the current holder's lease in place");
            }
            Ok(removed)
        }
        ReleasePolicy::Unsafe => {
            store.delete(key).await?;
            Ok(true)
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "lease guard dropped outside a runtime; relying on TTL");
            return;
        };
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        let policy = self.policy;
        handle.spawn(async move {
            if let Err(e) = release(&store, &key, &token, policy).await {
                warn!(key = %key, error = %e, "background lease release failed");
            }
        });
    }
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("policy", &self.policy)
            .finish()
    }
}
