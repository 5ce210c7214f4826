//! Distributed lock repository.
//!
//! Tickets whose catalog definition sets `requires_locking` are mutated
//! under a short-lived exclusive lock keyed by ticket id, so concurrent
//! touches of the same ticket serialize instead of losing updates.
//!
//! Three implementations cover the deployment spectrum:
//!
//! - [`NoOpLockRepository`] grants every request immediately. Correct for single-writer
//!   deployments and opt-outs.
//! - [`MemoryLockRepository`] is a process-wide reentrant lock table for single-node
//!   deployments and tests.
//! - The Redis repository in `warden-registry-redis` extends exclusion across nodes.
//!
//! Locks are released through the returned [`LockGuard`]'s `Drop`, so an
//! early return or error path can never leave a key locked.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::error::{RegistryError, RegistryResult};

/// An acquired lock. Releases on drop.
///
/// Guards are not `Clone`; the holder that acquired the lock is the one
/// that releases it.
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    /// Wraps a release action to run when the guard drops.
    ///
    /// Backends construct guards through this; callers only drop them.
    #[must_use]
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self { release: Some(Box::new(release)) }
    }

    /// A guard that releases nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("held", &self.release.is_some()).finish()
    }
}

/// Exclusive lock acquisition keyed by ticket id.
///
/// Locks are reentrant per `owner`: a holder re-acquiring its own key gets
/// another guard immediately, and the key stays locked until every guard
/// has dropped.
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Acquires the lock for `key` on behalf of `owner`, waiting up to
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::LockTimeout`] when another owner still holds the
    /// key after `timeout`.
    #[must_use = "dropping the guard releases the lock"]
    async fn acquire(&self, key: &str, owner: &str, timeout: Duration) -> RegistryResult<LockGuard>;
}

/// Lock repository that grants every request immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLockRepository;

#[async_trait]
impl LockRepository for NoOpLockRepository {
    async fn acquire(
        &self,
        _key: &str,
        _owner: &str,
        _timeout: Duration,
    ) -> RegistryResult<LockGuard> {
        Ok(LockGuard::noop())
    }
}

/// Who holds a key and how many guards they hold.
struct Holder {
    owner: String,
    depth: u64,
}

/// Process-wide reentrant lock table.
///
/// Cheaply cloneable; clones share the same table.
#[derive(Clone, Default)]
pub struct MemoryLockRepository {
    holders: Arc<Mutex<HashMap<String, Holder>>>,
    released: Arc<Notify>,
}

impl MemoryLockRepository {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts one non-blocking acquisition. Returns a guard on success.
    fn try_acquire(&self, key: &str, owner: &str) -> Option<LockGuard> {
        let mut holders = self.holders.lock();
        match holders.get_mut(key) {
            Some(holder) if holder.owner == owner => {
                holder.depth = holder.depth.saturating_add(1);
            },
            Some(_) => return None,
            None => {
                holders.insert(key.to_owned(), Holder { owner: owner.to_owned(), depth: 1 });
            },
        }
        drop(holders);

        let table = self.holders.clone();
        let released = self.released.clone();
        let key = key.to_owned();
        Some(LockGuard::new(move || {
            let mut holders = table.lock();
            if let Some(holder) = holders.get_mut(&key) {
                holder.depth -= 1;
                if holder.depth == 0 {
                    holders.remove(&key);
                    released.notify_waiters();
                }
            }
        }))
    }
}

#[async_trait]
impl LockRepository for MemoryLockRepository {
    async fn acquire(
        &self,
        key: &str,
        owner: &str,
        timeout: Duration,
    ) -> RegistryResult<LockGuard> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register for release notifications before checking the table,
            // so a release between check and await is not missed.
            let released = self.released.notified();
            if let Some(guard) = self.try_acquire(key, owner) {
                trace!(key, owner, "lock acquired");
                return Ok(guard);
            }
            tokio::select! {
                () = released => {},
                () = tokio::time::sleep_until(deadline) => {
                    return Err(RegistryError::lock_timeout(key));
                }
            }
        }
    }
}
