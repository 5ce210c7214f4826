//! Redis-backed distributed lock repository.
//!
//! Acquisition is the standard `SET key token NX PX lease` pattern,
//! polled with jitter until the caller's timeout. Each guard holds a
//! random token, and release runs a compare-and-delete script so an
//! expired lease can never delete another holder's lock.
//!
//! Reentrancy is process-local: a holder re-acquiring its own key is
//! served from an in-process table without another round trip. Across
//! processes the lock is strictly exclusive.
//!
//! The lease bounds how long a crashed holder can block others. Guards
//! release asynchronously on drop and must be dropped inside a tokio
//! runtime.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, distr::Alphanumeric};
use redis::{Client, Script, aio::MultiplexedConnection};
use tracing::{trace, warn};
use warden_registry::{ConfigError, LockGuard, LockRepository, RegistryError, RegistryResult};

use crate::store::{KEY_PREFIX, store_err};

/// Deletes the lock only if the token still matches.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

const DEFAULT_LEASE: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const MIN_LEASE: Duration = Duration::from_millis(100);
const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(5);

fn lock_key(key: &str) -> String {
    format!("{KEY_PREFIX}:lock:{key}")
}

fn random_token() -> String {
    rand::rng().sample_iter(&Alphanumeric).take(16).map(char::from).collect()
}

/// Lock tuning knobs.
///
/// # Validation
///
/// - `lease` must be >= 100 ms
/// - `retry_interval` must be >= 5 ms
#[derive(Debug, Clone)]
pub struct LockConfig {
    lease: Duration,
    retry_interval: Duration,
}

impl LockConfig {
    /// Starts a builder with the default knobs.
    #[must_use]
    pub fn builder() -> LockConfigBuilder {
        LockConfigBuilder { lease: DEFAULT_LEASE, retry_interval: DEFAULT_RETRY_INTERVAL }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { lease: DEFAULT_LEASE, retry_interval: DEFAULT_RETRY_INTERVAL }
    }
}

/// Builder for [`LockConfig`].
pub struct LockConfigBuilder {
    lease: Duration,
    retry_interval: Duration,
}

impl LockConfigBuilder {
    /// Sets how long an unreleased lock survives (crash protection).
    #[must_use]
    pub fn lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Sets the base polling interval for contended keys. Each attempt
    /// adds up to 50% random jitter.
    #[must_use]
    pub fn retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Builds the configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// [`ConfigError::BelowMinimum`] when `lease` is under 100 ms or
    /// `retry_interval` is under 5 ms.
    pub fn build(self) -> Result<LockConfig, ConfigError> {
        if self.lease < MIN_LEASE {
            return Err(ConfigError::BelowMinimum {
                field: "lease",
                value: format!("{}ms", self.lease.as_millis()),
                min: "100ms".to_owned(),
            });
        }
        if self.retry_interval < MIN_RETRY_INTERVAL {
            return Err(ConfigError::BelowMinimum {
                field: "retry_interval",
                value: format!("{}ms", self.retry_interval.as_millis()),
                min: "5ms".to_owned(),
            });
        }
        Ok(LockConfig { lease: self.lease, retry_interval: self.retry_interval })
    }
}

/// A key currently held by this process.
struct LocalHold {
    owner: String,
    depth: u64,
    token: String,
}

/// Distributed locks over Redis `SET NX PX`.
///
/// Cheaply cloneable; clones share the connection and the local hold table.
#[derive(Clone)]
pub struct RedisLockRepository {
    conn: MultiplexedConnection,
    config: LockConfig,
    holds: Arc<Mutex<HashMap<String, LocalHold>>>,
}

impl RedisLockRepository {
    /// Connects with the default [`LockConfig`].
    pub async fn connect(client: &Client) -> RegistryResult<Self> {
        Self::with_config(client, LockConfig::default()).await
    }

    /// Connects with a custom configuration.
    ///
    /// # Errors
    ///
    /// [`RegistryError::StoreUnavailable`] when the connection cannot be
    /// established.
    pub async fn with_config(client: &Client, config: LockConfig) -> RegistryResult<Self> {
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_err("redis connection failed", e))?;
        Ok(Self { conn, config, holds: Arc::new(Mutex::new(HashMap::new())) })
    }

    /// Re-enters a key this process already holds for `owner`, if any.
    fn reenter(&self, key: &str, owner: &str) -> Option<LockGuard> {
        let mut holds = self.holds.lock();
        let hold = holds.get_mut(key)?;
        if hold.owner != owner {
            return None;
        }
        hold.depth = hold.depth.saturating_add(1);
        drop(holds);
        Some(self.guard_for(key))
    }

    /// Builds a guard that undoes one level of holding for `key`.
    fn guard_for(&self, key: &str) -> LockGuard {
        let holds = Arc::clone(&self.holds);
        let conn = self.conn.clone();
        let key = key.to_owned();
        LockGuard::new(move || {
            let token = {
                let mut holds = holds.lock();
                let Some(hold) = holds.get_mut(&key) else {
                    return;
                };
                hold.depth -= 1;
                if hold.depth > 0 {
                    return;
                }
                let token = hold.token.clone();
                holds.remove(&key);
                token
            };

            let mut conn = conn;
            tokio::spawn(async move {
                let released: Result<i64, redis::RedisError> = Script::new(RELEASE_SCRIPT)
                    .key(lock_key(&key))
                    .arg(&token)
                    .invoke_async(&mut conn)
                    .await;
                match released {
                    Ok(0) => warn!(key, "lock lease expired before release"),
                    Ok(_) => trace!(key, "lock released"),
                    Err(e) => warn!(key, error = %e, "lock release failed"),
                }
            });
        })
    }

    /// One remote `SET NX PX` attempt. `Ok(true)` means the lock was won.
    async fn try_remote(&self, key: &str, token: &str) -> RegistryResult<bool> {
        let mut conn = self.conn.clone();
        let won: Option<String> = redis::cmd("SET")
            .arg(lock_key(key))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(self.config.lease.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("redis lock acquire failed", e))?;
        Ok(won.is_some())
    }
}

#[async_trait]
impl LockRepository for RedisLockRepository {
    async fn acquire(
        &self,
        key: &str,
        owner: &str,
        timeout: Duration,
    ) -> RegistryResult<LockGuard> {
        if let Some(guard) = self.reenter(key, owner) {
            return Ok(guard);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let token = random_token();
        loop {
            if self.try_remote(key, &token).await? {
                let mut holds = self.holds.lock();
                holds.insert(
                    key.to_owned(),
                    LocalHold { owner: owner.to_owned(), depth: 1, token: token.clone() },
                );
                drop(holds);
                trace!(key, owner, "lock acquired");
                return Ok(self.guard_for(key));
            }

            let jitter = rand::rng().random_range(0..=self.config.retry_interval.as_millis() / 2);
            let backoff = self.config.retry_interval + Duration::from_millis(jitter as u64);
            if tokio::time::Instant::now() + backoff >= deadline {
                return Err(RegistryError::lock_timeout(key));
            }
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_are_namespaced() {
        assert_eq!(lock_key("TGT-1-a"), "warden:lock:TGT-1-a");
    }

    #[test]
    fn tokens_are_distinct() {
        assert_ne!(random_token(), random_token());
        assert_eq!(random_token().len(), 16);
    }

    #[test]
    fn config_validation() {
        assert!(LockConfig::builder().lease(Duration::from_millis(10)).build().is_err());
        assert!(
            LockConfig::builder().retry_interval(Duration::from_millis(1)).build().is_err()
        );
        assert!(LockConfig::builder().build().is_ok());
    }
}
