//! In-process ticket cache fronting the distributed store.
//!
//! The cache absorbs read traffic so validation requests do not hit the
//! shared store on every fetch. Entries are bounded two ways:
//!
//! - **Size**: least-recently-used eviction past `max_entries`.
//! - **TTL**: a staleness bound, not the source of truth. The facade
//!   re-runs the expiration policy evaluator on every hit, so the cache
//!   can never serve a ticket past its true expiration. The TTL limits
//!   how long a remotely mutated entry can survive if its invalidation
//!   event was lost.
//!
//! Entries are invalidated locally on every mutation and remotely by
//! cluster invalidation events.

use std::time::Duration;

use moka::future::Cache;
use tracing::trace;
use warden_tickets::Ticket;

use crate::error::ConfigError;

/// Default maximum number of cached tickets.
const DEFAULT_MAX_ENTRIES: u64 = 50_000;

/// Default cache entry TTL (the staleness bound).
const DEFAULT_TTL: Duration = Duration::from_secs(15);

/// Minimum allowed cache TTL.
const MIN_TTL: Duration = Duration::from_millis(100);

/// Configuration for the local ticket cache.
///
/// # Validation
///
/// - `max_entries` must be >= 1
/// - `ttl` must be >= 100 ms
///
/// Use [`CacheConfig::disabled()`] to bypass caching entirely (every fetch
/// goes to the store).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    max_entries: u64,
    ttl: Duration,
    enabled: bool,
}

impl CacheConfig {
    /// Starts a builder with the default bounds.
    #[must_use]
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder { max_entries: DEFAULT_MAX_ENTRIES, ttl: DEFAULT_TTL }
    }

    /// A configuration with caching turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self { max_entries: 0, ttl: Duration::ZERO, enabled: false }
    }

    /// The staleness bound applied to each entry.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether caching is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: DEFAULT_MAX_ENTRIES, ttl: DEFAULT_TTL, enabled: true }
    }
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder {
    max_entries: u64,
    ttl: Duration,
}

impl CacheConfigBuilder {
    /// Sets the maximum number of cached tickets.
    #[must_use]
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the per-entry TTL (staleness bound).
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Builds the configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// [`ConfigError::BelowMinimum`] when `max_entries` is 0 or `ttl` is
    /// under 100 ms.
    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_entries",
                value: self.max_entries.to_string(),
                min: "1".to_owned(),
            });
        }
        if self.ttl < MIN_TTL {
            return Err(ConfigError::BelowMinimum {
                field: "ttl",
                value: format!("{}ms", self.ttl.as_millis()),
                min: "100ms".to_owned(),
            });
        }
        Ok(CacheConfig { max_entries: self.max_entries, ttl: self.ttl, enabled: true })
    }
}

/// Size- and time-bounded cache of ticket values, keyed by id.
///
/// Cheaply cloneable; clones share the underlying cache.
#[derive(Clone)]
pub struct TicketCache {
    cache: Option<Cache<String, Ticket>>,
}

impl TicketCache {
    /// Creates the cache. A disabled config allocates nothing.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            Cache::builder().max_capacity(config.max_entries).time_to_live(config.ttl).build()
        });
        Self { cache }
    }

    /// Returns the cached ticket for `id`, if present.
    pub async fn get(&self, id: &str) -> Option<Ticket> {
        let cache = self.cache.as_ref()?;
        let hit = cache.get(id).await;
        trace!(ticket_id = id, hit = hit.is_some(), "ticket cache lookup");
        hit
    }

    /// Caches a ticket value under its id.
    pub async fn put(&self, ticket: Ticket) {
        if let Some(cache) = &self.cache {
            cache.insert(ticket.id.clone(), ticket).await;
        }
    }

    /// Drops the entry for `id`.
    pub async fn invalidate(&self, id: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(id).await;
        }
    }

    /// Drops every entry.
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    /// Current entry count (approximate, for monitoring).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.as_ref().map_or(0, Cache::entry_count)
    }
}
