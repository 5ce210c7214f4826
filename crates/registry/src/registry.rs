//! The ticket registry facade.
//!
//! [`TicketRegistry`] composes the catalog, cipher, codec, cache, store,
//! invalidation bus, and lock repository into the one surface the protocol
//! layer talks to. The write path is strict write-through: mutate the
//! store first, then the local cache, then publish the invalidation event.
//!
//! # Liveness
//!
//! The registry is the only component that decides whether a ticket is
//! alive. Store TTLs and cache TTLs are hints; every fetch re-runs the
//! ticket's expiration policy, and an expired ticket found on the read
//! path is deleted lazily (with its descendants) before `None` is
//! returned.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_tickets::{Ticket, TicketCatalog, TicketIdGenerator, TicketKind};

use crate::{
    bus::{InvalidationBus, LocalBus, TicketEvent, TicketOperation},
    cache::{CacheConfig, TicketCache},
    cipher::{NoOpTicketCipher, TicketCipher},
    codec::{RegistryRecord, TicketCodec},
    error::{ConfigError, RegistryError, RegistryResult},
    health::{HealthProbe, HealthStatus},
    lock::{LockGuard, LockRepository, MemoryLockRepository},
    store::TicketStore,
};

/// Default lock acquisition timeout.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default slack added to policy lifetimes when computing store TTL hints.
const DEFAULT_TTL_MARGIN: Duration = Duration::from_secs(300);

/// Minimum allowed lock timeout.
const MIN_LOCK_TIMEOUT: Duration = Duration::from_millis(10);

/// Default deadline for a single store operation.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum allowed store operation deadline.
const MIN_OP_TIMEOUT: Duration = Duration::from_millis(10);

/// Registry tuning knobs.
///
/// # Validation
///
/// - `lock_timeout` and `op_timeout` must be >= 10 ms
/// - `node_id` must be non-empty
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    node_id: String,
    ttl_margin: Duration,
    lock_timeout: Duration,
    op_timeout: Duration,
}

impl RegistryConfig {
    /// Starts a builder with the default knobs and a random node id.
    #[must_use]
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder {
            node_id: None,
            ttl_margin: DEFAULT_TTL_MARGIN,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// This node's identity on the invalidation bus.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn random_node_id() -> String {
        let suffix: String =
            rand::rng().sample_iter(&Alphanumeric).take(8).map(char::from).collect();
        format!("node-{}", suffix.to_lowercase())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            node_id: Self::random_node_id(),
            ttl_margin: DEFAULT_TTL_MARGIN,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

/// Builder for [`RegistryConfig`].
pub struct RegistryConfigBuilder {
    node_id: Option<String>,
    ttl_margin: Duration,
    lock_timeout: Duration,
    op_timeout: Duration,
}

impl RegistryConfigBuilder {
    /// Sets this node's identity on the invalidation bus.
    ///
    /// Defaults to a random `node-xxxxxxxx` id.
    #[must_use]
    pub fn node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Sets the slack added to policy lifetimes for store TTL hints.
    #[must_use]
    pub fn ttl_margin(mut self, ttl_margin: Duration) -> Self {
        self.ttl_margin = ttl_margin;
        self
    }

    /// Sets how long a mutation waits for a contended ticket lock.
    #[must_use]
    pub fn lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Sets the deadline for a single store operation.
    #[must_use]
    pub fn op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Builds the configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for an empty node id,
    /// [`ConfigError::BelowMinimum`] for a lock or operation timeout
    /// under 10 ms.
    pub fn build(self) -> Result<RegistryConfig, ConfigError> {
        if let Some(node_id) = &self.node_id
            && node_id.is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "node_id",
                reason: "must not be empty".to_owned(),
            });
        }
        if self.lock_timeout < MIN_LOCK_TIMEOUT {
            return Err(ConfigError::BelowMinimum {
                field: "lock_timeout",
                value: format!("{}ms", self.lock_timeout.as_millis()),
                min: "10ms".to_owned(),
            });
        }
        if self.op_timeout < MIN_OP_TIMEOUT {
            return Err(ConfigError::BelowMinimum {
                field: "op_timeout",
                value: format!("{}ms", self.op_timeout.as_millis()),
                min: "10ms".to_owned(),
            });
        }
        Ok(RegistryConfig {
            node_id: self.node_id.unwrap_or_else(RegistryConfig::random_node_id),
            ttl_margin: self.ttl_margin,
            lock_timeout: self.lock_timeout,
            op_timeout: self.op_timeout,
        })
    }
}

/// Distributed ticket registry.
///
/// Cheaply cloneable; clones share every component.
///
/// # Example
///
/// ```no_run
/// use warden_registry::{MemoryTicketStore, TicketRegistry};
/// use warden_tickets::TicketKind;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry =
///     TicketRegistry::builder().store(MemoryTicketStore::new()).build()?;
///
/// let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await?;
/// assert!(registry.get_ticket(&tgt.id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TicketRegistry {
    catalog: Arc<TicketCatalog>,
    ids: Arc<TicketIdGenerator>,
    cipher: Arc<dyn TicketCipher>,
    codec: TicketCodec,
    cache: TicketCache,
    store: Arc<dyn TicketStore>,
    bus: Arc<dyn InvalidationBus>,
    locks: Arc<dyn LockRepository>,
    config: Arc<RegistryConfig>,
    /// Distinguishes concurrent acquisitions from the same node, so two
    /// tasks here contend instead of reentering each other's lock.
    lock_seq: Arc<AtomicU64>,
}

impl TicketRegistry {
    /// Starts a builder. Only the store is mandatory.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            catalog: None,
            cipher: None,
            cache_config: CacheConfig::default(),
            store: None,
            bus: None,
            locks: None,
            config: None,
        }
    }

    /// Issues a new ticket of `kind` for `principal_id` under the
    /// catalog's default policy, and persists it.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownKind`] when the catalog has no definition
    /// for `kind`; store errors from the write path.
    pub async fn create_ticket(
        &self,
        kind: TicketKind,
        principal_id: &str,
    ) -> RegistryResult<Ticket> {
        let definition = self.catalog.find(kind)?;
        let ticket = Ticket::new(
            self.ids.next_id(kind),
            kind,
            principal_id,
            definition.default_policy.clone(),
            Utc::now(),
        );
        self.add_ticket(Self::mint_readiness(ticket)).await
    }

    /// Issues a new ticket derived from `parent_id` (e.g., a service
    /// ticket under a grant), and persists it.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownKind`] for an uncataloged kind; store
    /// errors from the write path.
    pub async fn create_child_ticket(
        &self,
        kind: TicketKind,
        principal_id: &str,
        parent_id: &str,
    ) -> RegistryResult<Ticket> {
        let definition = self.catalog.find(kind)?;
        let ticket = Ticket::new(
            self.ids.next_id(kind),
            kind,
            principal_id,
            definition.default_policy.clone(),
            Utc::now(),
        )
        .with_parent(parent_id);
        self.add_ticket(Self::mint_readiness(ticket)).await
    }

    /// Synchronous kinds are usable the moment they are minted;
    /// backchannel requests stay unready until the out-of-band
    /// authentication completes.
    fn mint_readiness(ticket: Ticket) -> Ticket {
        if ticket.kind == TicketKind::BackchannelRequest { ticket } else { ticket.marked_ready() }
    }

    /// Persists a caller-built ticket (custom policy or attributes).
    ///
    /// The ticket is written exactly as given, readiness flag included;
    /// it becomes visible to other nodes only once the store write
    /// succeeds.
    pub async fn add_ticket(&self, ticket: Ticket) -> RegistryResult<Ticket> {
        self.write_through(&ticket).await?;
        debug!(ticket_id = %ticket.id, kind = %ticket.kind, "ticket added");
        Ok(ticket)
    }

    /// Sets a ticket's readiness flag and writes the update through.
    ///
    /// This is how a backchannel request becomes usable once its
    /// out-of-band authentication completes. Runs under the ticket's
    /// distributed lock when its definition requires locking, with a
    /// fresh store read inside the critical section.
    ///
    /// Returns the updated ticket, or `Ok(None)` when the ticket is
    /// unknown or expired.
    pub async fn mark_ticket_ready(&self, ticket_id: &str) -> RegistryResult<Option<Ticket>> {
        let requires_locking =
            self.catalog.find_by_id(ticket_id).map(|d| d.requires_locking).unwrap_or(false);
        let _guard = self.lock_if(requires_locking, ticket_id).await?;

        let Some(record) = self.timed(self.store.load(ticket_id)).await? else {
            return Ok(None);
        };
        let Some(ticket) = self.decode_or_warn(&record) else {
            return Ok(None);
        };
        if ticket.is_expired(Utc::now()) {
            // Already holding the lock for this id.
            self.cascade_delete(ticket_id).await?;
            return Ok(None);
        }

        let ready = ticket.marked_ready();
        self.write_through(&ready).await?;
        debug!(ticket_id, "ticket marked ready");
        Ok(Some(ready))
    }

    /// Fetches a live ticket by id.
    ///
    /// Returns `Ok(None)` when the id is unknown, the ticket has expired
    /// (it is then deleted along with its descendants), or the stored
    /// record cannot be decoded. Undecodable records are logged and
    /// treated as absent rather than failing the caller.
    pub async fn get_ticket(&self, ticket_id: &str) -> RegistryResult<Option<Ticket>> {
        if let Some(ticket) = self.cache.get(ticket_id).await {
            if ticket.is_expired(Utc::now()) {
                self.delete_ticket(ticket_id).await?;
                return Ok(None);
            }
            return Ok(Some(ticket));
        }

        let Some(record) = self.timed(self.store.load(ticket_id)).await? else {
            return Ok(None);
        };
        let Some(ticket) = self.decode_or_warn(&record) else {
            return Ok(None);
        };
        if ticket.is_expired(Utc::now()) {
            debug!(ticket_id, "expired ticket found on read path");
            self.delete_ticket(ticket_id).await?;
            return Ok(None);
        }

        self.cache.put(ticket.clone()).await;
        Ok(Some(ticket))
    }

    /// Fetches a live ticket by id, requiring it to be of `kind`.
    ///
    /// A live ticket of a different kind reads as absent. Validation
    /// handlers use this to reject an id pasted into the wrong parameter.
    pub async fn get_ticket_of_kind(
        &self,
        ticket_id: &str,
        kind: TicketKind,
    ) -> RegistryResult<Option<Ticket>> {
        Ok(self.get_ticket(ticket_id).await?.filter(|ticket| ticket.kind == kind))
    }

    /// Records a use of the ticket: bumps its use count and last-used
    /// time, and writes the update through.
    ///
    /// When the ticket's catalog definition requires locking, the update
    /// runs under the distributed lock for the ticket id, and the ticket
    /// is re-read from the store inside the critical section so no
    /// concurrent touch is lost.
    ///
    /// Returns the updated ticket, or `Ok(None)` when the ticket is
    /// unknown or expired.
    pub async fn touch_ticket(&self, ticket_id: &str) -> RegistryResult<Option<Ticket>> {
        let requires_locking =
            self.catalog.find_by_id(ticket_id).map(|d| d.requires_locking).unwrap_or(false);
        let _guard = self.lock_if(requires_locking, ticket_id).await?;

        // Fresh read under the lock; the cache may lag another node.
        let Some(record) = self.timed(self.store.load(ticket_id)).await? else {
            return Ok(None);
        };
        let Some(ticket) = self.decode_or_warn(&record) else {
            return Ok(None);
        };
        if ticket.is_expired(Utc::now()) {
            // Already holding the lock for this id.
            self.cascade_delete(ticket_id).await?;
            return Ok(None);
        }

        let touched = ticket.touched(Utc::now());
        self.write_through(&touched).await?;
        debug!(ticket_id, count_of_uses = touched.count_of_uses, "ticket touched");
        Ok(Some(touched))
    }

    /// Deletes a ticket and every ticket descended from it.
    ///
    /// Descendants are discovered breadth-first through the store's
    /// parent index, so a grant's service and proxy tickets (and theirs)
    /// go with it. Idempotent; deleting an unknown id returns 0.
    ///
    /// Returns the number of live tickets removed.
    pub async fn delete_ticket(&self, ticket_id: &str) -> RegistryResult<u64> {
        let requires_locking =
            self.catalog.find_by_id(ticket_id).map(|d| d.requires_locking).unwrap_or(false);
        let _guard = self.lock_if(requires_locking, ticket_id).await?;
        self.cascade_delete(ticket_id).await
    }

    /// The cascade body, run while the caller holds any required lock on
    /// the root. Only the root is locked; descendants are deleted as
    /// discovered.
    async fn cascade_delete(&self, ticket_id: &str) -> RegistryResult<u64> {
        let mut removed = 0u64;
        let mut queue = vec![ticket_id.to_owned()];
        while let Some(id) = queue.pop() {
            for child in self.timed(self.store.load_children(&id)).await? {
                queue.push(child.id);
            }
            if self.timed(self.store.delete(&id)).await? {
                removed += 1;
            }
            self.cache.invalidate(&id).await;
            self.bus.publish(TicketEvent::delete(&id, &self.config.node_id)).await?;
        }

        if removed > 0 {
            info!(ticket_id, removed, "ticket deleted");
        }
        Ok(removed)
    }

    /// Returns every live ticket owned by `principal_id`, restricted to
    /// one kind when `kind` is given.
    ///
    /// Expired and undecodable records are skipped (the latter logged).
    pub async fn tickets_for_principal(
        &self,
        principal_id: &str,
        kind: Option<TicketKind>,
    ) -> RegistryResult<Vec<Ticket>> {
        let now = Utc::now();
        let records = self.timed(self.store.load_by_principal(principal_id, kind)).await?;
        Ok(records
            .iter()
            .filter_map(|record| self.decode_or_warn(record))
            .filter(|ticket| !ticket.is_expired(now))
            .collect())
    }

    /// Counts live tickets, restricted to one kind when `kind` is given.
    pub async fn count_tickets(&self, kind: Option<TicketKind>) -> RegistryResult<u64> {
        self.timed(self.store.count(kind)).await
    }

    /// Deletes every ticket, or every ticket of one kind, and purges
    /// every cache in the cluster.
    ///
    /// A kind-scoped purge still invalidates whole caches on every node;
    /// over-invalidation is harmless, the next fetch reloads from the
    /// store.
    ///
    /// Returns the number of tickets removed from the store.
    pub async fn delete_all(&self, kind: Option<TicketKind>) -> RegistryResult<u64> {
        let removed = self.timed(self.store.delete_all(kind)).await?;
        self.cache.invalidate_all();
        self.bus.publish(TicketEvent::purge(&self.config.node_id)).await?;
        info!(removed, kind = ?kind, "tickets purged");
        Ok(removed)
    }

    /// Checks the underlying store's health.
    pub async fn health_check(&self, probe: HealthProbe) -> RegistryResult<HealthStatus> {
        self.timed(self.store.health_check(probe)).await
    }

    /// Spawns the task that applies cluster invalidation events to the
    /// local cache.
    ///
    /// Events published by this node are skipped; the write path already
    /// maintained the local cache. A lagged subscription purges the whole
    /// cache, since which entries were missed is unknown. The task exits
    /// when the bus closes.
    pub fn start_invalidation_listener(&self) -> JoinHandle<()> {
        let mut events = self.bus.subscribe();
        let cache = self.cache.clone();
        let node_id = self.config.node_id.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event.publisher_id == node_id {
                            continue;
                        }
                        match (event.operation, event.ticket_id) {
                            (TicketOperation::Purge, _) => cache.invalidate_all(),
                            (_, Some(id)) => cache.invalidate(&id).await,
                            (_, None) => {},
                        }
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "invalidation subscription lagged, purging cache");
                        cache.invalidate_all();
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }

    /// Serialize, encrypt, store, cache, announce. In that order.
    async fn write_through(&self, ticket: &Ticket) -> RegistryResult<()> {
        let plaintext = self.codec.serialize(ticket)?;
        let blob = self.cipher.encode(&plaintext)?;
        let record = RegistryRecord::for_ticket(ticket, blob, self.config.ttl_margin);
        self.timed(self.store.save(record)).await?;
        self.cache.put(ticket.clone()).await;
        self.bus.publish(TicketEvent::upsert(&ticket.id, &self.config.node_id)).await?;
        Ok(())
    }

    /// Decrypts and deserializes a record, demoting decode failures to a
    /// warning so one corrupt record cannot fail a lookup.
    fn decode_or_warn(&self, record: &RegistryRecord) -> Option<Ticket> {
        let plaintext = match self.cipher.decode(&record.payload) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(ticket_id = %record.id, error = %e, "ticket payload failed verification");
                return None;
            },
        };
        match self.codec.deserialize(&plaintext, &record.id, Some(record.kind)) {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                warn!(ticket_id = %record.id, error = %e, "corrupt ticket record");
                None
            },
        }
    }

    /// Applies the per-operation deadline to one store call.
    async fn timed<T>(
        &self,
        operation: impl Future<Output = RegistryResult<T>> + Send,
    ) -> RegistryResult<T> {
        tokio::time::timeout(self.config.op_timeout, operation)
            .await
            .map_err(|_| RegistryError::Timeout)?
    }

    async fn lock_if(&self, requires_locking: bool, ticket_id: &str) -> RegistryResult<LockGuard> {
        if requires_locking {
            let seq = self.lock_seq.fetch_add(1, Ordering::Relaxed);
            let owner = format!("{}#{seq}", self.config.node_id);
            self.locks.acquire(ticket_id, &owner, self.config.lock_timeout).await
        } else {
            Ok(LockGuard::noop())
        }
    }
}

/// Builder for [`TicketRegistry`].
///
/// Defaults: the standard catalog, no encryption, the default cache,
/// an in-process bus, and in-process locks. Production deployments
/// supply the Redis store, bus, and locks plus an [`AeadTicketCipher`]
/// (see `warden-registry-redis`).
///
/// [`AeadTicketCipher`]: crate::cipher::AeadTicketCipher
pub struct RegistryBuilder {
    catalog: Option<TicketCatalog>,
    cipher: Option<Arc<dyn TicketCipher>>,
    cache_config: CacheConfig,
    store: Option<Arc<dyn TicketStore>>,
    bus: Option<Arc<dyn InvalidationBus>>,
    locks: Option<Arc<dyn LockRepository>>,
    config: Option<RegistryConfig>,
}

impl RegistryBuilder {
    /// Sets the ticket catalog. Defaults to [`TicketCatalog::standard`].
    #[must_use]
    pub fn catalog(mut self, catalog: TicketCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Sets the payload cipher. Defaults to no encryption.
    #[must_use]
    pub fn cipher(mut self, cipher: impl TicketCipher + 'static) -> Self {
        self.cipher = Some(Arc::new(cipher));
        self
    }

    /// Sets the local cache configuration.
    #[must_use]
    pub fn cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.cache_config = cache_config;
        self
    }

    /// Sets the distributed store. Mandatory.
    #[must_use]
    pub fn store(mut self, store: impl TicketStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Sets the invalidation bus. Defaults to an in-process [`LocalBus`].
    #[must_use]
    pub fn bus(mut self, bus: impl InvalidationBus + 'static) -> Self {
        self.bus = Some(Arc::new(bus));
        self
    }

    /// Sets the lock repository. Defaults to in-process locks.
    #[must_use]
    pub fn locks(mut self, locks: impl LockRepository + 'static) -> Self {
        self.locks = Some(Arc::new(locks));
        self
    }

    /// Sets the registry configuration. Defaults to [`RegistryConfig::default`].
    #[must_use]
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when no store was supplied.
    pub fn build(self) -> Result<TicketRegistry, ConfigError> {
        let store = self.store.ok_or_else(|| ConfigError::Invalid {
            field: "store",
            reason: "a ticket store is required".to_owned(),
        })?;
        Ok(TicketRegistry {
            catalog: Arc::new(self.catalog.unwrap_or_else(TicketCatalog::standard)),
            ids: Arc::new(TicketIdGenerator::new()),
            cipher: self.cipher.unwrap_or_else(|| Arc::new(NoOpTicketCipher)),
            codec: TicketCodec,
            cache: TicketCache::new(&self.cache_config),
            store,
            bus: self.bus.unwrap_or_else(|| Arc::new(LocalBus::new())),
            locks: self.locks.unwrap_or_else(|| Arc::new(MemoryLockRepository::new())),
            config: Arc::new(self.config.unwrap_or_default()),
            lock_seq: Arc::new(AtomicU64::new(0)),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryTicketStore;

    fn registry() -> TicketRegistry {
        TicketRegistry::builder().store(MemoryTicketStore::new()).build().unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let registry = registry();
        let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
        assert!(tgt.id.starts_with("TGT-"));
        assert!(tgt.ready);

        let fetched = registry.get_ticket(&tgt.id).await.unwrap().unwrap();
        assert_eq!(fetched.principal_id, "alice");
        assert!(registry.get_ticket("TGT-99-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn backchannel_requests_start_unready() {
        let registry = registry();
        let bcr = registry.create_ticket(TicketKind::BackchannelRequest, "alice").await.unwrap();
        assert!(!bcr.ready);
        assert!(!registry.get_ticket(&bcr.id).await.unwrap().unwrap().ready);

        let flipped = registry.mark_ticket_ready(&bcr.id).await.unwrap().unwrap();
        assert!(flipped.ready);
        assert!(registry.get_ticket(&bcr.id).await.unwrap().unwrap().ready);

        assert!(registry.mark_ticket_ready("BCR-9-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_kind_is_an_error() {
        let catalog = TicketCatalog::builder().build();
        let registry = TicketRegistry::builder()
            .catalog(catalog)
            .store(MemoryTicketStore::new())
            .build()
            .unwrap();

        let err = registry.create_ticket(TicketKind::Service, "alice").await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownKind { .. }));
    }

    #[tokio::test]
    async fn touch_bumps_use_count() {
        let registry = registry();
        let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();

        let touched = registry.touch_ticket(&tgt.id).await.unwrap().unwrap();
        assert_eq!(touched.count_of_uses, 1);
        let touched = registry.touch_ticket(&tgt.id).await.unwrap().unwrap();
        assert_eq!(touched.count_of_uses, 2);

        assert!(registry.touch_ticket("TGT-99-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn single_use_ticket_expires_after_touch() {
        let registry = registry();
        let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
        let st = registry
            .create_child_ticket(TicketKind::Service, "alice", &tgt.id)
            .await
            .unwrap();

        assert!(registry.touch_ticket(&st.id).await.unwrap().is_some());
        // The standard catalog issues single-use service tickets.
        assert!(registry.get_ticket(&st.id).await.unwrap().is_none());
        // The parent grant is untouched.
        assert!(registry.get_ticket(&tgt.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_cascades_to_descendants() {
        let registry = registry();
        let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
        let st =
            registry.create_child_ticket(TicketKind::Service, "alice", &tgt.id).await.unwrap();
        let pgt = registry
            .create_child_ticket(TicketKind::ProxyGranting, "alice", &tgt.id)
            .await
            .unwrap();
        let pt =
            registry.create_child_ticket(TicketKind::Proxy, "alice", &pgt.id).await.unwrap();

        assert_eq!(registry.delete_ticket(&tgt.id).await.unwrap(), 4);
        for id in [&tgt.id, &st.id, &pgt.id, &pt.id] {
            assert!(registry.get_ticket(id).await.unwrap().is_none());
        }
        // Idempotent.
        assert_eq!(registry.delete_ticket(&tgt.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn principal_lookup_and_counts() {
        let registry = registry();
        let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
        registry.create_child_ticket(TicketKind::Service, "alice", &tgt.id).await.unwrap();
        registry.create_ticket(TicketKind::TicketGranting, "bob").await.unwrap();

        assert_eq!(registry.tickets_for_principal("alice", None).await.unwrap().len(), 2);
        let alice_grants = registry
            .tickets_for_principal("alice", Some(TicketKind::TicketGranting))
            .await
            .unwrap();
        assert_eq!(alice_grants.len(), 1);
        assert_eq!(registry.count_tickets(None).await.unwrap(), 3);
        assert_eq!(registry.count_tickets(Some(TicketKind::TicketGranting)).await.unwrap(), 2);
        assert!(registry.tickets_for_principal("carol", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn kind_checked_fetch_rejects_mismatches() {
        let registry = registry();
        let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();

        let fetched =
            registry.get_ticket_of_kind(&tgt.id, TicketKind::TicketGranting).await.unwrap();
        assert!(fetched.is_some());
        assert!(registry.get_ticket_of_kind(&tgt.id, TicketKind::Service).await.unwrap().is_none());
        // A mismatched fetch must not delete the ticket.
        assert!(registry.get_ticket(&tgt.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_all_purges() {
        let registry = registry();
        let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
        registry.create_ticket(TicketKind::TicketGranting, "bob").await.unwrap();
        registry.create_child_ticket(TicketKind::Service, "alice", &tgt.id).await.unwrap();

        assert_eq!(registry.delete_all(Some(TicketKind::Service)).await.unwrap(), 1);
        assert_eq!(registry.count_tickets(None).await.unwrap(), 2);

        assert_eq!(registry.delete_all(None).await.unwrap(), 2);
        assert_eq!(registry.count_tickets(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn encrypted_round_trip() {
        use crate::cipher::{AeadTicketCipher, CipherKeys};

        let keys = CipherKeys::from_slices(&[0x11; 32], &[0x22; 32]).unwrap();
        let registry = TicketRegistry::builder()
            .store(MemoryTicketStore::new())
            .cipher(AeadTicketCipher::new(keys))
            .build()
            .unwrap();

        let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
        let fetched = registry.get_ticket(&tgt.id).await.unwrap().unwrap();
        assert_eq!(fetched.principal_id, "alice");
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_absent() {
        use bytes::Bytes;

        let store = MemoryTicketStore::new();
        let registry = TicketRegistry::builder()
            .store(store.clone())
            .cache_config(CacheConfig::disabled())
            .build()
            .unwrap();

        store
            .save(RegistryRecord {
                id: "TGT-1-garbage".to_owned(),
                kind: TicketKind::TicketGranting,
                principal_id: "alice".to_owned(),
                parent_id: None,
                payload: Bytes::from_static(b"not a ticket"),
                expire_at: None,
            })
            .await
            .unwrap();

        assert!(registry.get_ticket("TGT-1-garbage").await.unwrap().is_none());
    }

    #[test]
    fn config_validation() {
        assert!(RegistryConfig::builder().node_id("").build().is_err());
        assert!(
            RegistryConfig::builder().lock_timeout(Duration::from_millis(1)).build().is_err()
        );
        assert!(RegistryConfig::builder().op_timeout(Duration::from_millis(1)).build().is_err());
        let config = RegistryConfig::builder().node_id("node-a").build().unwrap();
        assert_eq!(config.node_id(), "node-a");
    }

    #[test]
    fn builder_requires_store() {
        assert!(TicketRegistry::builder().build().is_err());
    }
}
