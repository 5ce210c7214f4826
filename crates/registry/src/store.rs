//! Distributed ticket store trait definition.
//!
//! This module defines the [`TicketStore`] trait, the persistence seam between
//! the registry facade and a concrete backend. All implementations
//! ([`MemoryTicketStore`](crate::MemoryTicketStore), the Redis store in
//! `warden-registry-redis`, etc.) implement this trait.
//!
//! # Design
//!
//! - **Records, not tickets**: the store deals exclusively in opaque [`RegistryRecord`]s.
//!   Serialization and encryption happen above this layer, so a backend never
//!   sees ticket plaintext.
//! - **Async by default**: all operations are async for non-blocking I/O.
//! - **Secondary indexes**: lookups by principal and by parent must stay consistent with
//!   the primary record under concurrent writers. Backends maintain them
//!   atomically with the record itself.
//! - **TTL is a hint**: a backend may drop a record any time after `expire_at`; the registry
//!   re-checks the real expiration policy on every fetch regardless.

use async_trait::async_trait;

use crate::{
    codec::RegistryRecord,
    error::RegistryResult,
    health::{HealthProbe, HealthStatus},
};
use warden_tickets::TicketKind;

/// Abstract distributed store for ticket records.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations. Records are partitioned by ticket kind, so
/// per-kind operations like [`count`](TicketStore::count) never scan
/// unrelated partitions.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`save`](TicketStore::save) | Upsert a record and its secondary index entries |
/// | [`load`](TicketStore::load) | Retrieve a record by ticket id |
/// | [`load_by_principal`](TicketStore::load_by_principal) | Records owned by a principal |
/// | [`load_children`](TicketStore::load_children) | Records whose parent is the given id |
/// | [`delete`](TicketStore::delete) | Remove a record and its index entries |
/// | [`delete_all`](TicketStore::delete_all) | Remove every record, optionally by kind |
/// | [`count`](TicketStore::count) | Count live records, optionally by kind |
/// | [`health_check`](TicketStore::health_check) | Verify backend availability |
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Upserts a record.
    ///
    /// Overwrites any existing record with the same id and updates the
    /// principal and parent indexes atomically with the record. When the
    /// record carries an `expire_at`, the backend may apply it as a native
    /// TTL.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn save(&self, record: RegistryRecord) -> RegistryResult<()>;

    /// Retrieves a record by ticket id.
    ///
    /// Returns `Ok(None)` when the id is unknown or the record's TTL has
    /// elapsed.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn load(&self, ticket_id: &str) -> RegistryResult<Option<RegistryRecord>>;

    /// Retrieves every live record owned by `principal_id`, restricted to
    /// one kind when `kind` is given.
    ///
    /// Order is unspecified. Expired records are excluded.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn load_by_principal(
        &self,
        principal_id: &str,
        kind: Option<TicketKind>,
    ) -> RegistryResult<Vec<RegistryRecord>>;

    /// Retrieves every live record whose parent is `parent_id`.
    ///
    /// Used by the registry's cascade delete. Expired records are excluded.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn load_children(&self, parent_id: &str) -> RegistryResult<Vec<RegistryRecord>>;

    /// Deletes a record and its index entries.
    ///
    /// Returns `true` if a live record was removed, `false` if the id was
    /// unknown (idempotent).
    #[must_use = "store operations may fail and errors must be handled"]
    async fn delete(&self, ticket_id: &str) -> RegistryResult<bool>;

    /// Deletes every record, or every record of one kind when `kind` is
    /// given.
    ///
    /// Returns the number of live records removed.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn delete_all(&self, kind: Option<TicketKind>) -> RegistryResult<u64>;

    /// Counts live records, restricted to one kind when `kind` is given.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn count(&self, kind: Option<TicketKind>) -> RegistryResult<u64>;

    /// Checks store health for the given [`HealthProbe`] type.
    ///
    /// - `Ok(HealthStatus::Healthy(_))` — probe passed
    /// - `Ok(HealthStatus::Degraded(_, reason))` — probe passed with caveats
    /// - `Ok(HealthStatus::Unhealthy(_, reason))` — probe failed
    /// - `Err(...)` — the health check itself failed (e.g., timeout)
    #[must_use = "health check results indicate store availability and must be inspected"]
    async fn health_check(&self, probe: HealthProbe) -> RegistryResult<HealthStatus>;
}
