//! In-memory ticket store implementation.
//!
//! This module provides [`MemoryTicketStore`], an in-memory implementation of
//! [`TicketStore`] suitable for testing, development, and single-node
//! deployments.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Partitioned**: Records live in a per-kind [`BTreeMap`] partition
//! - **Indexed**: Principal and parent indexes are updated in the same critical section as the
//!   record, so readers never observe an index entry without its record
//! - **TTL support**: Background task sweeps expired records
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - No replication; a multi-node deployment needs the Redis store
//! - The TTL sweep runs every second, so expiry-based removal is not precise
//!   (the registry re-checks the expiration policy on fetch regardless)

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};
use tracing::debug;
use warden_tickets::TicketKind;

use crate::{
    codec::RegistryRecord,
    error::RegistryResult,
    health::{HealthMetadata, HealthProbe, HealthStatus},
    store::TicketStore,
};

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the sweeper task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Sending is a best-effort signal; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// All store state behind one lock, so a record and its index entries are
/// always mutated in a single critical section.
#[derive(Default)]
struct Inner {
    partitions: BTreeMap<TicketKind, BTreeMap<String, RegistryRecord>>,
    by_principal: BTreeMap<String, BTreeSet<String>>,
    by_parent: BTreeMap<String, BTreeSet<String>>,
}

impl Inner {
    fn insert(&mut self, record: RegistryRecord) {
        // An upsert may change principal or parent; drop stale index entries
        // before inserting the new ones.
        self.remove(&record.id);

        self.by_principal.entry(record.principal_id.clone()).or_default().insert(record.id.clone());
        if let Some(parent) = &record.parent_id {
            self.by_parent.entry(parent.clone()).or_default().insert(record.id.clone());
        }
        self.partitions.entry(record.kind).or_default().insert(record.id.clone(), record);
    }

    fn remove(&mut self, ticket_id: &str) -> Option<RegistryRecord> {
        let record =
            self.partitions.values_mut().find_map(|partition| partition.remove(ticket_id))?;

        if let Some(ids) = self.by_principal.get_mut(&record.principal_id) {
            ids.remove(ticket_id);
            if ids.is_empty() {
                self.by_principal.remove(&record.principal_id);
            }
        }
        if let Some(parent) = &record.parent_id
            && let Some(ids) = self.by_parent.get_mut(parent)
        {
            ids.remove(ticket_id);
            if ids.is_empty() {
                self.by_parent.remove(parent);
            }
        }
        Some(record)
    }

    fn get(&self, ticket_id: &str) -> Option<&RegistryRecord> {
        self.partitions.values().find_map(|partition| partition.get(ticket_id))
    }
}

fn is_live(record: &RegistryRecord, now: DateTime<Utc>) -> bool {
    record.expire_at.is_none_or(|at| at > now)
}

/// In-memory ticket store with per-kind partitions and secondary indexes.
///
/// # Cloning
///
/// `MemoryTicketStore` is cheaply cloneable via [`Arc`]. All clones share
/// the same underlying state.
///
/// # Shutdown
///
/// The background TTL sweeper stops automatically when all clones of the
/// store are dropped (via the internal `ShutdownGuard`). You can also call
/// [`shutdown`](Self::shutdown) to stop it explicitly.
#[derive(Clone)]
pub struct MemoryTicketStore {
    inner: Arc<RwLock<Inner>>,
    /// Shared ownership of the shutdown sender. When the last clone drops,
    /// the sender is dropped, which closes the watch channel and signals
    /// the sweeper to exit.
    shutdown_guard: Arc<ShutdownGuard>,
}

impl MemoryTicketStore {
    /// Creates a new in-memory ticket store.
    ///
    /// Spawns a background task that sweeps records whose `expire_at` has
    /// passed. The task stops automatically when all clones are dropped.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let store = Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        let sweeper = store.clone();
        tokio::spawn(async move {
            sweeper.sweep_expired(shutdown_rx).await;
        });

        store
    }

    /// Background task that removes records whose TTL has elapsed.
    ///
    /// Runs every second. Exits when the shutdown signal is received.
    async fn sweep_expired(&self, mut shutdown_rx: watch::Receiver<()>) {
        loop {
            select! {
                _ = sleep(Duration::from_secs(1)) => {}
                _ = shutdown_rx.changed() => {
                    return;
                }
            }

            let now = Utc::now();
            let expired: Vec<String> = {
                let inner = self.inner.read();
                inner
                    .partitions
                    .values()
                    .flat_map(BTreeMap::values)
                    .filter(|record| !is_live(record, now))
                    .map(|record| record.id.clone())
                    .collect()
            };

            if !expired.is_empty() {
                debug!(count = expired.len(), "sweeping expired ticket records");
                let mut inner = self.inner.write();
                for id in expired {
                    inner.remove(&id);
                }
            }
        }
    }

    /// Explicitly signals the background sweeper to stop.
    ///
    /// Optional; the sweeper also stops when all clones are dropped. Use
    /// this when you need deterministic shutdown timing (e.g., in tests).
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }
}

impl Default for MemoryTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn save(&self, record: RegistryRecord) -> RegistryResult<()> {
        let mut inner = self.inner.write();
        inner.insert(record);
        Ok(())
    }

    async fn load(&self, ticket_id: &str) -> RegistryResult<Option<RegistryRecord>> {
        let now = Utc::now();
        let inner = self.inner.read();
        Ok(inner.get(ticket_id).filter(|record| is_live(record, now)).cloned())
    }

    async fn load_by_principal(
        &self,
        principal_id: &str,
        kind: Option<TicketKind>,
    ) -> RegistryResult<Vec<RegistryRecord>> {
        let now = Utc::now();
        let inner = self.inner.read();
        let Some(ids) = inner.by_principal.get(principal_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| inner.get(id))
            .filter(|record| is_live(record, now))
            .filter(|record| kind.is_none_or(|kind| record.kind == kind))
            .cloned()
            .collect())
    }

    async fn load_children(&self, parent_id: &str) -> RegistryResult<Vec<RegistryRecord>> {
        let now = Utc::now();
        let inner = self.inner.read();
        let Some(ids) = inner.by_parent.get(parent_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| inner.get(id))
            .filter(|record| is_live(record, now))
            .cloned()
            .collect())
    }

    async fn delete(&self, ticket_id: &str) -> RegistryResult<bool> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        Ok(inner.remove(ticket_id).is_some_and(|record| is_live(&record, now)))
    }

    async fn delete_all(&self, kind: Option<TicketKind>) -> RegistryResult<u64> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        match kind {
            Some(kind) => {
                let ids: Vec<String> = inner
                    .partitions
                    .get(&kind)
                    .map(|partition| partition.keys().cloned().collect())
                    .unwrap_or_default();
                let mut removed = 0;
                for id in ids {
                    if inner.remove(&id).is_some_and(|record| is_live(&record, now)) {
                        removed += 1;
                    }
                }
                Ok(removed)
            },
            None => {
                let removed = inner
                    .partitions
                    .values()
                    .flat_map(BTreeMap::values)
                    .filter(|record| is_live(record, now))
                    .count() as u64;
                inner.partitions.clear();
                inner.by_principal.clear();
                inner.by_parent.clear();
                Ok(removed)
            },
        }
    }

    async fn count(&self, kind: Option<TicketKind>) -> RegistryResult<u64> {
        let now = Utc::now();
        let inner = self.inner.read();
        let count = match kind {
            Some(kind) => inner
                .partitions
                .get(&kind)
                .map_or(0, |p| p.values().filter(|r| is_live(r, now)).count()),
            None => inner
                .partitions
                .values()
                .flat_map(BTreeMap::values)
                .filter(|r| is_live(r, now))
                .count(),
        };
        Ok(count as u64)
    }

    async fn health_check(&self, _probe: HealthProbe) -> RegistryResult<HealthStatus> {
        // Acquiring the read lock verifies we are not deadlocked.
        let started = Instant::now();
        let ticket_count = {
            let inner = self.inner.read();
            inner.partitions.values().map(BTreeMap::len).sum::<usize>()
        };
        let metadata = HealthMetadata::new(started.elapsed(), "memory")
            .with_detail("ticket_count", ticket_count.to_string());
        Ok(HealthStatus::healthy(metadata))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use bytes::Bytes;
    use chrono::TimeDelta;

    use super::*;

    fn record(id: &str, kind: TicketKind, principal: &str) -> RegistryRecord {
        RegistryRecord {
            id: id.to_owned(),
            kind,
            principal_id: principal.to_owned(),
            parent_id: None,
            payload: Bytes::from_static(b"payload"),
            expire_at: None,
        }
    }

    fn child(id: &str, kind: TicketKind, principal: &str, parent: &str) -> RegistryRecord {
        RegistryRecord { parent_id: Some(parent.to_owned()), ..record(id, kind, principal) }
    }

    #[tokio::test]
    async fn save_and_load() {
        let store = MemoryTicketStore::new();
        store.save(record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.unwrap();

        let loaded = store.load("TGT-1-a").await.unwrap().unwrap();
        assert_eq!(loaded.principal_id, "alice");
        assert!(store.load("TGT-2-b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryTicketStore::new();
        store.save(record("ST-1-a", TicketKind::Service, "alice")).await.unwrap();

        assert!(store.delete("ST-1-a").await.unwrap());
        assert!(!store.delete("ST-1-a").await.unwrap());
        assert!(store.load("ST-1-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn principal_index_tracks_upserts() {
        let store = MemoryTicketStore::new();
        store.save(record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.unwrap();
        store.save(record("ST-1-b", TicketKind::Service, "alice")).await.unwrap();
        store.save(record("TGT-2-c", TicketKind::TicketGranting, "bob")).await.unwrap();

        let alice = store.load_by_principal("alice", None).await.unwrap();
        assert_eq!(alice.len(), 2);
        let alice_grants =
            store.load_by_principal("alice", Some(TicketKind::TicketGranting)).await.unwrap();
        assert_eq!(alice_grants.len(), 1);

        // Re-saving under a different principal moves the index entry.
        store.save(record("ST-1-b", TicketKind::Service, "bob")).await.unwrap();
        assert_eq!(store.load_by_principal("alice", None).await.unwrap().len(), 1);
        assert_eq!(store.load_by_principal("bob", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn parent_index_tracks_children() {
        let store = MemoryTicketStore::new();
        store.save(record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.unwrap();
        store.save(child("ST-1-b", TicketKind::Service, "alice", "TGT-1-a")).await.unwrap();
        store.save(child("PGT-1-c", TicketKind::ProxyGranting, "alice", "TGT-1-a")).await.unwrap();

        let children = store.load_children("TGT-1-a").await.unwrap();
        assert_eq!(children.len(), 2);

        store.delete("ST-1-b").await.unwrap();
        assert_eq!(store.load_children("TGT-1-a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expired_records_are_invisible() {
        let store = MemoryTicketStore::new();
        let mut expired = record("ST-1-a", TicketKind::Service, "alice");
        expired.expire_at = Some(Utc::now() - TimeDelta::seconds(5));
        store.save(expired).await.unwrap();

        assert!(store.load("ST-1-a").await.unwrap().is_none());
        assert!(store.load_by_principal("alice", None).await.unwrap().is_empty());
        assert_eq!(store.count(None).await.unwrap(), 0);
        // Deleting an expired record reports no live record removed.
        assert!(!store.delete("ST-1-a").await.unwrap());
    }

    #[tokio::test]
    async fn sweeper_removes_expired_records() {
        let store = MemoryTicketStore::new();
        let mut expired = record("ST-1-a", TicketKind::Service, "alice");
        expired.expire_at = Some(Utc::now() + TimeDelta::milliseconds(100));
        store.save(expired).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let inner = store.inner.read();
        assert!(inner.get("ST-1-a").is_none(), "sweeper should have removed the record");
        assert!(inner.by_principal.is_empty());
    }

    #[tokio::test]
    async fn count_by_kind() {
        let store = MemoryTicketStore::new();
        store.save(record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.unwrap();
        store.save(record("ST-1-b", TicketKind::Service, "alice")).await.unwrap();
        store.save(record("ST-2-c", TicketKind::Service, "bob")).await.unwrap();

        assert_eq!(store.count(None).await.unwrap(), 3);
        assert_eq!(store.count(Some(TicketKind::Service)).await.unwrap(), 2);
        assert_eq!(store.count(Some(TicketKind::Proxy)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_all_clears_everything() {
        let store = MemoryTicketStore::new();
        store.save(record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.unwrap();
        store.save(child("ST-1-b", TicketKind::Service, "alice", "TGT-1-a")).await.unwrap();

        assert_eq!(store.delete_all(None).await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 0);
        assert!(store.load_children("TGT-1-a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_all_scoped_to_one_kind() {
        let store = MemoryTicketStore::new();
        store.save(record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.unwrap();
        store.save(record("ST-1-b", TicketKind::Service, "alice")).await.unwrap();
        store.save(record("ST-2-c", TicketKind::Service, "bob")).await.unwrap();

        assert_eq!(store.delete_all(Some(TicketKind::Service)).await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert!(store.load("TGT-1-a").await.unwrap().is_some());
        assert!(store.load_by_principal("bob", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let store1 = MemoryTicketStore::new();
        let store2 = store1.clone();

        store1.save(record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.unwrap();
        assert!(store2.load("TGT-1-a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn health_check_reports_counts() {
        let store = MemoryTicketStore::new();
        store.save(record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.unwrap();

        let status = store.health_check(HealthProbe::Readiness).await.unwrap();
        assert!(status.is_healthy());
        assert_eq!(status.metadata().details.get("ticket_count"), Some(&"1".to_owned()));
    }

    #[tokio::test]
    async fn shutdown_stops_sweeper() {
        let store = MemoryTicketStore::new();
        let mut expired = record("ST-1-a", TicketKind::Service, "alice");
        expired.expire_at = Some(Utc::now() + TimeDelta::milliseconds(100));
        store.save(expired).await.unwrap();

        store.shutdown();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // The record is expired but still present, the sweeper was stopped.
        let inner = store.inner.read();
        assert!(inner.get("ST-1-a").is_some());
    }
}
