//! Conformance test suite for [`TicketStore`] implementations.
//!
//! This module provides a set of async test functions that validate whether
//! a [`TicketStore`] implementation correctly satisfies the trait contract.
//! Every backend — in-memory, Redis, or third-party — can run the same
//! suite to ensure interoperability.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with a
//! fresh, empty store:
//!
//! ```no_run
//! use warden_registry::{MemoryTicketStore, conformance};
//!
//! #[tokio::test]
//! async fn load_missing() {
//!     conformance::load_returns_none_for_missing_id(&MemoryTicketStore::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | CRUD | save/load/delete semantics |
//! | Indexes | principal and parent index consistency |
//! | TTL | `expire_at` visibility |
//! | Counting | `count` and `delete_all` accounting |
//! | Concurrent | thread-safety under parallel access |

use std::sync::Arc;

use chrono::{TimeDelta, Utc};

use crate::{
    health::HealthProbe,
    store::TicketStore,
    testutil::{make_child_record, make_record},
};
use warden_tickets::TicketKind;

// ============================================================================
// CRUD — save/load/delete semantics
// ============================================================================

/// `load` on an unknown id returns `Ok(None)`.
pub async fn load_returns_none_for_missing_id<S: TicketStore>(store: &S) {
    let result = store.load("TGT-1-missing").await;
    assert!(result.is_ok(), "load should not error on a missing id: {result:?}");
    assert!(result.expect("checked above").is_none());
}

/// `save` then `load` round-trips the record.
pub async fn save_then_load_round_trips<S: TicketStore>(store: &S) {
    let record = make_record("TGT-1-a", TicketKind::TicketGranting, "alice");
    store.save(record.clone()).await.expect("save should succeed");

    let loaded = store.load("TGT-1-a").await.expect("load should succeed");
    assert_eq!(loaded, Some(record));
}

/// `save` on an existing id overwrites the record.
pub async fn save_overwrites_existing<S: TicketStore>(store: &S) {
    store.save(make_record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.expect("save");
    store
        .save(make_record("TGT-1-a", TicketKind::TicketGranting, "bob"))
        .await
        .expect("overwrite");

    let loaded = store.load("TGT-1-a").await.expect("load").expect("record exists");
    assert_eq!(loaded.principal_id, "bob");
}

/// `delete` on an unknown id reports no removal and does not error.
pub async fn delete_missing_returns_false<S: TicketStore>(store: &S) {
    let removed = store.delete("TGT-1-ghost").await.expect("delete should not error");
    assert!(!removed, "deleting an unknown id should report no removal");
}

/// `delete` removes the record and reports it.
pub async fn delete_removes_record<S: TicketStore>(store: &S) {
    store.save(make_record("ST-1-a", TicketKind::Service, "alice")).await.expect("save");

    assert!(store.delete("ST-1-a").await.expect("delete"));
    assert!(store.load("ST-1-a").await.expect("load").is_none());
    assert!(!store.delete("ST-1-a").await.expect("second delete"), "delete must be idempotent");
}

// ============================================================================
// Indexes — principal and parent index consistency
// ============================================================================

/// The principal index returns exactly the principal's records.
pub async fn principal_index_lists_owned_records<S: TicketStore>(store: &S) {
    store.save(make_record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.expect("save");
    store.save(make_record("ST-1-b", TicketKind::Service, "alice")).await.expect("save");
    store.save(make_record("TGT-2-c", TicketKind::TicketGranting, "bob")).await.expect("save");

    let mut ids: Vec<String> = store
        .load_by_principal("alice", None)
        .await
        .expect("load_by_principal")
        .into_iter()
        .map(|r| r.id)
        .collect();
    ids.sort();
    assert_eq!(ids, ["ST-1-b", "TGT-1-a"]);
    assert!(store.load_by_principal("carol", None).await.expect("unknown principal").is_empty());
}

/// Overwriting a record under a new principal moves the index entry.
pub async fn principal_index_follows_upserts<S: TicketStore>(store: &S) {
    store.save(make_record("ST-1-a", TicketKind::Service, "alice")).await.expect("save");
    store.save(make_record("ST-1-a", TicketKind::Service, "bob")).await.expect("re-save");

    assert!(store.load_by_principal("alice", None).await.expect("alice").is_empty());
    assert_eq!(store.load_by_principal("bob", None).await.expect("bob").len(), 1);
}

/// The principal index restricted to a kind only returns that kind.
pub async fn principal_index_filters_by_kind<S: TicketStore>(store: &S) {
    store.save(make_record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.expect("save");
    store.save(make_record("ST-1-b", TicketKind::Service, "alice")).await.expect("save");

    let services = store
        .load_by_principal("alice", Some(TicketKind::Service))
        .await
        .expect("load_by_principal");
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].id, "ST-1-b");
    assert!(
        store
            .load_by_principal("alice", Some(TicketKind::Proxy))
            .await
            .expect("load_by_principal")
            .is_empty()
    );
}

/// The parent index returns exactly the record's children, and deleting a
/// child removes its index entry.
pub async fn parent_index_lists_children<S: TicketStore>(store: &S) {
    store.save(make_record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.expect("save");
    store
        .save(make_child_record("ST-1-b", TicketKind::Service, "alice", "TGT-1-a"))
        .await
        .expect("save child");
    store
        .save(make_child_record("PGT-1-c", TicketKind::ProxyGranting, "alice", "TGT-1-a"))
        .await
        .expect("save child");

    assert_eq!(store.load_children("TGT-1-a").await.expect("children").len(), 2);

    store.delete("ST-1-b").await.expect("delete child");
    let remaining = store.load_children("TGT-1-a").await.expect("children after delete");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "PGT-1-c");
}

// ============================================================================
// TTL — expire_at visibility
// ============================================================================

/// A record whose `expire_at` has passed is invisible everywhere.
pub async fn expired_record_is_invisible<S: TicketStore>(store: &S) {
    let mut record = make_record("ST-1-a", TicketKind::Service, "alice");
    record.expire_at = Some(Utc::now() - TimeDelta::seconds(5));
    store.save(record).await.expect("save");

    assert!(store.load("ST-1-a").await.expect("load").is_none());
    assert!(store.load_by_principal("alice", None).await.expect("by principal").is_empty());
    assert_eq!(store.count(None).await.expect("count"), 0);
}

/// A record with a future `expire_at` stays visible.
pub async fn unexpired_record_stays_visible<S: TicketStore>(store: &S) {
    let mut record = make_record("ST-1-a", TicketKind::Service, "alice");
    record.expire_at = Some(Utc::now() + TimeDelta::hours(1));
    store.save(record).await.expect("save");

    assert!(store.load("ST-1-a").await.expect("load").is_some());
    assert_eq!(store.count(None).await.expect("count"), 1);
}

// ============================================================================
// Counting — count and delete_all accounting
// ============================================================================

/// `count` restricted to a kind only counts that partition.
pub async fn count_respects_kind_partitions<S: TicketStore>(store: &S) {
    store.save(make_record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.expect("save");
    store.save(make_record("ST-1-b", TicketKind::Service, "alice")).await.expect("save");
    store.save(make_record("ST-2-c", TicketKind::Service, "bob")).await.expect("save");

    assert_eq!(store.count(None).await.expect("count all"), 3);
    assert_eq!(store.count(Some(TicketKind::Service)).await.expect("count service"), 2);
    assert_eq!(store.count(Some(TicketKind::Proxy)).await.expect("count proxy"), 0);
}

/// `delete_all` removes everything and reports how many records it removed.
pub async fn delete_all_reports_removed<S: TicketStore>(store: &S) {
    store.save(make_record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.expect("save");
    store
        .save(make_child_record("ST-1-b", TicketKind::Service, "alice", "TGT-1-a"))
        .await
        .expect("save");

    assert_eq!(store.delete_all(None).await.expect("delete_all"), 2);
    assert_eq!(store.count(None).await.expect("count"), 0);
    assert!(store.load_by_principal("alice", None).await.expect("by principal").is_empty());
    assert!(store.load_children("TGT-1-a").await.expect("children").is_empty());
}

/// `delete_all` restricted to a kind leaves the other partitions alone and
/// keeps the indexes consistent.
pub async fn delete_all_respects_kind_scope<S: TicketStore>(store: &S) {
    store.save(make_record("TGT-1-a", TicketKind::TicketGranting, "alice")).await.expect("save");
    store
        .save(make_child_record("ST-1-b", TicketKind::Service, "alice", "TGT-1-a"))
        .await
        .expect("save");
    store.save(make_record("ST-2-c", TicketKind::Service, "bob")).await.expect("save");

    assert_eq!(store.delete_all(Some(TicketKind::Service)).await.expect("delete_all"), 2);
    assert_eq!(store.count(None).await.expect("count"), 1);
    assert!(store.load("TGT-1-a").await.expect("load").is_some());
    assert!(store.load_children("TGT-1-a").await.expect("children").is_empty());
    assert!(store.load_by_principal("bob", None).await.expect("by principal").is_empty());
}

// ============================================================================
// Concurrent — thread-safety under parallel access
// ============================================================================

/// Parallel saves of distinct ids all land, and the indexes agree.
pub async fn concurrent_saves_all_land<S: TicketStore + 'static>(store: Arc<S>) {
    let mut handles = Vec::new();
    for i in 0..32 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let id = format!("ST-{i}-c");
            store.save(make_record(&id, TicketKind::Service, "alice")).await.expect("save");
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    assert_eq!(store.count(Some(TicketKind::Service)).await.expect("count"), 32);
    assert_eq!(store.load_by_principal("alice", None).await.expect("by principal").len(), 32);
}

/// The readiness probe succeeds on an idle store.
pub async fn health_check_is_healthy<S: TicketStore>(store: &S) {
    let status = store.health_check(HealthProbe::Readiness).await.expect("health check");
    assert!(status.is_healthy(), "idle store should be healthy: {status}");
}
