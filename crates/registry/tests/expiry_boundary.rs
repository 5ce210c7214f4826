//! Expiration policy behavior at its boundaries, observed through the
//! registry: lazy deletion, idle-timeout refresh, and use exhaustion.

#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::time::Duration;

use chrono::Utc;
use warden_registry::testutil::memory_registry;
use warden_tickets::{ExpirationPolicy, Ticket, TicketKind};

fn ticket(id: &str, policy: ExpirationPolicy) -> Ticket {
    Ticket::new(id, TicketKind::TransientSession, "alice", policy, Utc::now())
}

#[tokio::test]
async fn absolute_lifetime_expires_and_cascades() {
    let registry = memory_registry();
    let policy = ExpirationPolicy::Absolute { max_lifetime: Duration::from_millis(300) };
    let parent = registry.add_ticket(ticket("TST-1-parent", policy.clone())).await.unwrap();
    registry
        .add_ticket(ticket("TST-2-child", ExpirationPolicy::Never).with_parent(&parent.id))
        .await
        .unwrap();

    assert!(registry.get_ticket("TST-1-parent").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(500)).await;

    // The expired parent is lazily deleted on the read path, and the
    // cascade takes its child even though the child's own policy is
    // unbounded.
    assert!(registry.get_ticket("TST-1-parent").await.unwrap().is_none());
    assert!(registry.get_ticket("TST-2-child").await.unwrap().is_none());
    assert_eq!(registry.count_tickets(None).await.unwrap(), 0);
}

#[tokio::test]
async fn idle_timeout_is_refreshed_by_touches() {
    let registry = memory_registry();
    let policy = ExpirationPolicy::Idle { idle_timeout: Duration::from_millis(400) };
    registry.add_ticket(ticket("TST-1-idle", policy)).await.unwrap();

    // Touch within the idle window repeatedly; total elapsed exceeds one
    // window but the ticket stays alive.
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.touch_ticket("TST-1-idle").await.unwrap().is_some());
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(registry.get_ticket("TST-1-idle").await.unwrap().is_none());
}

#[tokio::test]
async fn use_count_exhausts_exactly_at_max() {
    let registry = memory_registry();
    let policy = ExpirationPolicy::UseCount { max_uses: 2 };
    registry.add_ticket(ticket("TST-1-uses", policy)).await.unwrap();

    assert_eq!(registry.touch_ticket("TST-1-uses").await.unwrap().unwrap().count_of_uses, 1);
    assert_eq!(registry.touch_ticket("TST-1-uses").await.unwrap().unwrap().count_of_uses, 2);
    // Exhausted now; the next use is refused and the ticket removed.
    assert!(registry.touch_ticket("TST-1-uses").await.unwrap().is_none());
    assert!(registry.get_ticket("TST-1-uses").await.unwrap().is_none());
}

#[tokio::test]
async fn any_of_expires_at_the_earliest_clause() {
    let registry = memory_registry();
    let policy = ExpirationPolicy::AnyOf {
        members: vec![
            ExpirationPolicy::Absolute { max_lifetime: Duration::from_secs(3600) },
            ExpirationPolicy::UseCount { max_uses: 1 },
        ],
    };
    registry.add_ticket(ticket("TST-1-any", policy)).await.unwrap();

    // Lifetime is nowhere near over, but one use exhausts the ticket.
    assert!(registry.touch_ticket("TST-1-any").await.unwrap().is_some());
    assert!(registry.get_ticket("TST-1-any").await.unwrap().is_none());
}

#[tokio::test]
async fn all_of_requires_every_clause() {
    let registry = memory_registry();
    let policy = ExpirationPolicy::AllOf {
        members: vec![
            ExpirationPolicy::Absolute { max_lifetime: Duration::from_millis(200) },
            ExpirationPolicy::UseCount { max_uses: 1 },
        ],
    };
    registry.add_ticket(ticket("TST-1-all", policy)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    // Lifetime clause fired, use clause has not; still alive.
    assert!(registry.get_ticket("TST-1-all").await.unwrap().is_some());

    assert!(registry.touch_ticket("TST-1-all").await.unwrap().is_some());
    // Now both clauses hold.
    assert!(registry.get_ticket("TST-1-all").await.unwrap().is_none());
}

#[tokio::test]
async fn never_policy_outlives_the_others() {
    let registry = memory_registry();
    registry.add_ticket(ticket("TST-1-never", ExpirationPolicy::Never)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    for _ in 0..5 {
        assert!(registry.touch_ticket("TST-1-never").await.unwrap().is_some());
    }
    assert!(registry.get_ticket("TST-1-never").await.unwrap().is_some());
}
