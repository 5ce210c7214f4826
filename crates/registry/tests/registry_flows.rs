//! End-to-end registry flows: grant issuance, service validation, proxy
//! chains, and logout cascades.

#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::{collections::BTreeMap, time::Duration};

use chrono::Utc;
use warden_registry::{
    AeadTicketCipher, CipherKeys, MemoryTicketStore, TicketRegistry, testutil::memory_registry,
};
use warden_tickets::{ExpirationPolicy, Ticket, TicketKind};

#[tokio::test]
async fn login_validate_logout_flow() {
    let registry = memory_registry();

    // Login: a grant is issued for the principal.
    let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
    assert!(tgt.id.starts_with("TGT-"));
    assert_eq!(tgt.count_of_uses, 0);

    // Service access: a service ticket is derived from the grant.
    let st = registry.create_child_ticket(TicketKind::Service, "alice", &tgt.id).await.unwrap();
    assert!(st.id.starts_with("ST-"));
    assert_eq!(st.parent_id.as_deref(), Some(tgt.id.as_str()));

    // Validation consumes the single-use service ticket.
    let validated = registry.touch_ticket(&st.id).await.unwrap().expect("first validation");
    assert_eq!(validated.count_of_uses, 1);
    assert!(registry.get_ticket(&st.id).await.unwrap().is_none(), "single use");

    // Logout: deleting the grant removes everything under it.
    registry.delete_ticket(&tgt.id).await.unwrap();
    assert!(registry.get_ticket(&tgt.id).await.unwrap().is_none());
    assert_eq!(registry.count_tickets(None).await.unwrap(), 0);
}

#[tokio::test]
async fn proxy_chain_cascade() {
    let registry = memory_registry();

    let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
    let pgt =
        registry.create_child_ticket(TicketKind::ProxyGranting, "alice", &tgt.id).await.unwrap();
    let pt = registry.create_child_ticket(TicketKind::Proxy, "alice", &pgt.id).await.unwrap();
    assert!(pgt.id.starts_with("PGT-"));
    assert!(pt.id.starts_with("PT-"));

    // Deleting the root grant removes the whole proxy chain.
    assert_eq!(registry.delete_ticket(&tgt.id).await.unwrap(), 3);
    for id in [&tgt.id, &pgt.id, &pt.id] {
        assert!(registry.get_ticket(id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn deleting_a_middle_node_spares_the_root() {
    let registry = memory_registry();

    let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
    let pgt =
        registry.create_child_ticket(TicketKind::ProxyGranting, "alice", &tgt.id).await.unwrap();
    let pt = registry.create_child_ticket(TicketKind::Proxy, "alice", &pgt.id).await.unwrap();

    assert_eq!(registry.delete_ticket(&pgt.id).await.unwrap(), 2);
    assert!(registry.get_ticket(&pt.id).await.unwrap().is_none());
    assert!(registry.get_ticket(&tgt.id).await.unwrap().is_some());
}

#[tokio::test]
async fn custom_ticket_preserves_attributes() {
    let registry = memory_registry();

    let mut attributes = BTreeMap::new();
    attributes.insert("mail".to_owned(), vec!["alice@example.org".to_owned()]);
    attributes.insert("groups".to_owned(), vec!["staff".to_owned(), "admins".to_owned()]);

    let ticket = Ticket::new(
        "TST-1-custom",
        TicketKind::TransientSession,
        "alice",
        ExpirationPolicy::Absolute { max_lifetime: Duration::from_secs(300) },
        Utc::now(),
    )
    .with_attributes(attributes.clone());

    registry.add_ticket(ticket).await.unwrap();

    let fetched = registry.get_ticket("TST-1-custom").await.unwrap().expect("stored ticket");
    assert_eq!(fetched.attributes, attributes);
    assert!(!fetched.ready, "caller-built tickets keep their readiness flag");
}

#[tokio::test]
async fn principal_enumeration_spans_kinds() {
    let registry = memory_registry();

    let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
    registry.create_child_ticket(TicketKind::Service, "alice", &tgt.id).await.unwrap();
    registry.create_ticket(TicketKind::TicketGranting, "bob").await.unwrap();

    let alice = registry.tickets_for_principal("alice", None).await.unwrap();
    assert_eq!(alice.len(), 2);
    assert!(alice.iter().all(|t| t.principal_id == "alice"));

    let alice_services =
        registry.tickets_for_principal("alice", Some(TicketKind::Service)).await.unwrap();
    assert_eq!(alice_services.len(), 1);

    assert_eq!(registry.count_tickets(Some(TicketKind::TicketGranting)).await.unwrap(), 2);
    assert_eq!(registry.count_tickets(Some(TicketKind::Service)).await.unwrap(), 1);
}

#[tokio::test]
async fn encrypted_registry_round_trips_and_isolates_payloads() {
    let keys = CipherKeys::from_slices(&[0x5A; 32], &[0xA5; 32]).unwrap();
    let store = MemoryTicketStore::new();
    let registry = TicketRegistry::builder()
        .store(store.clone())
        .cipher(AeadTicketCipher::new(keys))
        .build()
        .unwrap();

    let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();
    let fetched = registry.get_ticket(&tgt.id).await.unwrap().expect("fetch");
    assert_eq!(fetched.id, tgt.id);

    // The stored payload is opaque: no principal name in the ciphertext.
    use warden_registry::TicketStore;
    let record = store.load(&tgt.id).await.unwrap().expect("record");
    let haystack = record.payload.as_ref();
    let needle = b"alice";
    let leaked = haystack.windows(needle.len()).any(|w| w == needle);
    assert!(!leaked, "encrypted payload must not contain the principal in the clear");
}

#[tokio::test]
async fn wrong_key_reads_as_absent() {
    let store = MemoryTicketStore::new();

    let writer_keys = CipherKeys::from_slices(&[0x01; 32], &[0x02; 32]).unwrap();
    let writer = TicketRegistry::builder()
        .store(store.clone())
        .cipher(AeadTicketCipher::new(writer_keys))
        .build()
        .unwrap();

    let tgt = writer.create_ticket(TicketKind::TicketGranting, "alice").await.unwrap();

    // A reader with rotated keys treats the record as undecodable, not as
    // an error.
    let reader_keys = CipherKeys::from_slices(&[0x03; 32], &[0x04; 32]).unwrap();
    let reader = TicketRegistry::builder()
        .store(store)
        .cipher(AeadTicketCipher::new(reader_keys))
        .build()
        .unwrap();

    assert!(reader.get_ticket(&tgt.id).await.unwrap().is_none());
}
