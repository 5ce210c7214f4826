//! Shared test utilities for ticket store and registry testing.
//!
//! This module provides common helpers for building test records, tickets,
//! and registries. It is feature-gated behind `testutil` to prevent leaking
//! into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! warden-registry = { path = "../registry", features = ["testutil"] }
//! ```

use bytes::Bytes;
use chrono::Utc;
use warden_tickets::{ExpirationPolicy, Ticket, TicketKind};

use crate::{
    codec::RegistryRecord,
    memory::MemoryTicketStore,
    registry::TicketRegistry,
};

/// Creates a never-expiring record with a fixed payload and no parent.
#[must_use]
pub fn make_record(id: &str, kind: TicketKind, principal_id: &str) -> RegistryRecord {
    RegistryRecord {
        id: id.to_owned(),
        kind,
        principal_id: principal_id.to_owned(),
        parent_id: None,
        payload: Bytes::from_static(b"test-payload"),
        expire_at: None,
    }
}

/// Creates a record parented to `parent_id`.
#[must_use]
pub fn make_child_record(
    id: &str,
    kind: TicketKind,
    principal_id: &str,
    parent_id: &str,
) -> RegistryRecord {
    RegistryRecord { parent_id: Some(parent_id.to_owned()), ..make_record(id, kind, principal_id) }
}

/// Creates a never-expiring ticket timestamped now.
#[must_use]
pub fn make_ticket(id: &str, kind: TicketKind, principal_id: &str) -> Ticket {
    Ticket::new(id, kind, principal_id, ExpirationPolicy::Never, Utc::now())
}

/// A registry over a fresh in-memory store, with the standard catalog,
/// no cipher, an in-process bus, and in-process locks.
///
/// # Panics
///
/// Panics if the default configuration is rejected (should not happen).
#[must_use]
pub fn memory_registry() -> TicketRegistry {
    TicketRegistry::builder()
        .store(MemoryTicketStore::new())
        .build()
        .expect("default registry configuration should build")
}

/// Assert that a [`RegistryResult`](crate::error::RegistryResult) is an
/// `Err` matching the given [`RegistryError`](crate::error::RegistryError)
/// variant pattern.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use warden_registry::{assert_registry_error, error::{RegistryError, RegistryResult}};
///
/// let result: RegistryResult<()> = Err(RegistryError::lock_timeout("TGT-1-a"));
/// assert_registry_error!(result, RegistryError::LockTimeout { .. });
/// ```
#[macro_export]
macro_rules! assert_registry_error {
    ($result:expr, $pattern:pat) => {
        match &$result {
            Err($pattern) => {},
            other => panic!(
                "expected {}, got {:?}",
                stringify!($pattern),
                other.as_ref().map(|_| "Ok(..)")
            ),
        }
    };
}
