//! Distributed ticket registry for SSO protocol servers.
//!
//! This crate provides the [`TicketRegistry`] facade and the component
//! traits it composes: the [`TicketStore`] persistence seam, the
//! [`TicketCipher`] payload protection seam, the [`InvalidationBus`]
//! cluster cache coherence seam, and the [`LockRepository`] mutation
//! exclusion seam.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Protocol Layer                           │
//! │        (login, ticket validation, logout handlers)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    TicketRegistry                           │
//! │   catalog │ cipher │ codec │ cache │ locks │ bus            │
//! │     (policy evaluation, write-through, cascade delete)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     TicketStore trait                       │
//! │   (save, load, load_by_principal, load_children, delete)    │
//! ├──────────────────┬──────────────────────────────────────────┤
//! │ MemoryTicketStore│        RedisTicketStore                  │
//! │  (testing, dev)  │   (production, in warden-registry-redis) │
//! └──────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use warden_registry::{MemoryTicketStore, TicketRegistry};
//! use warden_tickets::TicketKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry =
//!         TicketRegistry::builder().store(MemoryTicketStore::new()).build()?;
//!
//!     // Issue a grant, then a service ticket under it.
//!     let tgt = registry.create_ticket(TicketKind::TicketGranting, "alice").await?;
//!     let st = registry
//!         .create_child_ticket(TicketKind::Service, "alice", &tgt.id)
//!         .await?;
//!
//!     // Validating the service ticket consumes it (single use).
//!     let validated = registry.touch_ticket(&st.id).await?;
//!     assert!(validated.is_some());
//!
//!     // Logout cascades from the grant to everything issued under it.
//!     registry.delete_ticket(&tgt.id).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Liveness
//!
//! Expiration is decided only by each ticket's expiration policy,
//! evaluated on every fetch. Store TTLs and cache TTLs are generous
//! hints that bound resource usage; they never make a ticket live
//! longer or shorter than its policy says.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` and `conformance` modules with shared test helpers
//!   and the [`TicketStore`] conformance suite. Enable this in `[dev-dependencies]` for
//!   integration tests.

#![deny(unsafe_code)]

pub mod bus;
pub mod cache;
pub mod cipher;
pub mod codec;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod conformance;
pub mod error;
pub mod health;
pub mod lock;
pub mod memory;
pub mod registry;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use bus::{InvalidationBus, LocalBus, TicketEvent, TicketOperation};
pub use cache::{CacheConfig, TicketCache};
pub use cipher::{AeadTicketCipher, CipherKeys, NoOpTicketCipher, TicketCipher};
pub use codec::{RegistryRecord, TicketCodec};
pub use error::{BoxError, ConfigError, RegistryError, RegistryResult};
pub use health::{HealthMetadata, HealthProbe, HealthStatus};
pub use lock::{LockGuard, LockRepository, MemoryLockRepository, NoOpLockRepository};
pub use memory::MemoryTicketStore;
pub use registry::{RegistryBuilder, RegistryConfig, TicketRegistry};
pub use store::TicketStore;
pub use zeroize::Zeroizing;
