//! Redis backends for the Warden ticket registry.
//!
//! This crate provides the production implementations of the
//! `warden-registry` seams over a shared Redis instance:
//!
//! - [`RedisTicketStore`] — persistent ticket records with native TTLs and set-based principal
//!   and parent indexes
//! - [`RedisBus`] — cluster cache invalidation over a pub/sub channel
//! - [`RedisLockRepository`] — cross-node mutation exclusion via `SET NX PX`
//!
//! All three share one key namespace (`warden:*`) and can point at the
//! same instance or separate ones.
//!
//! # Quick Start
//!
//! ```no_run
//! use redis::Client;
//! use warden_registry::TicketRegistry;
//! use warden_registry_redis::{RedisBus, RedisLockRepository, RedisTicketStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::open("redis://127.0.0.1:6379/0")?;
//! let registry = TicketRegistry::builder()
//!     .store(RedisTicketStore::with_client(&client).await?)
//!     .bus(RedisBus::connect(&client).await?)
//!     .locks(RedisLockRepository::connect(&client).await?)
//!     .build()?;
//! registry.start_invalidation_listener();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod bus;
pub mod lock;
pub mod store;

pub use bus::RedisBus;
pub use lock::{LockConfig, RedisLockRepository};
pub use store::RedisTicketStore;
