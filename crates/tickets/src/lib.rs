//! Ticket domain model for the Warden SSO server.
//!
//! This crate defines the pure, I/O-free types that the ticket registry
//! engine (`warden-registry`) operates on:
//!
//! - [`TicketKind`] — the fixed set of ticket kinds and their id prefixes
//! - [`Ticket`] — an immutable, copy-on-write credential value
//! - [`TicketCatalog`] / [`TicketDefinition`] — per-kind storage metadata
//! - [`ExpirationPolicy`] — composable liveness evaluation
//! - [`TicketIdGenerator`] — opaque, prefix-dispatched ticket ids
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Protocol / Webflow Layer                   │
//! │            (out of scope; consumes the facade)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    warden-registry                          │
//! │   TicketRegistry facade, cache, stores, bus, locks          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     warden-tickets                          │
//! │   Ticket │ TicketKind │ TicketCatalog │ ExpirationPolicy    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is `Send + Sync` and safe for concurrent read from any
//! task without synchronization; mutation happens only by constructing new
//! values (see [`Ticket::touched`]).

#![deny(unsafe_code)]

pub mod catalog;
pub mod expiration;
pub mod id;
pub mod kind;
pub mod ticket;

pub use catalog::{TicketCatalog, TicketDefinition, UnknownTicketKind};
pub use expiration::ExpirationPolicy;
pub use id::TicketIdGenerator;
pub use kind::TicketKind;
pub use ticket::Ticket;
