//! Ticket id generation.
//!
//! Ids follow `PREFIX-<sequence>-<random>`: the kind prefix for dispatch, a
//! process-local sequence number for log correlation, and a random
//! alphanumeric suffix carrying the actual entropy. The suffix length
//! (24 chars ≈ 143 bits) makes ids unguessable; the sequence is *not* a
//! security feature.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::{Rng, distr::Alphanumeric};

use crate::kind::TicketKind;

/// Default random-suffix length in characters.
const DEFAULT_SUFFIX_LEN: usize = 24;

/// Generates prefix-dispatched, unguessable ticket ids.
///
/// Cheap to share behind an `Arc`; the internal sequence counter is atomic.
///
/// # Example
///
/// ```
/// use warden_tickets::{TicketIdGenerator, TicketKind};
///
/// let ids = TicketIdGenerator::new();
/// let id = ids.next_id(TicketKind::TicketGranting);
/// assert!(id.starts_with("TGT-"));
/// assert_eq!(TicketKind::from_id(&id), Some(TicketKind::TicketGranting));
/// ```
#[derive(Debug)]
pub struct TicketIdGenerator {
    sequence: AtomicU64,
    suffix_len: usize,
}

impl TicketIdGenerator {
    /// Creates a generator with the default suffix length.
    #[must_use]
    pub fn new() -> Self {
        Self { sequence: AtomicU64::new(1), suffix_len: DEFAULT_SUFFIX_LEN }
    }

    /// Creates a generator with a custom suffix length (minimum 16 chars,
    /// clamped; shorter suffixes would be guessable).
    #[must_use]
    pub fn with_suffix_len(suffix_len: usize) -> Self {
        Self { sequence: AtomicU64::new(1), suffix_len: suffix_len.max(16) }
    }

    /// Mints the next id for `kind`.
    #[must_use]
    pub fn next_id(&self, kind: TicketKind) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let suffix: String =
            rand::rng().sample_iter(&Alphanumeric).take(self.suffix_len).map(char::from).collect();
        format!("{}-{}-{}", kind.prefix(), seq, suffix)
    }
}

impl Default for TicketIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
