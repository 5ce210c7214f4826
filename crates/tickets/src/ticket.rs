//! The immutable [`Ticket`] value.
//!
//! A `Ticket` is one grant of access or one protocol artifact. In the
//! registry it is a *value*: mutation never happens in place. Using a
//! ticket produces a new value via [`Ticket::touched`], and the store
//! adapter persists that new value. This keeps concurrent-safety reasoning
//! local to the registry's lock/save path instead of spreading it across a
//! mutable object graph.
//!
//! # Invariants
//!
//! - `last_used_time >= creation_time`, always.
//! - `count_of_uses` is monotonically non-decreasing.
//! - Deserialized tickets preserve fields this binary does not know about
//!   (see the `unknown` capture map), so a rolling upgrade where one node
//!   runs a newer schema does not drop data on the older nodes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{expiration::ExpirationPolicy, kind::TicketKind};

/// One grant of access or one protocol artifact.
///
/// The registry facade exclusively owns the lifecycle of `Ticket` values;
/// caches hold non-owning copies with their own independent expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Opaque id, unique within the kind namespace; encodes the kind prefix.
    pub id: String,

    /// The ticket kind, always consistent with the id prefix.
    pub kind: TicketKind,

    /// The authenticated identity this ticket is bound to (may be
    /// pseudonymous).
    pub principal_id: String,

    /// Originating grant ticket for derived tickets (service, proxy).
    ///
    /// Parent links form a tree rooted at a grant ticket; deleting the root
    /// cascades over all descendants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// When the ticket was minted (UTC).
    pub creation_time: DateTime<Utc>,

    /// When the ticket was last successfully used (UTC).
    ///
    /// Equal to `creation_time` until the first touch.
    pub last_used_time: DateTime<Utc>,

    /// Number of successful uses.
    pub count_of_uses: u64,

    /// The policy governing this instance's liveness.
    pub expiration_policy: ExpirationPolicy,

    /// Opaque key → multi-value payload for protocol-specific use.
    ///
    /// The registry stores and returns these without interpreting them.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,

    /// Readiness flag for asynchronous artifacts (backchannel requests
    /// flip this once the out-of-band authentication completes).
    #[serde(default)]
    pub ready: bool,

    /// Fields written by a newer schema than this binary knows. Preserved
    /// opaquely across deserialize/serialize round-trips.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl Ticket {
    /// Mints a new ticket. `creation_time` and `last_used_time` are set to
    /// `now`; the use count starts at zero.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: TicketKind,
        principal_id: impl Into<String>,
        expiration_policy: ExpirationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            principal_id: principal_id.into(),
            parent_id: None,
            creation_time: now,
            last_used_time: now,
            count_of_uses: 0,
            expiration_policy,
            attributes: BTreeMap::new(),
            ready: false,
            unknown: BTreeMap::new(),
        }
    }

    /// Links this ticket to its originating grant ticket.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Attaches protocol attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: BTreeMap<String, Vec<String>>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Returns a new value recording one successful use at `now`.
    ///
    /// `last_used_time` never moves backwards: a `now` earlier than the
    /// current value (clock skew between nodes) is clamped.
    #[must_use]
    pub fn touched(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.last_used_time = now.max(self.last_used_time);
        next.count_of_uses = self.count_of_uses.saturating_add(1);
        next
    }

    /// Returns a new value with the readiness flag set.
    #[must_use]
    pub fn marked_ready(&self) -> Self {
        let mut next = self.clone();
        next.ready = true;
        next
    }

    /// Whether this ticket is expired at `now` per its own policy.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_policy.is_expired(self, now)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;

    use super::*;

    fn grant(now: DateTime<Utc>) -> Ticket {
        Ticket::new(
            "TGT-1-abc",
            TicketKind::TicketGranting,
            "alice",
            ExpirationPolicy::grant(Duration::from_secs(8 * 3600), Duration::from_secs(7200)),
            now,
        )
    }

    #[test]
    fn new_ticket_times_are_equal() {
        let now = Utc::now();
        let t = grant(now);
        assert_eq!(t.creation_time, t.last_used_time);
        assert_eq!(t.count_of_uses, 0);
        assert!(!t.ready);
    }

    #[test]
    fn touched_advances_use_count_and_time() {
        let now = Utc::now();
        let t = grant(now);
        let later = now + TimeDelta::minutes(5);

        let used = t.touched(later);
        assert_eq!(used.count_of_uses, 1);
        assert_eq!(used.last_used_time, later);
        // Original value untouched
        assert_eq!(t.count_of_uses, 0);
        assert_eq!(t.last_used_time, now);
    }

    #[test]
    fn touched_clamps_backwards_clock() {
        let now = Utc::now();
        let t = grant(now);
        let earlier = now - TimeDelta::minutes(10);

        let used = t.touched(earlier);
        assert_eq!(used.last_used_time, now, "last_used_time must never regress");
        assert!(used.last_used_time >= used.creation_time);
    }

    #[test]
    fn serde_round_trip_is_field_for_field() {
        let now = Utc::now();
        let mut attrs = BTreeMap::new();
        attrs.insert("mail".to_owned(), vec!["alice@example.org".to_owned()]);
        let t = grant(now).with_parent("TGT-0-root").with_attributes(attrs);

        let bytes = serde_json::to_vec(&t).unwrap();
        let back: Ticket = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let now = Utc::now();
        let mut value = serde_json::to_value(grant(now)).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("issued_by_node".to_owned(), serde_json::json!("node-7"));

        let ticket: Ticket = serde_json::from_value(value).unwrap();
        assert_eq!(ticket.unknown.get("issued_by_node"), Some(&serde_json::json!("node-7")));

        // And the unknown field is written back out.
        let rewritten = serde_json::to_value(&ticket).unwrap();
        assert_eq!(rewritten["issued_by_node"], serde_json::json!("node-7"));
    }
}
