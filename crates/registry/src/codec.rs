//! Ticket serialization and the storage record form.
//!
//! [`TicketCodec`] converts an in-memory [`Ticket`] to and from its
//! transportable JSON representation. Deserialization is defensive:
//!
//! - unknown fields are preserved opaquely (see `Ticket::unknown`), so a
//!   node running an older schema never drops data written by a newer one;
//! - any decode failure is reported as [`RegistryError::CorruptTicket`]
//!   and never panics the calling request — the facade treats a corrupt
//!   record as "not found".
//!
//! [`RegistryRecord`] is the wire/storage form a store adapter persists:
//! the routing fields in the clear (id, kind, principal, parent) and the
//! full ticket as an encrypted payload. `expire_at` is a store-level TTL
//! *hint* for opportunistic physical deletion; the authoritative liveness
//! decision is always re-evaluated from the decrypted ticket on read.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_tickets::{Ticket, TicketKind};

use crate::error::{RegistryError, RegistryResult};

/// Converts tickets to/from their transportable representation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TicketCodec;

impl TicketCodec {
    /// Serializes a ticket to bytes.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Internal`] when serialization fails (attribute
    /// values that JSON cannot represent).
    pub fn serialize(&self, ticket: &Ticket) -> RegistryResult<Vec<u8>> {
        serde_json::to_vec(ticket)
            .map_err(|e| RegistryError::internal(format!("ticket serialization failed: {e}")))
    }

    /// Deserializes a ticket, verifying it against the expected kind.
    ///
    /// `ticket_id` is used for error context only.
    ///
    /// # Errors
    ///
    /// [`RegistryError::CorruptTicket`] on malformed bytes or when the
    /// decoded ticket's kind or id disagrees with the record it came from.
    pub fn deserialize(
        &self,
        bytes: &[u8],
        ticket_id: &str,
        expected_kind: Option<TicketKind>,
    ) -> RegistryResult<Ticket> {
        let ticket: Ticket = serde_json::from_slice(bytes)
            .map_err(|e| RegistryError::corrupt_with_source(ticket_id, "malformed payload", e))?;

        if ticket.id != ticket_id {
            return Err(RegistryError::corrupt(ticket_id, "payload id disagrees with record id"));
        }
        if let Some(kind) = expected_kind {
            if ticket.kind != kind {
                return Err(RegistryError::corrupt(
                    ticket_id,
                    format!("payload kind {} disagrees with record kind {kind}", ticket.kind),
                ));
            }
        }
        Ok(ticket)
    }
}

/// The persisted form of a ticket.
///
/// Routing fields stay in the clear so stores can maintain secondary
/// indexes without decrypting; everything else rides in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    /// Ticket id (primary key within the kind's partition).
    pub id: String,
    /// Ticket kind, used to select the storage partition.
    pub kind: TicketKind,
    /// Principal the ticket is bound to (secondary index key).
    pub principal_id: String,
    /// Originating grant ticket, when derived (secondary index key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Encrypted, signed, serialized ticket.
    #[serde(with = "base64_bytes")]
    pub payload: Bytes,
    /// Store-level TTL hint; `None` for unbounded policies.
    ///
    /// Always at least as late as the policy-computed expiration — stores
    /// may physically drop the record after this point, but liveness is
    /// never decided from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
}

impl RegistryRecord {
    /// Assembles the record for a ticket with an already-encrypted payload.
    ///
    /// `ttl_margin` (seconds) is added to the policy's lifetime hint to
    /// produce `expire_at`, keeping the store hint strictly more generous
    /// than the authoritative policy. A hint too large to represent as a
    /// timestamp degrades to no hint at all, which is safe: the record
    /// simply never gets a physical TTL.
    #[must_use]
    pub fn for_ticket(ticket: &Ticket, payload: Vec<u8>, ttl_margin: std::time::Duration) -> Self {
        let expire_at = ticket.expiration_policy.max_lifetime_hint().and_then(|lifetime| {
            let padded = lifetime.checked_add(ttl_margin)?;
            let delta = chrono::TimeDelta::from_std(padded).ok()?;
            ticket.creation_time.checked_add_signed(delta)
        });
        Self {
            id: ticket.id.clone(),
            kind: ticket.kind,
            principal_id: ticket.principal_id.clone(),
            parent_id: ticket.parent_id.clone(),
            payload: Bytes::from(payload),
            expire_at,
        }
    }

    /// Remaining time until the store hint fires, from `now`.
    ///
    /// `None` when unbounded; `Some(ZERO)` when already past.
    #[must_use]
    pub fn ttl_from(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.expire_at.map(|at| (at - now).to_std().unwrap_or(std::time::Duration::ZERO))
    }
}

/// Base64 (standard alphabet) serde adapter for the encrypted payload.
mod base64_bytes {
    use super::*;
    use serde::{Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(&encoded).map(Bytes::from).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use warden_tickets::ExpirationPolicy;

    use super::*;

    fn sample_ticket() -> Ticket {
        Ticket::new(
            "ST-3-abcdef",
            TicketKind::Service,
            "alice",
            ExpirationPolicy::single_use(Duration::from_secs(30)),
            Utc::now(),
        )
        .with_parent("TGT-1-root")
    }

    #[test]
    fn codec_round_trip() {
        let codec = TicketCodec;
        let ticket = sample_ticket();
        let bytes = codec.serialize(&ticket).unwrap();
        let back = codec.deserialize(&bytes, &ticket.id, Some(TicketKind::Service)).unwrap();
        assert_eq!(ticket, back);
    }

    #[test]
    fn garbage_bytes_report_corrupt() {
        let codec = TicketCodec;
        let err = codec.deserialize(b"\x00\x01 not json", "ST-3-abcdef", None).unwrap_err();
        match err {
            RegistryError::CorruptTicket { ticket_id, .. } => assert_eq!(ticket_id, "ST-3-abcdef"),
            other => panic!("expected CorruptTicket, got {other}"),
        }
    }

    #[test]
    fn kind_mismatch_reports_corrupt() {
        let codec = TicketCodec;
        let bytes = codec.serialize(&sample_ticket()).unwrap();
        let err = codec
            .deserialize(&bytes, "ST-3-abcdef", Some(TicketKind::TicketGranting))
            .unwrap_err();
        assert!(matches!(err, RegistryError::CorruptTicket { .. }));
    }

    #[test]
    fn id_mismatch_reports_corrupt() {
        let codec = TicketCodec;
        let bytes = codec.serialize(&sample_ticket()).unwrap();
        let err = codec.deserialize(&bytes, "ST-999-other", None).unwrap_err();
        assert!(matches!(err, RegistryError::CorruptTicket { .. }));
    }

    #[test]
    fn record_hint_is_more_generous_than_policy() {
        let ticket = sample_ticket();
        let margin = Duration::from_secs(300);
        let record = RegistryRecord::for_ticket(&ticket, b"blob".to_vec(), margin);

        let expire_at = record.expire_at.unwrap();
        let policy_deadline = ticket.creation_time
            + chrono::TimeDelta::from_std(
                ticket.expiration_policy.max_lifetime_hint().unwrap(),
            )
            .unwrap();
        assert!(expire_at > policy_deadline);
    }

    #[test]
    fn oversized_lifetime_degrades_to_no_hint() {
        let mut ticket = sample_ticket();
        ticket.expiration_policy = ExpirationPolicy::Absolute { max_lifetime: Duration::MAX };
        let record =
            RegistryRecord::for_ticket(&ticket, b"blob".to_vec(), Duration::from_secs(300));
        assert_eq!(record.expire_at, None);

        // Overflow in the margin addition alone degrades the same way.
        let mut ticket = sample_ticket();
        ticket.expiration_policy =
            ExpirationPolicy::Absolute { max_lifetime: Duration::from_secs(60) };
        let record = RegistryRecord::for_ticket(&ticket, b"blob".to_vec(), Duration::MAX);
        assert_eq!(record.expire_at, None);
    }

    #[test]
    fn unbounded_policy_gets_no_hint() {
        let mut ticket = sample_ticket();
        ticket.expiration_policy = ExpirationPolicy::Never;
        let record = RegistryRecord::for_ticket(&ticket, b"blob".to_vec(), Duration::from_secs(1));
        assert_eq!(record.expire_at, None);
        assert_eq!(record.ttl_from(Utc::now()), None);
    }

    #[test]
    fn record_serde_round_trips_payload_as_base64() {
        let ticket = sample_ticket();
        let record =
            RegistryRecord::for_ticket(&ticket, vec![0x00, 0xFF, 0x10], Duration::from_secs(60));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["payload"], serde_json::json!(STANDARD.encode([0x00, 0xFF, 0x10])));

        let back: RegistryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
