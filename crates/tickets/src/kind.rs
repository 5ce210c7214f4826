//! Ticket kinds and prefix-based dispatch.
//!
//! Every ticket id starts with its kind's prefix (`TGT-...`, `ST-...`),
//! which lets the registry route an opaque id to the right storage
//! partition without a lookup round-trip.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of ticket kinds the registry manages.
///
/// Kinds are metadata only; the registry never interprets the protocol
/// payload a ticket carries. The set is closed: adding a kind is a code
/// change, matching the catalog's initialize-once contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketKind {
    /// Long-lived root ticket representing an authenticated session.
    TicketGranting,
    /// Short-lived, typically single-use ticket presented to a relying
    /// application.
    Service,
    /// Single-use ticket derived from a proxy-granting ticket.
    Proxy,
    /// Grant ticket obtained by a service to act on the user's behalf.
    ProxyGranting,
    /// Short-lived ticket carrying transient webflow session state.
    TransientSession,
    /// Asynchronous backchannel authentication request artifact.
    BackchannelRequest,
}

impl TicketKind {
    /// All kinds, in catalog registration order.
    pub const ALL: [TicketKind; 6] = [
        TicketKind::TicketGranting,
        TicketKind::Service,
        TicketKind::Proxy,
        TicketKind::ProxyGranting,
        TicketKind::TransientSession,
        TicketKind::BackchannelRequest,
    ];

    /// The id prefix for this kind (`"TGT"`, `"ST"`, ...).
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            TicketKind::TicketGranting => "TGT",
            TicketKind::Service => "ST",
            TicketKind::Proxy => "PT",
            TicketKind::ProxyGranting => "PGT",
            TicketKind::TransientSession => "TST",
            TicketKind::BackchannelRequest => "BCR",
        }
    }

    /// Resolves the kind encoded in a ticket id's prefix.
    ///
    /// The prefix is the portion before the first `-`, compared exactly,
    /// so `PGT-` ids never resolve as proxy tickets. Returns `None` when
    /// the id carries no known prefix.
    #[must_use]
    pub fn from_id(id: &str) -> Option<TicketKind> {
        let prefix = id.split_once('-').map(|(p, _)| p)?;
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TicketKind::TicketGranting => "ticket-granting",
            TicketKind::Service => "service",
            TicketKind::Proxy => "proxy",
            TicketKind::ProxyGranting => "proxy-granting",
            TicketKind::TransientSession => "transient-session",
            TicketKind::BackchannelRequest => "backchannel-request",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_unique() {
        for a in TicketKind::ALL {
            for b in TicketKind::ALL {
                if a != b {
                    assert_ne!(a.prefix(), b.prefix());
                }
            }
        }
    }

    #[test]
    fn from_id_resolves_every_prefix() {
        for kind in TicketKind::ALL {
            let id = format!("{}-1-abcdef", kind.prefix());
            assert_eq!(TicketKind::from_id(&id), Some(kind));
        }
    }

    #[test]
    fn from_id_rejects_unknown_prefix() {
        assert_eq!(TicketKind::from_id("XYZ-1-abcdef"), None);
        assert_eq!(TicketKind::from_id("no-separator-prefix"), None);
        assert_eq!(TicketKind::from_id(""), None);
    }

    #[test]
    fn pgt_does_not_resolve_as_proxy() {
        assert_eq!(TicketKind::from_id("PGT-3-xyz"), Some(TicketKind::ProxyGranting));
        assert_eq!(TicketKind::from_id("PT-3-xyz"), Some(TicketKind::Proxy));
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&TicketKind::TicketGranting).unwrap();
        assert_eq!(json, "\"ticket-granting\"");
        let back: TicketKind = serde_json::from_str("\"backchannel-request\"").unwrap();
        assert_eq!(back, TicketKind::BackchannelRequest);
    }
}
