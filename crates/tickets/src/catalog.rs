//! The ticket catalog: static, per-kind storage metadata.
//!
//! The catalog maps each [`TicketKind`] to its physical storage name, its
//! default expiration policy, and whether mutations of that kind must be
//! serialized through the lock repository. It is built once at process
//! start and is immutable afterwards — lookups are plain reads with no
//! synchronization.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::{expiration::ExpirationPolicy, kind::TicketKind};

/// Lookup failure: the requested kind was never registered.
///
/// Fatal to the calling request and not retryable; it signals a
/// configuration or dispatch bug, not a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ticket kind: {kind}")]
pub struct UnknownTicketKind {
    /// The kind (or raw id prefix) that failed to resolve.
    pub kind: String,
}

/// Static metadata for one ticket kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketDefinition {
    /// The kind this definition describes.
    pub kind: TicketKind,
    /// Physical partition name (keyspace, table, cache region) for this
    /// kind. Operators size and monitor kinds independently, so each kind
    /// gets its own partition.
    pub storage_name: String,
    /// Policy applied to newly minted tickets of this kind.
    pub default_policy: ExpirationPolicy,
    /// Whether conflicting mutations must be serialized across nodes.
    ///
    /// Grant tickets are renewed concurrently and need the lock; single-use
    /// artifacts are deleted right after use and do not.
    pub requires_locking: bool,
}

/// Immutable registry of [`TicketDefinition`]s, keyed by kind.
///
/// # Example
///
/// ```
/// use warden_tickets::{TicketCatalog, TicketKind};
///
/// let catalog = TicketCatalog::standard();
/// let def = catalog.find(TicketKind::Service).unwrap();
/// assert_eq!(def.storage_name, "service_tickets");
/// ```
#[derive(Debug, Clone)]
pub struct TicketCatalog {
    definitions: BTreeMap<TicketKind, TicketDefinition>,
}

impl TicketCatalog {
    /// Starts an empty catalog builder.
    #[must_use]
    pub fn builder() -> TicketCatalogBuilder {
        TicketCatalogBuilder { definitions: BTreeMap::new() }
    }

    /// The stock catalog covering every [`TicketKind`] with the default
    /// deployment policies: 8 h / 2 h-idle grants, 30 s single-use service
    /// and proxy tickets, 5 min transient and backchannel artifacts.
    #[must_use]
    pub fn standard() -> Self {
        const HOUR: u64 = 3600;
        Self::builder()
            .register(TicketDefinition {
                kind: TicketKind::TicketGranting,
                storage_name: "ticket_granting_tickets".to_owned(),
                default_policy: ExpirationPolicy::grant(
                    Duration::from_secs(8 * HOUR),
                    Duration::from_secs(2 * HOUR),
                ),
                requires_locking: true,
            })
            .register(TicketDefinition {
                kind: TicketKind::Service,
                storage_name: "service_tickets".to_owned(),
                default_policy: ExpirationPolicy::single_use(Duration::from_secs(30)),
                requires_locking: false,
            })
            .register(TicketDefinition {
                kind: TicketKind::Proxy,
                storage_name: "proxy_tickets".to_owned(),
                default_policy: ExpirationPolicy::single_use(Duration::from_secs(30)),
                requires_locking: false,
            })
            .register(TicketDefinition {
                kind: TicketKind::ProxyGranting,
                storage_name: "proxy_granting_tickets".to_owned(),
                default_policy: ExpirationPolicy::grant(
                    Duration::from_secs(8 * HOUR),
                    Duration::from_secs(2 * HOUR),
                ),
                requires_locking: true,
            })
            .register(TicketDefinition {
                kind: TicketKind::TransientSession,
                storage_name: "transient_session_tickets".to_owned(),
                default_policy: ExpirationPolicy::Absolute {
                    max_lifetime: Duration::from_secs(300),
                },
                requires_locking: false,
            })
            .register(TicketDefinition {
                kind: TicketKind::BackchannelRequest,
                storage_name: "backchannel_request_tickets".to_owned(),
                default_policy: ExpirationPolicy::Absolute {
                    max_lifetime: Duration::from_secs(300),
                },
                requires_locking: false,
            })
            .build()
    }

    /// Looks up the definition for `kind`.
    ///
    /// # Errors
    ///
    /// [`UnknownTicketKind`] when the kind was never registered.
    pub fn find(&self, kind: TicketKind) -> Result<&TicketDefinition, UnknownTicketKind> {
        self.definitions
            .get(&kind)
            .ok_or_else(|| UnknownTicketKind { kind: kind.to_string() })
    }

    /// Resolves the definition for a ticket id via its kind prefix.
    ///
    /// # Errors
    ///
    /// [`UnknownTicketKind`] when the id carries no registered prefix.
    pub fn find_by_id(&self, id: &str) -> Result<&TicketDefinition, UnknownTicketKind> {
        let kind = TicketKind::from_id(id)
            .ok_or_else(|| UnknownTicketKind { kind: prefix_of(id).to_owned() })?;
        self.find(kind)
    }

    /// All registered definitions, in kind order.
    pub fn find_all(&self) -> impl Iterator<Item = &TicketDefinition> {
        self.definitions.values()
    }
}

fn prefix_of(id: &str) -> &str {
    id.split_once('-').map_or(id, |(p, _)| p)
}

/// Builder for [`TicketCatalog`]. Registering the same kind twice keeps the
/// last definition, letting deployments override individual stock entries.
pub struct TicketCatalogBuilder {
    definitions: BTreeMap<TicketKind, TicketDefinition>,
}

impl TicketCatalogBuilder {
    /// Registers (or overrides) one definition.
    #[must_use]
    pub fn register(mut self, definition: TicketDefinition) -> Self {
        self.definitions.insert(definition.kind, definition);
        self
    }

    /// Finalizes the catalog.
    #[must_use]
    pub fn build(self) -> TicketCatalog {
        TicketCatalog { definitions: self.definitions }
    }
}
