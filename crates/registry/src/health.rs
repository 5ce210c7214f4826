//! Health check types for ticket stores.
//!
//! Returned by [`TicketStore::health_check`](crate::store::TicketStore::health_check).
//! The three probe types follow the orchestrator convention:
//!
//! - **Liveness** — process is alive and not deadlocked. Failure triggers a restart.
//! - **Readiness** — store can serve traffic. Failure removes the node from rotation.
//! - **Startup** — initial warm-up is complete (first connection established).

use std::{collections::HashMap, fmt, time::Duration};

/// The type of health probe to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthProbe {
    /// Process is alive and not deadlocked.
    Liveness,
    /// Store can serve traffic (connection healthy).
    Readiness,
    /// Initial warm-up is complete (first connection established).
    Startup,
}

impl fmt::Display for HealthProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Liveness => write!(f, "liveness"),
            Self::Readiness => write!(f, "readiness"),
            Self::Startup => write!(f, "startup"),
        }
    }
}

/// Health status returned by [`TicketStore::health_check`](crate::store::TicketStore::health_check).
///
/// Each variant carries [`HealthMetadata`] with timing and store-specific details.
#[derive(Debug, Clone)]
pub enum HealthStatus {
    /// Store is fully operational.
    Healthy(HealthMetadata),
    /// Store is operational but with reduced capability.
    ///
    /// The `String` describes the degradation reason (e.g., "invalidation
    /// subscription reconnecting", "elevated latency").
    Degraded(HealthMetadata, String),
    /// Store cannot serve traffic reliably.
    ///
    /// The `String` describes the failure reason.
    Unhealthy(HealthMetadata, String),
}

impl HealthStatus {
    /// Creates a `Healthy` status.
    #[must_use = "creating a status has no side effects"]
    pub fn healthy(metadata: HealthMetadata) -> Self {
        Self::Healthy(metadata)
    }

    /// Creates a `Degraded` status with a reason.
    #[must_use = "creating a status has no side effects"]
    pub fn degraded(metadata: HealthMetadata, reason: impl Into<String>) -> Self {
        Self::Degraded(metadata, reason.into())
    }

    /// Creates an `Unhealthy` status with a reason.
    #[must_use = "creating a status has no side effects"]
    pub fn unhealthy(metadata: HealthMetadata, reason: impl Into<String>) -> Self {
        Self::Unhealthy(metadata, reason.into())
    }

    /// Returns `true` if the store is fully healthy.
    #[must_use = "health status predicates should be checked"]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy(_))
    }

    /// Returns `true` if the store is degraded.
    #[must_use = "health status predicates should be checked"]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(..))
    }

    /// Returns `true` if the store is unhealthy.
    #[must_use = "health status predicates should be checked"]
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(..))
    }

    /// Returns the metadata associated with this health status.
    #[must_use = "returns metadata by reference without side effects"]
    pub fn metadata(&self) -> &HealthMetadata {
        match self {
            Self::Healthy(m) | Self::Degraded(m, _) | Self::Unhealthy(m, _) => m,
        }
    }

    /// Returns the degradation or failure reason, if any.
    #[must_use = "returns the reason without side effects"]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Healthy(_) => None,
            Self::Degraded(_, reason) | Self::Unhealthy(_, reason) => Some(reason),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy(m) => write!(f, "healthy ({}ms)", m.check_duration.as_millis()),
            Self::Degraded(m, reason) => {
                write!(f, "degraded: {} ({}ms)", reason, m.check_duration.as_millis())
            },
            Self::Unhealthy(m, reason) => {
                write!(f, "unhealthy: {} ({}ms)", reason, m.check_duration.as_millis())
            },
        }
    }
}

/// Metadata about a health check result.
///
/// Contains timing information, store identification, and an extensible
/// key-value map for store-specific details (e.g., ticket counts,
/// connection latency).
#[derive(Debug, Clone)]
pub struct HealthMetadata {
    /// How long the health check itself took.
    pub check_duration: Duration,
    /// Identifier for the store type (e.g., "memory", "redis").
    pub store: String,
    /// Store-specific details.
    ///
    /// Common keys include:
    /// - `ticket_count`: Number of live tickets in the store
    /// - `connection_latency_ms`: Latency of the connectivity check
    pub details: HashMap<String, String>,
}

impl HealthMetadata {
    /// Creates a new `HealthMetadata` with the given check duration and store name.
    #[must_use = "constructing metadata has no side effects"]
    pub fn new(check_duration: Duration, store: impl Into<String>) -> Self {
        Self { check_duration, store: store.into(), details: HashMap::new() }
    }

    /// Adds a detail entry, returning `self` for chaining.
    #[must_use = "returns the modified metadata for chaining"]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
