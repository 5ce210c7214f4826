//! Registry error types and result alias.
//!
//! Every registry component maps its internal failures to [`RegistryError`]
//! so callers see a single, stable taxonomy:
//!
//! - [`RegistryError::UnknownKind`] - kind absent from the catalog; fatal, not retryable
//! - [`RegistryError::CorruptTicket`] - deserialization failed on read; treated as not-found
//! - [`RegistryError::DecryptionFailure`] - cipher verification failed; treated as not-found
//! - [`RegistryError::LockTimeout`] - mutation could not be serialized in time; retryable
//! - [`RegistryError::StoreUnavailable`] - backend I/O failure; retryable
//! - [`RegistryError::Timeout`] - operation exceeded its deadline; retryable
//! - [`RegistryError::Internal`] - catch-all for component-specific failures
//!
//! "Ticket not found" is deliberately *not* an error: lookups return
//! `Ok(None)` because probing for an absent or expired ticket is a normal
//! outcome for optimistic callers.
//!
//! # Confidentiality
//!
//! Error messages never carry ticket payload plaintext, session attribute
//! values, or key material — ticket ids and operation names only.

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur during ticket registry operations.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases; downstream match
/// expressions must include a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The requested ticket kind is absent from the catalog.
    ///
    /// Signals a configuration or dispatch bug in the calling layer; fatal
    /// to the request and never retryable.
    #[error("unknown ticket kind: {kind}")]
    UnknownKind {
        /// The kind (or raw id prefix) that failed to resolve.
        kind: String,
    },

    /// A stored ticket could not be deserialized.
    ///
    /// Callers treat this exactly like "not found" (fail closed, never
    /// expose partial data); the registry logs it distinctly for operators.
    #[error("corrupt ticket record for {ticket_id}: {message}")]
    CorruptTicket {
        /// The id of the unreadable record.
        ticket_id: String,
        /// What failed. Never contains payload bytes.
        message: String,
        /// The underlying decode error.
        #[source]
        source: Option<BoxError>,
    },

    /// Cipher verification or decryption failed.
    ///
    /// A tampered or truncated blob fails closed here — no partial or
    /// garbage plaintext ever leaves the cipher.
    #[error("ticket blob failed cryptographic verification")]
    DecryptionFailure,

    /// A mutation could not acquire its serialization lock in time.
    ///
    /// Retryable with backoff; no partial state was written.
    #[error("lock acquisition timed out for key {key}")]
    LockTimeout {
        /// The lock key (a ticket id or principal id).
        key: String,
    },

    /// The backing store could not be reached or failed an operation.
    ///
    /// Retryable; if persistent, the hosting server should degrade rather
    /// than operate on an inconsistent cluster view.
    #[error("ticket store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the failure.
        message: String,
        /// The underlying driver error.
        #[source]
        source: Option<BoxError>,
    },

    /// An operation exceeded its composed deadline.
    #[error("registry operation timed out")]
    Timeout,

    /// Catch-all for component-specific failures.
    #[error("internal registry error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl RegistryError {
    /// Creates an `UnknownKind` error.
    #[must_use]
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }

    /// Creates a `CorruptTicket` error.
    #[must_use]
    pub fn corrupt(ticket_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptTicket { ticket_id: ticket_id.into(), message: message.into(), source: None }
    }

    /// Creates a `CorruptTicket` error with a source.
    #[must_use]
    pub fn corrupt_with_source(
        ticket_id: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::CorruptTicket {
            ticket_id: ticket_id.into(),
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a `LockTimeout` error.
    #[must_use]
    pub fn lock_timeout(key: impl Into<String>) -> Self {
        Self::LockTimeout { key: key.into() }
    }

    /// Creates a `StoreUnavailable` error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable { message: message.into(), source: None }
    }

    /// Creates a `StoreUnavailable` error with a source.
    #[must_use]
    pub fn store_unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StoreUnavailable { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Whether the caller may retry this operation (with backoff).
    ///
    /// Lock timeouts, store outages and deadline misses are transient;
    /// unknown kinds and corrupt records are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::StoreUnavailable { .. } | Self::Timeout
        )
    }
}

impl From<warden_tickets::UnknownTicketKind> for RegistryError {
    fn from(err: warden_tickets::UnknownTicketKind) -> Self {
        Self::UnknownKind { kind: err.kind }
    }
}

/// Configuration validation failure, reported at `build()` time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A numeric or duration field is below its allowed minimum.
    #[error("{field} is {value}, below the minimum of {min}")]
    BelowMinimum {
        /// The offending field name.
        field: &'static str,
        /// The rejected value, rendered for the message.
        value: String,
        /// The minimum, rendered for the message.
        min: String,
    },

    /// A field has an invalid shape (wrong length, empty, malformed).
    #[error("{field} is invalid: {reason}")]
    Invalid {
        /// The offending field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
