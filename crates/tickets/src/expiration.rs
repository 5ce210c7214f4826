//! Composable expiration policies.
//!
//! A policy judges whether a ticket is alive given its creation time, last
//! use time and use count. Policies compose with [`AnyOf`](ExpirationPolicy::AnyOf)
//! (expired once *any* member fires — the common case) and
//! [`AllOf`](ExpirationPolicy::AllOf) semantics, so each ticket kind can
//! carry the combination the original deployment configured:
//!
//! | Kind | Policy |
//! |------|--------|
//! | grant | absolute lifetime OR idle timeout |
//! | single-use artifacts | absolute lifetime OR use-count ceiling |
//!
//! # Authority
//!
//! This evaluator is the *authoritative* liveness decision. Store-level TTL
//! hints and cache entry TTLs are opportunistic cleanup only and are always
//! set at least as generous as [`max_lifetime_hint`](ExpirationPolicy::max_lifetime_hint).
//!
//! # Monotonicity
//!
//! For a fixed ticket value, `is_expired` is monotone in `now`: once true,
//! it stays true for every later reading. Nothing revives a ticket.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::Ticket;

/// Liveness policy for a ticket instance.
///
/// Shared immutably across all tickets of a kind in the common case, but
/// carried per-instance so a deployment can special-case individual grants
/// (e.g. remember-me sessions with a longer lifetime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "policy")]
pub enum ExpirationPolicy {
    /// Never expires. Used for tickets whose lifecycle is purely explicit.
    Never,
    /// Expired once `now - creation_time > max_lifetime`.
    Absolute {
        /// Hard ceiling on total lifetime.
        max_lifetime: Duration,
    },
    /// Expired once `now - last_used_time > idle_timeout`.
    Idle {
        /// Sliding window since last successful use.
        idle_timeout: Duration,
    },
    /// Expired once `count_of_uses >= max_uses`.
    UseCount {
        /// Ceiling on successful uses; `1` for single-use artifacts.
        max_uses: u64,
    },
    /// Expired once any member policy fires.
    AnyOf {
        /// Member policies; the first to fire ends the ticket.
        members: Vec<ExpirationPolicy>,
    },
    /// Expired only when every member policy fires.
    AllOf {
        /// Member policies that must all fire.
        members: Vec<ExpirationPolicy>,
    },
}

impl ExpirationPolicy {
    /// The grant-ticket composition: absolute lifetime OR idle timeout,
    /// whichever fires first.
    #[must_use]
    pub fn grant(max_lifetime: Duration, idle_timeout: Duration) -> Self {
        ExpirationPolicy::AnyOf {
            members: vec![
                ExpirationPolicy::Absolute { max_lifetime },
                ExpirationPolicy::Idle { idle_timeout },
            ],
        }
    }

    /// The single-use composition: absolute lifetime OR a one-use ceiling.
    #[must_use]
    pub fn single_use(max_lifetime: Duration) -> Self {
        ExpirationPolicy::AnyOf {
            members: vec![
                ExpirationPolicy::Absolute { max_lifetime },
                ExpirationPolicy::UseCount { max_uses: 1 },
            ],
        }
    }

    /// Whether `ticket` is expired at `now` under this policy.
    ///
    /// A `now` before the ticket's timestamps (cross-node clock skew) counts
    /// as zero elapsed time rather than a negative one.
    #[must_use]
    pub fn is_expired(&self, ticket: &Ticket, now: DateTime<Utc>) -> bool {
        match self {
            ExpirationPolicy::Never => false,
            ExpirationPolicy::Absolute { max_lifetime } => {
                elapsed(ticket.creation_time, now) > *max_lifetime
            },
            ExpirationPolicy::Idle { idle_timeout } => {
                elapsed(ticket.last_used_time, now) > *idle_timeout
            },
            ExpirationPolicy::UseCount { max_uses } => ticket.count_of_uses >= *max_uses,
            ExpirationPolicy::AnyOf { members } => {
                members.iter().any(|p| p.is_expired(ticket, now))
            },
            ExpirationPolicy::AllOf { members } => {
                !members.is_empty() && members.iter().all(|p| p.is_expired(ticket, now))
            },
        }
    }

    /// The longest wall-clock time a ticket under this policy could remain
    /// alive, or `None` when unbounded.
    ///
    /// Store adapters add the configured margin to this value to produce
    /// the opportunistic store-level TTL hint; caches use it to bound entry
    /// lifetime. `None` (policies with no time bound) means "no hint".
    #[must_use]
    pub fn max_lifetime_hint(&self) -> Option<Duration> {
        match self {
            ExpirationPolicy::Never | ExpirationPolicy::UseCount { .. } => None,
            ExpirationPolicy::Absolute { max_lifetime } => Some(*max_lifetime),
            // Idle timeouts reset on use, so alone they bound nothing; a
            // composed absolute member supplies the bound where one exists.
            ExpirationPolicy::Idle { .. } => None,
            ExpirationPolicy::AnyOf { members } => {
                members.iter().filter_map(Self::max_lifetime_hint).min()
            },
            ExpirationPolicy::AllOf { members } => {
                members.iter().filter_map(Self::max_lifetime_hint).max()
            },
        }
    }
}

/// Non-negative elapsed time between `earlier` and `now`.
fn elapsed(earlier: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - earlier).to_std().unwrap_or(Duration::ZERO)
}
