//! Soft-claim leases over a shared store.
//!
//! A lease gives one holder exclusive logical ownership of a resource id for
//! a bounded time. Leases live one-per-resource in a [`LeaseBackend`]:
//! - [`LeaseStore`] maps resource ids to records and applies lazy expiry
//! - [`LeaseManager`] layers the claim/check/release protocol on top
//!
//! A lease is valid while `now - acquired_at <= ttl`. Anything else, including
//! a record that cannot be decoded, reads as free.

mod backend;
mod manager;
mod store;


pub use backend::{escape_key, unescape_key, FsBackend, LeaseBackend, MemoryBackend, CLAIM_SUFFIX};
pub use manager::{
    ActiveLease, CheckOutcome, ClaimOutcome, LeaseManager, ReleaseOutcome, RenewOutcome,
};
pub use store::LeaseStore;

pub(crate) use backend::temp_suffix;

use std::env;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default lease lifetime in seconds.
pub const DEFAULT_TTL_SECS: i64 = 120;

/// Environment variable naming the current session.
pub const SESSION_ENV: &str = "SESSION_ID";

/// Default lease lifetime (2 minutes).
pub fn default_ttl() -> Duration {
    Duration::seconds(DEFAULT_TTL_SECS)
}

/// One holder's claim on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Echo of the storage key, kept for debugging.
    pub resource_id: String,
    pub holder_id: String,
    /// When the holder last claimed (or renewed) the resource.
    #[serde(rename = "timestamp")]
    pub acquired_at: DateTime<Utc>,
    /// Tag for slot reservations, e.g. `lesson`.
    #[serde(rename = "slot_type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Lease {
    pub fn new(resource_id: &str, holder_id: &str, acquired_at: DateTime<Utc>) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            holder_id: holder_id.to_string(),
            acquired_at,
            kind: None,
        }
    }

    /// Tag the lease with a slot type.
    pub fn with_kind(mut self, kind: Option<&str>) -> Self {
        self.kind = kind.map(str::to_string);
        self
    }

    /// Time since acquisition, clamped at zero for holders with a fast clock.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.acquired_at).max(Duration::zero())
    }

    /// The one expiry predicate shared by reads, listing and GC.
    pub fn is_valid_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.acquired_at <= ttl
    }

    pub fn is_held_by(&self, holder_id: &str) -> bool {
        self.holder_id == holder_id
    }
}

/// Resolve the holder identity for this process.
///
/// An explicit value wins, then `SESSION_ID`, then `pid-<process id>`.
pub fn resolve_holder(explicit: Option<&str>) -> String {
    if let Some(holder) = explicit.map(str::trim).filter(|h| !h.is_empty()) {
        return holder.to_string();
    }
    match env::var(SESSION_ENV) {
        Ok(session) if !session.trim().is_empty() => session.trim().to_string(),
        _ => format!("pid-{}", std::process::id()),
    }
}

/// Format a lease age for humans: `42s`, `3m 10s`, `2h 5m`.
pub fn format_age(age: Duration) -> String {
    let secs = age.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
