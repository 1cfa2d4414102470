use chrono::Duration;

use super::store::LeaseStore;
use super::Lease;
use crate::error::Result;

/// How many times `claim` re-reads after losing a write race before giving up.
pub(crate) const CLAIM_ATTEMPTS: usize = 3;

/// Result of [`LeaseManager::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// No valid lease existed; the caller now holds one.
    Acquired,
    /// The caller already held the lease; its timestamp was refreshed.
    Refreshed,
    /// Another holder has a valid lease.
    Conflict { holder_id: String, age: Duration },
    /// Every write attempt lost to a concurrent writer whose record then vanished.
    Contended,
}

impl ClaimOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Acquired | Self::Refreshed)
    }
}

/// Result of [`LeaseManager::renew`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    /// The caller still held the lease and its timestamp was refreshed.
    Renewed,
    /// The caller's lease had lapsed; the resource was free and is held again.
    Reacquired,
    Conflict { holder_id: String, age: Duration },
    Contended,
}

impl RenewOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Renewed | Self::Reacquired)
    }
}

/// Result of [`LeaseManager::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Free,
    HeldBy { holder_id: String, age: Duration },
}

/// Result of [`LeaseManager::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// Nothing to release. Not an error: GC or expiry may have got there first.
    AlreadyFree,
    /// A different holder owns the lease; it was left untouched.
    NotOwner { holder_id: String, age: Duration },
}

impl ReleaseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Released | Self::AlreadyFree)
    }
}

/// A valid lease as shown by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLease {
    pub resource_id: String,
    pub holder_id: String,
    pub age: Duration,
    pub kind: Option<String>,
}

/// Claim/check/release protocol over a [`LeaseStore`].
///
/// Conflicts and refused releases come back as outcomes; `Err` is reserved
/// for storage failures.
#[derive(Clone)]
pub struct LeaseManager {
    store: LeaseStore,
}

impl LeaseManager {
    pub fn new(store: LeaseStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LeaseStore {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.store.ttl()
    }

    /// Claim `resource_id` for `holder_id`.
    ///
    /// Re-claiming a lease the caller already holds succeeds and refreshes it.
    pub fn claim(&self, resource_id: &str, holder_id: &str) -> Result<ClaimOutcome> {
        self.claim_tagged(resource_id, holder_id, None)
    }

    /// Claim with a slot-type tag on the lease record.
    pub fn claim_tagged(
        &self,
        resource_id: &str,
        holder_id: &str,
        kind: Option<&str>,
    ) -> Result<ClaimOutcome> {
        for attempt in 1..=CLAIM_ATTEMPTS {
            let now = self.store.now();
            match self.store.read_versioned(resource_id)? {
                Some((existing, seen)) if existing.is_held_by(holder_id) => {
                    let kind = kind.or(existing.kind.as_deref());
                    let lease = Lease::new(resource_id, holder_id, now).with_kind(kind);
                    // Only overwrite the record we read; it may have expired and
                    // changed hands since.
                    if self.store.replace_if(resource_id, &seen, &lease)? {
                        log::debug!("{} refreshed claim on {}", holder_id, resource_id);
                        return Ok(ClaimOutcome::Refreshed);
                    }
                    log::debug!(
                        "{} lost refresh race on {} (attempt {})",
                        holder_id,
                        resource_id,
                        attempt
                    );
                }
                Some((existing, _)) => {
                    log::debug!(
                        "{} denied {}: held by {}",
                        holder_id,
                        resource_id,
                        existing.holder_id
                    );
                    return Ok(ClaimOutcome::Conflict {
                        age: existing.age(now),
                        holder_id: existing.holder_id,
                    });
                }
                None => {
                    let lease = Lease::new(resource_id, holder_id, now).with_kind(kind);
                    if self.store.write_new(resource_id, &lease)? {
                        log::debug!("{} acquired {}", holder_id, resource_id);
                        return Ok(ClaimOutcome::Acquired);
                    }
                    log::debug!(
                        "{} lost create race on {} (attempt {})",
                        holder_id,
                        resource_id,
                        attempt
                    );
                }
            }
        }

        log::warn!(
            "{} gave up claiming {} after {} attempts",
            holder_id,
            resource_id,
            CLAIM_ATTEMPTS
        );
        Ok(ClaimOutcome::Contended)
    }

    /// Refresh the caller's lease.
    ///
    /// Behaves like a same-holder `claim`, but reports whether the lease had
    /// lapsed in the meantime.
    pub fn renew(&self, resource_id: &str, holder_id: &str) -> Result<RenewOutcome> {
        Ok(match self.claim(resource_id, holder_id)? {
            ClaimOutcome::Refreshed => RenewOutcome::Renewed,
            ClaimOutcome::Acquired => RenewOutcome::Reacquired,
            ClaimOutcome::Conflict { holder_id, age } => RenewOutcome::Conflict { holder_id, age },
            ClaimOutcome::Contended => RenewOutcome::Contended,
        })
    }

    /// Who, if anyone, holds `resource_id` right now.
    pub fn check(&self, resource_id: &str) -> Result<CheckOutcome> {
        let now = self.store.now();
        Ok(match self.store.read(resource_id)? {
            Some(lease) => CheckOutcome::HeldBy {
                age: lease.age(now),
                holder_id: lease.holder_id,
            },
            None => CheckOutcome::Free,
        })
    }

    /// Release `resource_id` if `holder_id` owns it.
    pub fn release(&self, resource_id: &str, holder_id: &str) -> Result<ReleaseOutcome> {
        let now = self.store.now();
        match self.store.read_versioned(resource_id)? {
            None => Ok(ReleaseOutcome::AlreadyFree),
            Some((lease, seen)) if lease.is_held_by(holder_id) => {
                if self.store.delete_if(resource_id, &seen)? {
                    log::debug!("{} released {}", holder_id, resource_id);
                    Ok(ReleaseOutcome::Released)
                } else {
                    // The lease lapsed and moved on between our read and the delete.
                    log::debug!("{} lease on {} changed before release", holder_id, resource_id);
                    Ok(ReleaseOutcome::AlreadyFree)
                }
            }
            Some((lease, _)) => {
                log::warn!(
                    "{} tried to release {} held by {}",
                    holder_id,
                    resource_id,
                    lease.holder_id
                );
                Ok(ReleaseOutcome::NotOwner {
                    age: lease.age(now),
                    holder_id: lease.holder_id,
                })
            }
        }
    }

    /// Delete every expired or unreadable record. Returns how many were removed.
    pub fn garbage_collect(&self) -> Result<usize> {
        let removed = self.store.sweep()?;
        if removed > 0 {
            log::info!("garbage collected {} stale lease(s)", removed);
        }
        Ok(removed)
    }

    /// Valid leases ordered by ascending age, newest first.
    pub fn list_active(&self) -> Result<Vec<ActiveLease>> {
        let now = self.store.now();
        let mut active: Vec<ActiveLease> = self
            .store
            .list_all()?
            .into_iter()
            .map(|(resource_id, lease)| ActiveLease {
                resource_id,
                age: lease.age(now),
                holder_id: lease.holder_id,
                kind: lease.kind,
            })
            .collect();
        active.sort_by(|a, b| {
            a.age
                .cmp(&b.age)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });
        Ok(active)
    }

    /// Valid leases tagged with `kind`.
    pub fn list_kind(&self, kind: &str) -> Result<Vec<(String, Lease)>> {
        Ok(self
            .store
            .list_all()?
            .into_iter()
            .filter(|(_, lease)| lease.kind.as_deref() == Some(kind))
            .collect())
    }
}
