use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::backend::{FsBackend, LeaseBackend};
use super::{default_ttl, Lease};
use crate::clock::{Clock, SystemClock};
use crate::error::{ClaimError, Result};

/// How a raw record reads at a given instant.
enum RecordState {
    Valid(Lease),
    Expired(Lease),
    /// The bytes do not decode as a lease. Unreadable means free.
    Corrupt,
}

/// Durable resource id -> lease mapping with lazy expiry.
///
/// Reads never surface expired or corrupt records; they are purged on sight.
#[derive(Clone)]
pub struct LeaseStore {
    backend: Arc<dyn LeaseBackend>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl LeaseStore {
    pub fn new<B: LeaseBackend + 'static>(backend: B) -> Self {
        Self::from_shared(Arc::new(backend))
    }

    /// Build a store over a backend that other stores may share.
    pub fn from_shared(backend: Arc<dyn LeaseBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            ttl: default_ttl(),
        }
    }

    /// Store backed by `<dir>/<escaped>.claim.json` files.
    pub fn open_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(FsBackend::new(dir))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Persist `lease` for `resource_id`, replacing any existing record.
    pub fn write(&self, resource_id: &str, lease: &Lease) -> Result<()> {
        let bytes = encode(resource_id, lease)?;
        self.backend.put(resource_id, &bytes)
    }

    /// Persist `lease` only if no record exists. Returns `false` on collision.
    pub fn write_new(&self, resource_id: &str, lease: &Lease) -> Result<bool> {
        let bytes = encode(resource_id, lease)?;
        self.backend.put_new(resource_id, &bytes)
    }

    /// Current valid lease for `resource_id`, if any.
    ///
    /// Expired and corrupt records are deleted as a side effect.
    pub fn read(&self, resource_id: &str) -> Result<Option<Lease>> {
        Ok(self.read_versioned(resource_id)?.map(|(lease, _)| lease))
    }

    /// Like [`read`](Self::read), also returning the stored bytes so a later
    /// [`replace_if`](Self::replace_if) or [`delete_if`](Self::delete_if)
    /// can tell whether the record changed in between.
    pub fn read_versioned(&self, resource_id: &str) -> Result<Option<(Lease, Vec<u8>)>> {
        let Some(bytes) = self.backend.get(resource_id)? else {
            return Ok(None);
        };
        match self.classify(&bytes) {
            RecordState::Valid(lease) => Ok(Some((lease, bytes))),
            state => {
                self.purge(resource_id, &bytes, &state)?;
                Ok(None)
            }
        }
    }

    /// Overwrite the record with `lease` only if it still holds `expected`.
    pub fn replace_if(&self, resource_id: &str, expected: &[u8], lease: &Lease) -> Result<bool> {
        let bytes = encode(resource_id, lease)?;
        self.backend.replace_if(resource_id, expected, &bytes)
    }

    pub fn delete(&self, resource_id: &str) -> Result<()> {
        self.backend.remove(resource_id)
    }

    /// Delete the record only if it still holds `expected`.
    pub fn delete_if(&self, resource_id: &str, expected: &[u8]) -> Result<bool> {
        self.backend.remove_if(resource_id, expected)
    }

    /// All currently valid leases, purging anything else encountered.
    pub fn list_all(&self) -> Result<Vec<(String, Lease)>> {
        let mut leases = Vec::new();
        for key in self.backend.keys()? {
            if let Some(lease) = self.read(&key)? {
                leases.push((key, lease));
            }
        }
        Ok(leases)
    }

    /// Sweep raw storage and delete every record that does not read as valid.
    ///
    /// Returns the number of records this call removed. Concurrent sweeps
    /// never double count: a record is counted by whoever deletes it.
    pub fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        for key in self.backend.keys()? {
            let Some(bytes) = self.backend.get(&key)? else {
                continue;
            };
            let state = self.classify(&bytes);
            if matches!(state, RecordState::Valid(_)) {
                continue;
            }
            if self.purge(&key, &bytes, &state)? {
                removed += 1;
            }
        }

        // Scratch files younger than a lease may belong to a write in flight.
        let scratch = self.backend.sweep_scratch(self.ttl.to_std().unwrap_or_default())?;
        if scratch > 0 {
            log::debug!("removed {} leftover scratch file(s)", scratch);
        }
        Ok(removed)
    }

    fn classify(&self, bytes: &[u8]) -> RecordState {
        match serde_json::from_slice::<Lease>(bytes) {
            Ok(lease) if lease.is_valid_at(self.now(), self.ttl) => RecordState::Valid(lease),
            Ok(lease) => RecordState::Expired(lease),
            Err(_) => RecordState::Corrupt,
        }
    }

    fn purge(&self, key: &str, bytes: &[u8], state: &RecordState) -> Result<bool> {
        let removed = self.backend.remove_if(key, bytes)?;
        if removed {
            match state {
                RecordState::Expired(lease) => log::debug!(
                    "purged expired lease on {} held by {}",
                    key,
                    lease.holder_id
                ),
                RecordState::Corrupt => log::warn!("purged unreadable lease record for {}", key),
                RecordState::Valid(_) => {}
            }
        }
        Ok(removed)
    }
}

fn encode(resource_id: &str, lease: &Lease) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(lease).map_err(|source| ClaimError::Encode {
        resource_id: resource_id.to_string(),
        source,
    })
}
