//! Slot allocation without a central counter.
//!
//! The next slot is `max(highest committed record, highest live reservation) + 1`,
//! recomputed on every call. Reservations are ordinary leases tagged with the
//! pattern's slot type, so a crashed allocator's slot frees itself after the
//! TTL. Gaps left by abandoned reservations are never backfilled.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ClaimError, Result};
use crate::lease::{ClaimOutcome, LeaseManager};

/// Default number of candidates tried before reporting contention.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Naming scheme for numbered records, e.g. `memory/lessons/L-042.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPattern {
    /// Directory holding committed records, relative to the corpus root.
    pub dir: String,
    pub prefix: String,
    /// Minimum digits; indices are zero padded to this width.
    pub width: usize,
    pub suffix: String,
    /// Tag written on reservation leases.
    pub slot_type: String,
}

impl SlotPattern {
    /// The lesson corpus: `memory/lessons/L-NNN.md`.
    pub fn lessons() -> Self {
        Self {
            dir: "memory/lessons".to_string(),
            prefix: "L-".to_string(),
            width: 3,
            suffix: ".md".to_string(),
            slot_type: "lesson".to_string(),
        }
    }

    pub fn file_name(&self, index: u64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.suffix,
            width = self.width
        )
    }

    /// Resource id used for the reservation lease of `index`.
    pub fn resource_id(&self, index: u64) -> String {
        let dir = self.dir.trim_end_matches('/');
        if dir.is_empty() {
            self.file_name(index)
        } else {
            format!("{}/{}", dir, self.file_name(index))
        }
    }

    /// Index encoded in a record file name, if it follows this pattern.
    ///
    /// # Examples
    /// ```
    /// use swarm_claim::slot::SlotPattern;
    ///
    /// let lessons = SlotPattern::lessons();
    /// assert_eq!(lessons.parse_file_name("L-042.md"), Some(42));
    /// assert_eq!(lessons.parse_file_name("L-042.md.bak"), None);
    /// ```
    pub fn parse_file_name(&self, name: &str) -> Option<u64> {
        let digits = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Index encoded in a reservation resource id, if it belongs to this pattern.
    pub fn parse_resource_id(&self, resource_id: &str) -> Option<u64> {
        let (dir, name) = match resource_id.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", resource_id),
        };
        if dir != self.dir.trim_end_matches('/') {
            return None;
        }
        self.parse_file_name(name)
    }
}

impl Default for SlotPattern {
    fn default() -> Self {
        Self::lessons()
    }
}

/// Source of already committed records.
pub trait SlotCorpus {
    /// Highest index present, or 0 when there are none.
    fn highest_index(&self, pattern: &SlotPattern) -> Result<u64>;
}

/// Committed records are files under `<root>/<pattern.dir>`.
#[derive(Debug, Clone)]
pub struct DirCorpus {
    root: PathBuf,
}

impl DirCorpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SlotCorpus for DirCorpus {
    fn highest_index(&self, pattern: &SlotPattern) -> Result<u64> {
        let dir = self.root.join(&pattern.dir);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ClaimError::io("failed to scan slot corpus", dir, e)),
        };

        let mut highest = 0;
        for entry in entries {
            let entry = entry.map_err(|e| ClaimError::io("failed to scan slot corpus", &dir, e))?;
            if let Some(index) = entry
                .file_name()
                .to_str()
                .and_then(|name| pattern.parse_file_name(name))
            {
                highest = highest.max(index);
            }
        }
        Ok(highest)
    }
}

/// A reserved slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: u64,
    /// Reservation lease id, also the path the record should be written to.
    pub resource_id: String,
}

/// Hands out increasing slot indices to concurrent callers.
pub struct SlotAllocator<C: SlotCorpus> {
    manager: LeaseManager,
    corpus: C,
    pattern: SlotPattern,
    max_attempts: u32,
}

impl<C: SlotCorpus> SlotAllocator<C> {
    pub fn new(manager: LeaseManager, corpus: C, pattern: SlotPattern) -> Self {
        Self {
            manager,
            corpus,
            pattern,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Cap the number of candidates tried per call (at least one).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn pattern(&self) -> &SlotPattern {
        &self.pattern
    }

    /// Highest index that is committed or currently reserved.
    pub fn highest_taken(&self) -> Result<u64> {
        let max_existing = self.corpus.highest_index(&self.pattern)?;
        let max_claimed = self
            .manager
            .list_kind(&self.pattern.slot_type)?
            .iter()
            .filter_map(|(resource_id, _)| self.pattern.parse_resource_id(resource_id))
            .fold(max_existing, u64::max);
        Ok(max_claimed)
    }

    /// Reserve the next free slot for `holder_id`.
    ///
    /// Losing a race moves on to the next index; after `max_attempts` losses
    /// the call fails with [`ClaimError::SlotContention`].
    pub fn next_slot(&self, holder_id: &str) -> Result<Slot> {
        let highest = self.highest_taken()?;
        let mut candidate = highest.checked_add(1).ok_or(ClaimError::SlotContention {
            attempts: 0,
            last_candidate: highest,
        })?;

        for attempt in 1..=self.max_attempts {
            let resource_id = self.pattern.resource_id(candidate);
            match self.manager.claim_tagged(
                &resource_id,
                holder_id,
                Some(self.pattern.slot_type.as_str()),
            )? {
                ClaimOutcome::Acquired | ClaimOutcome::Refreshed => {
                    log::debug!("{} reserved slot {}", holder_id, resource_id);
                    return Ok(Slot {
                        index: candidate,
                        resource_id,
                    });
                }
                ClaimOutcome::Conflict { holder_id: other, .. } => {
                    log::debug!(
                        "slot {} taken by {} (attempt {}), advancing",
                        resource_id,
                        other,
                        attempt
                    );
                }
                ClaimOutcome::Contended => {
                    log::debug!("slot {} contended (attempt {}), advancing", resource_id, attempt);
                }
            }
            if attempt == self.max_attempts {
                break;
            }
            // Index space exhausted.
            candidate = candidate.checked_add(1).ok_or(ClaimError::SlotContention {
                attempts: attempt,
                last_candidate: candidate,
            })?;
        }

        Err(ClaimError::SlotContention {
            attempts: self.max_attempts,
            last_candidate: candidate,
        })
    }
}
