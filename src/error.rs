//! Infrastructure errors.
//!
//! Logical outcomes such as a conflicting claim or a refused release are not
//! errors; they are returned as typed outcomes by the lease manager. Only
//! storage failures and exhausted slot allocation travel through here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("{context} ({}): {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode lease for {resource_id}: {source}")]
    Encode {
        resource_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid ledger {field} {value:?}: must be non-empty and free of '|' and newlines")]
    InvalidLedgerField { field: &'static str, value: String },

    #[error("slot allocation gave up after {attempts} attempt(s); last candidate was {last_candidate}")]
    SlotContention { attempts: u32, last_candidate: u64 },
}

impl ClaimError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;
