//! swarm-claim: lease-based soft claims for concurrent agent sessions.
//!
//! Independent, crash-prone processes coordinate through a shared directory:
//! - `leases/` - one `<resource>.claim.json` per claimed resource, expiring after a TTL
//! - numbered slots (`memory/lessons/L-042.md`) reserved without a central counter
//! - `dispatch.md` - append-only ledger of who is working on which unit
//!
//! Nothing here blocks. A claim either succeeds or reports who holds the
//! resource; the caller decides whether to wait, move on, or investigate.

pub mod clock;
pub mod color;
pub mod config;
pub mod error;
pub mod lease;
pub mod ledger;
pub mod slot;
#[doc(hidden)]
pub mod testutil;

pub use error::{ClaimError, Result};
