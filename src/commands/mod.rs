pub mod dispatch;
pub mod init;
pub mod leases;
pub mod slots;

pub use dispatch::cmd_dispatch;
pub use init::cmd_init;
pub use leases::{cmd_check, cmd_claim, cmd_gc, cmd_list, cmd_release, cmd_renew};
pub use slots::cmd_next_slot;

use chrono::Duration;

use swarm_claim::color;
use swarm_claim::lease::format_age;

/// How a command finished, short of an infrastructure error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    /// A logical refusal: held, conflicting, not the owner, never dispatched.
    Refused,
}

impl Exit {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Refused => 1,
        }
    }

    pub fn from_success(ok: bool) -> Self {
        if ok {
            Self::Success
        } else {
            Self::Refused
        }
    }
}

/// "S1 (claimed 42s ago)"
pub(crate) fn describe_holder(holder_id: &str, age: Duration) -> String {
    format!(
        "{} {}",
        color::holder(holder_id),
        color::dim(&format!("(claimed {} ago)", format_age(age)))
    )
}
