use swarm_claim::color;
use swarm_claim::config::Config;
use swarm_claim::ClaimError;

use super::Exit;

/// Reserve the next numbered slot.
///
/// Prints only the slot path on stdout so scripts can capture it; anything
/// else goes to stderr.
pub fn cmd_next_slot(config: &Config) -> Result<Exit, String> {
    match config.slot_allocator().next_slot(&config.holder) {
        Ok(slot) => {
            println!("{}", config.slot_path(&slot).display());
            Ok(Exit::Success)
        }
        Err(e @ ClaimError::SlotContention { .. }) => {
            eprintln!("{} {}", color::warning("Contended:"), e);
            Ok(Exit::Refused)
        }
        Err(e) => Err(e.to_string()),
    }
}
