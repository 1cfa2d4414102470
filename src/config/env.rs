use std::env;

use super::types::Config;

pub(super) const CLAIMS_DIR_VAR: &str = "SWARM_CLAIM_DIR";
pub(super) const TTL_VAR: &str = "SWARM_CLAIM_TTL";
pub(super) const LEDGER_VAR: &str = "SWARM_CLAIM_LEDGER";
pub(super) const SLOT_DIR_VAR: &str = "SWARM_CLAIM_SLOT_DIR";

pub(super) fn apply_env(config: &mut Config) {
    apply_env_from(config, |name| env::var(name).ok());
}

/// Apply overrides from any variable source. Unparseable values are ignored.
pub(super) fn apply_env_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(CLAIMS_DIR_VAR).filter(|v| !v.is_empty()) {
        config.claims_dir = val;
    }
    if let Some(val) = lookup(TTL_VAR) {
        if let Ok(n) = val.trim().parse() {
            config.ttl_secs = n;
        }
    }
    if let Some(val) = lookup(LEDGER_VAR).filter(|v| !v.is_empty()) {
        config.ledger_path = val;
    }
    if let Some(val) = lookup(SLOT_DIR_VAR).filter(|v| !v.is_empty()) {
        config.slots.dir = val;
    }
}
