use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::types::{Config, ConfigError};

/// On-disk shape of swarm-claim.toml. Every key is optional; unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    leases: LeasesSection,
    ledger: LedgerSection,
    slots: SlotsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LeasesSection {
    dir: Option<String>,
    ttl_secs: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LedgerSection {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlotsSection {
    dir: Option<String>,
    prefix: Option<String>,
    width: Option<usize>,
    suffix: Option<String>,
    slot_type: Option<String>,
    max_attempts: Option<u32>,
    corpus_root: Option<String>,
}

pub(super) fn load_from_file<P: AsRef<Path>>(config: &mut Config, path: P) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    apply_toml(config, &content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub(super) fn apply_toml(config: &mut Config, content: &str) -> Result<(), ::toml::de::Error> {
    let file: FileConfig = ::toml::from_str(content)?;

    if let Some(dir) = file.leases.dir {
        config.claims_dir = dir;
    }
    if let Some(ttl) = file.leases.ttl_secs {
        config.ttl_secs = ttl;
    }
    if let Some(path) = file.ledger.path {
        config.ledger_path = path;
    }

    let slots = file.slots;
    if let Some(dir) = slots.dir {
        config.slots.dir = dir;
    }
    if let Some(prefix) = slots.prefix {
        config.slots.prefix = prefix;
    }
    if let Some(width) = slots.width {
        config.slots.width = width;
    }
    if let Some(suffix) = slots.suffix {
        config.slots.suffix = suffix;
    }
    if let Some(slot_type) = slots.slot_type {
        config.slots.slot_type = slot_type;
    }
    if let Some(max_attempts) = slots.max_attempts {
        config.slot_max_attempts = max_attempts;
    }
    if let Some(root) = slots.corpus_root {
        config.corpus_root = root;
    }

    Ok(())
}
