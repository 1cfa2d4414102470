use std::io;
use std::path::{Path, PathBuf};

use chrono::Duration;
use thiserror::Error;

use super::cli::CliArgs;
use super::{env, toml};
use crate::lease::{default_ttl, resolve_holder, LeaseManager, LeaseStore, DEFAULT_TTL_SECS};
use crate::ledger::DispatchLedger;
use crate::slot::{DirCorpus, Slot, SlotAllocator, SlotPattern, DEFAULT_MAX_ATTEMPTS};

/// Config file read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "swarm-claim.toml";
/// Default directory for lease records.
pub const DEFAULT_CLAIMS_DIR: &str = ".swarm-claims/leases";
/// Default dispatch ledger location.
pub const DEFAULT_LEDGER_PATH: &str = ".swarm-claims/dispatch.md";

/// swarm-claim configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `<resource>.claim.json` records.
    pub claims_dir: String,
    /// Lease lifetime in seconds.
    pub ttl_secs: i64,
    /// Path to the dispatch ledger.
    pub ledger_path: String,
    /// Naming scheme for slot reservations.
    pub slots: SlotPattern,
    /// Candidates tried by `next-slot` before reporting contention.
    pub slot_max_attempts: u32,
    /// Directory the slot pattern's `dir` is relative to.
    pub corpus_root: String,
    /// Holder identity for this process.
    pub holder: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            claims_dir: DEFAULT_CLAIMS_DIR.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            ledger_path: DEFAULT_LEDGER_PATH.to_string(),
            slots: SlotPattern::lessons(),
            slot_max_attempts: DEFAULT_MAX_ATTEMPTS,
            corpus_root: ".".to_string(),
            holder: resolve_holder(None),
        }
    }
}

impl Config {
    /// Load configuration from all sources with proper precedence.
    ///
    /// Precedence: CLI args > env vars > config file > defaults. An explicit
    /// `--config` path must exist; the implicit `swarm-claim.toml` is optional.
    pub fn load(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ref path) = cli_args.config {
            toml::load_from_file(&mut config, path)?;
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            toml::load_from_file(&mut config, DEFAULT_CONFIG_FILE)?;
        }

        env::apply_env(&mut config);
        config.apply_cli(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Defaults plus env vars and CLI args, ignoring any config file.
    ///
    /// Used by `init`, which runs before a config file exists.
    pub fn load_without_file(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        env::apply_env(&mut config);
        config.apply_cli(cli_args);
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content on top of the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        toml::apply_toml(&mut config, content).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        Ok(config)
    }

    /// Apply CLI arguments.
    pub(super) fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.dir {
            self.claims_dir = dir.clone();
        }
        if let Some(ttl) = args.ttl {
            self.ttl_secs = ttl;
        }
        if let Some(ref ledger) = args.ledger {
            self.ledger_path = ledger.clone();
        }
        if args.holder.is_some() {
            self.holder = resolve_holder(args.holder.as_deref());
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs <= 0 {
            return Err(ConfigError::Invalid(format!(
                "ttl must be positive, got {}",
                self.ttl_secs
            )));
        }
        if Duration::try_seconds(self.ttl_secs).is_none() {
            return Err(ConfigError::Invalid(format!(
                "ttl of {} seconds is too large",
                self.ttl_secs
            )));
        }
        if self.claims_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("claims dir path is empty".to_string()));
        }
        if self.ledger_path.trim().is_empty() {
            return Err(ConfigError::Invalid("ledger path is empty".to_string()));
        }
        Ok(())
    }

    /// Lease lifetime. Falls back to the default for values `validate` rejects.
    pub fn ttl(&self) -> Duration {
        Duration::try_seconds(self.ttl_secs).unwrap_or_else(default_ttl)
    }

    /// Lease manager over the configured claims directory.
    pub fn lease_manager(&self) -> LeaseManager {
        LeaseManager::new(LeaseStore::open_dir(&self.claims_dir).with_ttl(self.ttl()))
    }

    /// Slot allocator over the configured corpus and claims directory.
    pub fn slot_allocator(&self) -> SlotAllocator<DirCorpus> {
        SlotAllocator::new(
            self.lease_manager(),
            DirCorpus::new(&self.corpus_root),
            self.slots.clone(),
        )
        .with_max_attempts(self.slot_max_attempts)
    }

    /// Where a reserved slot lives relative to the working directory.
    pub fn slot_path(&self, slot: &Slot) -> PathBuf {
        let root = Path::new(&self.corpus_root);
        if root == Path::new(".") || self.corpus_root.is_empty() {
            PathBuf::from(&slot.resource_id)
        } else {
            root.join(&slot.resource_id)
        }
    }

    pub fn ledger(&self) -> DispatchLedger {
        DispatchLedger::new(&self.ledger_path)
    }

    /// Generate default swarm-claim.toml content.
    pub fn default_toml() -> String {
        let slots = SlotPattern::lessons();
        format!(
            r#"# swarm-claim configuration

[leases]
dir = "{}"
ttl_secs = {}  # leases older than this are free to take

[ledger]
path = "{}"

[slots]
dir = "{}"
prefix = "{}"
width = {}
suffix = "{}"
slot_type = "{}"
max_attempts = {}
corpus_root = "."  # directory that `dir` is relative to
"#,
            DEFAULT_CLAIMS_DIR,
            DEFAULT_TTL_SECS,
            DEFAULT_LEDGER_PATH,
            slots.dir,
            slots.prefix,
            slots.width,
            slots.suffix,
            slots.slot_type,
            DEFAULT_MAX_ATTEMPTS
        )
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading config file.
    #[error("config I/O error ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Parse error in config file.
    #[error("config parse error ({path}): {source}")]
    Parse {
        path: String,
        #[source]
        source: ::toml::de::Error,
    },
    /// Values that parse but cannot be used.
    #[error("invalid config: {0}")]
    Invalid(String),
}
