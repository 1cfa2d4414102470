//! Configuration loading for swarm-claim.
//!
//! Supports swarm-claim.toml, CLI flags, and environment variables.
//! Precedence (highest to lowest): CLI flags > env vars > config file > defaults.

mod cli;
mod env;
mod toml;
mod types;

pub use cli::{parse_args, CliArgs, Command, DispatchCommand};
pub use types::{
    Config, ConfigError, DEFAULT_CLAIMS_DIR, DEFAULT_CONFIG_FILE, DEFAULT_LEDGER_PATH,
};

#[cfg(test)]
mod tests;
