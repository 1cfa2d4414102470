use clap::{Parser, Subcommand};

/// CLI arguments parsed from command line.
#[derive(Debug, Parser)]
#[command(
    name = "swarm-claim",
    version,
    about = "Lease-based soft claims for concurrent agent sessions",
    after_help = "Exit codes: 0 success, 1 refused (held, conflict, not owner), 2 error.\n\
                  Holder identity: --holder, else $SESSION_ID, else pid-<process id>."
)]
pub struct CliArgs {
    /// Path to config file (default: swarm-claim.toml if present).
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<String>,
    /// Directory holding lease records.
    #[arg(long, global = true, value_name = "DIR")]
    pub dir: Option<String>,
    /// Lease lifetime in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub ttl: Option<i64>,
    /// Holder identity for this invocation.
    #[arg(long, global = true, value_name = "ID")]
    pub holder: Option<String>,
    /// Path to the dispatch ledger.
    #[arg(long, global = true, value_name = "PATH")]
    pub ledger: Option<String>,
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// swarm-claim subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Write a default swarm-claim.toml.
    Init,
    /// Claim a resource (exit 1 if someone else holds it).
    Claim {
        resource: String,
        /// Keep retrying for up to SECS seconds before giving up.
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },
    /// Refresh a lease you hold.
    Renew { resource: String },
    /// Exit 0 if the resource is free, 1 if held.
    Check { resource: String },
    /// Release a lease you hold (exit 1 if held by someone else).
    Release { resource: String },
    /// List active leases, newest first.
    List,
    /// Delete expired and unreadable lease records.
    Gc,
    /// Reserve the next numbered slot and print its path.
    NextSlot,
    /// Record and inspect work-unit dispatch.
    Dispatch {
        #[command(subcommand)]
        action: DispatchCommand,
    },
}

/// Dispatch ledger subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum DispatchCommand {
    /// Record that you started a unit.
    Claim { unit: String },
    /// Record that you finished a unit.
    Done { unit: String },
    /// Record that you gave up on a unit.
    Abandon { unit: String },
    /// Show the current status of a unit (exit 1 if never dispatched).
    Status { unit: String },
    /// Units currently in progress.
    Open,
    /// Totals, status counts and completion rate.
    Report,
}

/// Parse CLI arguments from an iterator (first item is the program name).
pub fn parse_args<I, T>(args: I) -> Result<CliArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    CliArgs::try_parse_from(args)
}
