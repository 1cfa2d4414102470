use std::thread;
use std::time::{Duration as StdDuration, Instant};

use rand::Rng;

use swarm_claim::color;
use swarm_claim::config::Config;
use swarm_claim::lease::{
    format_age, CheckOutcome, ClaimOutcome, LeaseManager, ReleaseOutcome, RenewOutcome,
};

use super::{describe_holder, Exit};

const WAIT_BACKOFF_START_MS: u64 = 250;
const WAIT_BACKOFF_MAX_MS: u64 = 5_000;

/// Claim a resource, optionally polling until it frees up.
pub fn cmd_claim(config: &Config, resource: &str, wait: Option<u64>) -> Result<Exit, String> {
    let manager = config.lease_manager();
    let outcome = match wait {
        Some(secs) => claim_with_wait(&manager, resource, &config.holder, secs)?,
        None => manager
            .claim(resource, &config.holder)
            .map_err(|e| e.to_string())?,
    };

    match outcome {
        ClaimOutcome::Acquired => {
            println!(
                "{} {} as {}",
                color::success("Claimed"),
                color::resource(resource),
                color::holder(&config.holder)
            );
        }
        ClaimOutcome::Refreshed => {
            println!(
                "{} {} as {} (already held, lease refreshed)",
                color::success("Claimed"),
                color::resource(resource),
                color::holder(&config.holder)
            );
        }
        ClaimOutcome::Conflict { ref holder_id, age } => {
            eprintln!(
                "{} {} is held by {}",
                color::warning("Conflict:"),
                color::resource(resource),
                describe_holder(holder_id, age)
            );
        }
        ClaimOutcome::Contended => {
            eprintln!(
                "{} {} kept changing hands; try again",
                color::warning("Contended:"),
                color::resource(resource)
            );
        }
    }

    Ok(Exit::from_success(outcome.is_success()))
}

/// Retry a claim with jittered exponential backoff until it succeeds or `secs` pass.
fn claim_with_wait(
    manager: &LeaseManager,
    resource: &str,
    holder_id: &str,
    secs: u64,
) -> Result<ClaimOutcome, String> {
    // A wait too long to represent never runs out.
    let deadline = Instant::now().checked_add(StdDuration::from_secs(secs));
    let mut backoff_ms = WAIT_BACKOFF_START_MS;
    let mut rng = rand::thread_rng();

    loop {
        let outcome = manager.claim(resource, holder_id).map_err(|e| e.to_string())?;
        let now = Instant::now();
        if outcome.is_success() || deadline.map_or(false, |deadline| now >= deadline) {
            return Ok(outcome);
        }

        let jitter = rng.gen_range(0..=backoff_ms / 2);
        let mut pause = StdDuration::from_millis(backoff_ms + jitter);
        if let Some(deadline) = deadline {
            pause = pause.min(deadline - now);
        }
        log::debug!("{} busy, retrying in {:?}", resource, pause);
        thread::sleep(pause);
        backoff_ms = (backoff_ms * 2).min(WAIT_BACKOFF_MAX_MS);
    }
}

/// Refresh a lease the caller holds.
pub fn cmd_renew(config: &Config, resource: &str) -> Result<Exit, String> {
    let outcome = config
        .lease_manager()
        .renew(resource, &config.holder)
        .map_err(|e| e.to_string())?;

    match outcome {
        RenewOutcome::Renewed => {
            println!("{} {}", color::success("Renewed"), color::resource(resource));
        }
        RenewOutcome::Reacquired => {
            println!(
                "{} {} (lease had lapsed; claimed again)",
                color::warning("Reacquired"),
                color::resource(resource)
            );
        }
        RenewOutcome::Conflict { ref holder_id, age } => {
            eprintln!(
                "{} {} now belongs to {}",
                color::warning("Lost:"),
                color::resource(resource),
                describe_holder(holder_id, age)
            );
        }
        RenewOutcome::Contended => {
            eprintln!(
                "{} {} kept changing hands; try again",
                color::warning("Contended:"),
                color::resource(resource)
            );
        }
    }

    Ok(Exit::from_success(outcome.is_success()))
}

/// Exit 0 if free, 1 if held.
pub fn cmd_check(config: &Config, resource: &str) -> Result<Exit, String> {
    let outcome = config
        .lease_manager()
        .check(resource)
        .map_err(|e| e.to_string())?;

    match outcome {
        CheckOutcome::Free => {
            println!("{} is {}", color::resource(resource), color::success("free"));
            Ok(Exit::Success)
        }
        CheckOutcome::HeldBy { ref holder_id, age } => {
            println!(
                "{} is held by {}",
                color::resource(resource),
                describe_holder(holder_id, age)
            );
            Ok(Exit::Refused)
        }
    }
}

/// Release a lease; refuses (exit 1) when someone else holds it.
pub fn cmd_release(config: &Config, resource: &str) -> Result<Exit, String> {
    let outcome = config
        .lease_manager()
        .release(resource, &config.holder)
        .map_err(|e| e.to_string())?;

    match outcome {
        ReleaseOutcome::Released => {
            println!("{} {}", color::success("Released"), color::resource(resource));
        }
        ReleaseOutcome::AlreadyFree => {
            println!("{} was already free", color::resource(resource));
        }
        ReleaseOutcome::NotOwner { ref holder_id, age } => {
            eprintln!(
                "{} {} is held by {}, not {}; lease left in place",
                color::warning("Refused:"),
                color::resource(resource),
                describe_holder(holder_id, age),
                color::holder(&config.holder)
            );
        }
    }

    Ok(Exit::from_success(outcome.is_success()))
}

/// Print active leases, newest first.
pub fn cmd_list(config: &Config) -> Result<Exit, String> {
    let manager = config.lease_manager();
    let active = manager.list_active().map_err(|e| e.to_string())?;

    println!(
        "{} ({}, ttl {}):",
        color::label("Active leases"),
        config.claims_dir,
        format_age(manager.ttl())
    );
    if active.is_empty() {
        println!("  (no active leases)");
        return Ok(Exit::Success);
    }

    let width = active
        .iter()
        .map(|lease| lease.resource_id.len())
        .max()
        .unwrap_or(0);
    for lease in &active {
        let kind = lease
            .kind
            .as_deref()
            .map(|kind| format!(" [{}]", kind))
            .unwrap_or_default();
        println!(
            "  {:<width$}  {}  {}{}",
            lease.resource_id,
            color::holder(&lease.holder_id),
            color::dim(&format_age(lease.age)),
            kind,
            width = width
        );
    }
    println!("  Total: {}", color::number(active.len()));

    Ok(Exit::Success)
}

/// Sweep expired and unreadable leases.
pub fn cmd_gc(config: &Config) -> Result<Exit, String> {
    let removed = config
        .lease_manager()
        .garbage_collect()
        .map_err(|e| e.to_string())?;
    println!("Removed {} stale lease(s)", color::number(removed));
    Ok(Exit::Success)
}
