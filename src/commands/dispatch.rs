use chrono::{SecondsFormat, Utc};

use swarm_claim::color;
use swarm_claim::config::{Config, DispatchCommand};
use swarm_claim::lease::format_age;
use swarm_claim::ledger::{DispatchLedger, DispatchStatus};

use super::Exit;

/// Run a dispatch ledger subcommand.
pub fn cmd_dispatch(config: &Config, action: &DispatchCommand) -> Result<Exit, String> {
    let ledger = config.ledger();
    match action {
        DispatchCommand::Claim { unit } => record(config, &ledger, unit, DispatchStatus::InProgress),
        DispatchCommand::Done { unit } => record(config, &ledger, unit, DispatchStatus::Done),
        DispatchCommand::Abandon { unit } => {
            record(config, &ledger, unit, DispatchStatus::Abandoned)
        }
        DispatchCommand::Status { unit } => status(&ledger, unit),
        DispatchCommand::Open => open(&ledger),
        DispatchCommand::Report => report(&ledger),
    }
}

fn record(
    config: &Config,
    ledger: &DispatchLedger,
    unit: &str,
    status: DispatchStatus,
) -> Result<Exit, String> {
    // Advisory only: warn about overlap but still record the intent.
    if status == DispatchStatus::InProgress {
        if let Some(latest) = ledger.latest(unit).map_err(|e| e.to_string())? {
            if latest.status == DispatchStatus::InProgress && latest.holder_id != config.holder {
                eprintln!(
                    "{} {} is already in progress by {}",
                    color::warning("warning:"),
                    color::resource(unit),
                    color::holder(&latest.holder_id)
                );
            }
        }
    }

    let entry = ledger
        .append_entry(&config.holder, unit, status, Utc::now())
        .map_err(|e| e.to_string())?;
    println!(
        "{} {} {} ({})",
        color::holder(&entry.holder_id),
        color::status(entry.status),
        color::resource(&entry.unit_id),
        ledger.path().display()
    );
    Ok(Exit::Success)
}

fn status(ledger: &DispatchLedger, unit: &str) -> Result<Exit, String> {
    match ledger.latest(unit).map_err(|e| e.to_string())? {
        Some(entry) => {
            println!(
                "{}: {} by {} at {}",
                color::resource(&entry.unit_id),
                color::status(entry.status),
                color::holder(&entry.holder_id),
                color::dim(&entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
            );
            Ok(Exit::Success)
        }
        None => {
            println!("{}: never dispatched", color::resource(unit));
            Ok(Exit::Refused)
        }
    }
}

fn open(ledger: &DispatchLedger) -> Result<Exit, String> {
    let open = ledger.open_units().map_err(|e| e.to_string())?;
    println!("{} ({}):", color::label("Units in progress"), ledger.path().display());
    if open.is_empty() {
        println!("  (none)");
        return Ok(Exit::Success);
    }

    let now = Utc::now();
    for entry in &open {
        println!(
            "  {}  {}  {}",
            color::resource(&entry.unit_id),
            color::holder(&entry.holder_id),
            color::dim(&format!("{} ago", format_age(now - entry.timestamp)))
        );
    }
    Ok(Exit::Success)
}

fn report(ledger: &DispatchLedger) -> Result<Exit, String> {
    let report = ledger.report().map_err(|e| e.to_string())?;

    println!("{} ({}):", color::label("Dispatch Report"), ledger.path().display());
    println!("  Entries:     {}", color::number(report.total));
    println!("  Units:       {}", color::number(report.units));
    println!("  In progress: {}", color::number(report.in_progress));
    println!("  Done:        {}", color::number(report.done));
    println!("  Abandoned:   {}", color::number(report.abandoned));
    match report.completion_rate {
        Some(rate) => println!("  Completion:  {}", color::number(format!("{:.1}%", rate * 100.0))),
        None => println!("  Completion:  n/a"),
    }
    if let Some(per_hour) = report.done_per_hour {
        println!("  Throughput:  {} done/hour", color::number(format!("{:.2}", per_hour)));
    }

    Ok(Exit::Success)
}
