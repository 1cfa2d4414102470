//! Append-only dispatch ledger.
//!
//! Records who is working on which higher-level unit (a frontier question,
//! a task) as a markdown table:
//!
//! ```text
//! | holder | unit | status | timestamp |
//! |---|---|---|---|
//! | S1 | F-12 | in-progress | 2026-10-16T09:30:00.000Z |
//! ```
//!
//! Rows are never rewritten; a correction is a new row. The ledger is
//! advisory: it does not gate work, leases do.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ClaimError, Result};
use crate::lease::temp_suffix;

const HEADER: &str = "| holder | unit | status | timestamp |\n|---|---|---|---|\n";

static ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\|\s*([^|]+?)\s*\|\s*([^|]+?)\s*\|\s*([^|]+?)\s*\|\s*([^|]+?)\s*\|\s*$")
        .expect("ledger row regex is valid")
});

/// Lifecycle status of a dispatched unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DispatchStatus {
    InProgress,
    Done,
    Abandoned,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Done => "done",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "in-progress" | "claimed" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown dispatch status: {}", other)),
        }
    }
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEntry {
    pub holder_id: String,
    pub unit_id: String,
    pub status: DispatchStatus,
    pub timestamp: DateTime<Utc>,
}

impl DispatchEntry {
    fn to_row(&self) -> String {
        format!(
            "| {} | {} | {} | {} |\n",
            self.holder_id,
            self.unit_id,
            self.status,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// Aggregate counts over the whole ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerReport {
    pub total: usize,
    pub in_progress: usize,
    pub done: usize,
    pub abandoned: usize,
    /// Distinct units ever dispatched.
    pub units: usize,
    /// `done / (done + abandoned)`; `None` until something reaches a terminal state.
    pub completion_rate: Option<f64>,
    /// Done entries per hour between the first and last row.
    pub done_per_hour: Option<f64>,
}

/// Parse a single table row. Headers, separators and junk yield `None`.
pub fn parse_row(line: &str) -> Option<DispatchEntry> {
    let caps = ROW.captures(line.trim())?;
    let status = caps[3].parse().ok()?;
    let timestamp = DateTime::parse_from_rfc3339(&caps[4])
        .ok()?
        .with_timezone(&Utc);
    Some(DispatchEntry {
        holder_id: caps[1].to_string(),
        unit_id: caps[2].to_string(),
        status,
        timestamp,
    })
}

/// Parse every valid row, in file order.
pub fn parse_entries(content: &str) -> Vec<DispatchEntry> {
    content.lines().filter_map(parse_row).collect()
}

/// Latest entry per unit. Ties on timestamp go to the later row.
pub fn latest_per_unit(entries: &[DispatchEntry]) -> BTreeMap<&str, &DispatchEntry> {
    let mut latest: BTreeMap<&str, &DispatchEntry> = BTreeMap::new();
    for entry in entries {
        let newer = latest
            .get(entry.unit_id.as_str())
            .map_or(true, |current| entry.timestamp >= current.timestamp);
        if newer {
            latest.insert(entry.unit_id.as_str(), entry);
        }
    }
    latest
}

/// Summarise a list of entries.
pub fn build_report(entries: &[DispatchEntry]) -> LedgerReport {
    let mut report = LedgerReport {
        total: entries.len(),
        units: latest_per_unit(entries).len(),
        ..LedgerReport::default()
    };
    for entry in entries {
        match entry.status {
            DispatchStatus::InProgress => report.in_progress += 1,
            DispatchStatus::Done => report.done += 1,
            DispatchStatus::Abandoned => report.abandoned += 1,
        }
    }

    let terminal = report.done + report.abandoned;
    if terminal > 0 {
        report.completion_rate = Some(report.done as f64 / terminal as f64);
    }

    let first = entries.iter().map(|e| e.timestamp).min();
    let last = entries.iter().map(|e| e.timestamp).max();
    if let (Some(first), Some(last)) = (first, last) {
        let hours = (last - first).num_seconds() as f64 / 3600.0;
        if hours > 0.0 {
            report.done_per_hour = Some(report.done as f64 / hours);
        }
    }

    report
}

/// The shared ledger file.
#[derive(Debug, Clone)]
pub struct DispatchLedger {
    path: PathBuf,
}

impl DispatchLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row. The table header is written along with the first row.
    pub fn append_entry(
        &self,
        holder_id: &str,
        unit_id: &str,
        status: DispatchStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<DispatchEntry> {
        check_field("holder", holder_id)?;
        check_field("unit", unit_id)?;

        let entry = DispatchEntry {
            holder_id: holder_id.trim().to_string(),
            unit_id: unit_id.trim().to_string(),
            status,
            timestamp,
        };

        self.ensure_header()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ClaimError::io("failed to open ledger", &self.path, e))?;

        // One write per append so concurrent appenders do not interleave within a row.
        file.write_all(entry.to_row().as_bytes())
            .map_err(|e| ClaimError::io("failed to append to ledger", &self.path, e))?;

        Ok(entry)
    }

    /// Create the ledger holding just the table header, unless it exists.
    ///
    /// The header is written to a scratch file and linked into place, so
    /// concurrent first appenders end up with exactly one header.
    fn ensure_header(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| ClaimError::io("failed to create ledger directory", parent, e))?;
        }

        let name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("ledger");
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", name, temp_suffix()));
        fs::write(&tmp, HEADER)
            .map_err(|e| ClaimError::io("failed to write ledger header", &tmp, e))?;
        let linked = fs::hard_link(&tmp, &self.path);
        let _ = fs::remove_file(&tmp);

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => {
                log::debug!("hard link unavailable for {}: {}", self.path.display(), e);
                match OpenOptions::new().write(true).create_new(true).open(&self.path) {
                    Ok(mut file) => file
                        .write_all(HEADER.as_bytes())
                        .map_err(|e| ClaimError::io("failed to write ledger header", &self.path, e)),
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
                    Err(e) => Err(ClaimError::io("failed to create ledger", &self.path, e)),
                }
            }
        }
    }

    /// All rows in append order. A missing ledger is empty.
    pub fn entries(&self) -> Result<Vec<DispatchEntry>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse_entries(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ClaimError::io("failed to read ledger", &self.path, e)),
        }
    }

    /// Most recent entry for `unit_id`.
    pub fn latest(&self, unit_id: &str) -> Result<Option<DispatchEntry>> {
        let entries = self.entries()?;
        Ok(latest_per_unit(&entries)
            .get(unit_id.trim())
            .map(|entry| (*entry).clone()))
    }

    /// Status of the most recent entry for `unit_id`; `None` if never dispatched.
    pub fn current_status(&self, unit_id: &str) -> Result<Option<DispatchStatus>> {
        Ok(self.latest(unit_id)?.map(|entry| entry.status))
    }

    pub fn report(&self) -> Result<LedgerReport> {
        Ok(build_report(&self.entries()?))
    }

    /// Units whose latest entry is still in progress, oldest first.
    pub fn open_units(&self) -> Result<Vec<DispatchEntry>> {
        let entries = self.entries()?;
        let mut open: Vec<DispatchEntry> = latest_per_unit(&entries)
            .into_values()
            .filter(|entry| entry.status == DispatchStatus::InProgress)
            .cloned()
            .collect();
        open.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(open)
    }
}

fn check_field(field: &'static str, value: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty() || value.contains('|') || value.contains('\n') {
        return Err(ClaimError::InvalidLedgerField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn ledger() -> (TempDir, DispatchLedger) {
        let temp = TempDir::new().unwrap();
        let ledger = DispatchLedger::new(temp.path().join("logs").join("dispatch.md"));
        (temp, ledger)
    }

    #[test]
    fn test_append_writes_header_once() {
        let (_temp, ledger) = ledger();
        ledger.append_entry("S1", "F-1", DispatchStatus::InProgress, t(0)).unwrap();
        ledger.append_entry("S1", "F-1", DispatchStatus::Done, t(60)).unwrap();

        let content = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content.matches("| holder |").count(), 1);
        assert_eq!(content.lines().count(), 4);
        assert!(content.ends_with("| S1 | F-1 | done | 2026-10-16T09:01:00.000Z |\n"));
    }

    #[test]
    fn test_concurrent_first_appends_share_one_header() {
        let (_temp, ledger) = ledger();
        let writers = 8;
        let barrier = Arc::new(Barrier::new(writers));

        let handles: Vec<_> = (0..writers)
            .map(|i| {
                let ledger = ledger.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ledger
                        .append_entry(&format!("S{}", i), "F-1", DispatchStatus::InProgress, t(i as i64))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content.matches("| holder |").count(), 1, "ledger:\n{}", content);
        assert!(content.starts_with(HEADER));
        assert_eq!(ledger.entries().unwrap().len(), writers);
    }

    #[test]
    fn test_append_never_rewrites_rows() {
        let (_temp, ledger) = ledger();
        ledger.append_entry("S1", "F-1", DispatchStatus::InProgress, t(0)).unwrap();
        let before = fs::read_to_string(ledger.path()).unwrap();

        ledger.append_entry("S2", "F-2", DispatchStatus::Abandoned, t(5)).unwrap();

        let after = fs::read_to_string(ledger.path()).unwrap();
        assert!(after.starts_with(&before));
    }

    #[test]
    fn test_latest_timestamp_wins_regardless_of_order() {
        let (_temp, ledger) = ledger();
        ledger.append_entry("S2", "U", DispatchStatus::Done, t(20)).unwrap();
        ledger.append_entry("S1", "U", DispatchStatus::InProgress, t(10)).unwrap();

        assert_eq!(ledger.current_status("U").unwrap(), Some(DispatchStatus::Done));
    }

    #[test]
    fn test_timestamp_tie_goes_to_later_row() {
        let entries = vec![
            DispatchEntry {
                holder_id: "S1".into(),
                unit_id: "U".into(),
                status: DispatchStatus::InProgress,
                timestamp: t(0),
            },
            DispatchEntry {
                holder_id: "S1".into(),
                unit_id: "U".into(),
                status: DispatchStatus::Abandoned,
                timestamp: t(0),
            },
        ];
        assert_eq!(latest_per_unit(&entries)["U"].status, DispatchStatus::Abandoned);
    }

    #[test]
    fn test_unknown_unit_has_no_status() {
        let (_temp, ledger) = ledger();
        assert_eq!(ledger.current_status("F-404").unwrap(), None);
        ledger.append_entry("S1", "F-1", DispatchStatus::Done, t(0)).unwrap();
        assert_eq!(ledger.current_status("F-404").unwrap(), None);
    }

    #[test]
    fn test_report_counts_and_completion_rate() {
        let (_temp, ledger) = ledger();
        ledger.append_entry("S1", "F-1", DispatchStatus::InProgress, t(0)).unwrap();
        ledger.append_entry("S1", "F-1", DispatchStatus::Done, t(1800)).unwrap();
        ledger.append_entry("S2", "F-2", DispatchStatus::InProgress, t(60)).unwrap();
        ledger.append_entry("S2", "F-2", DispatchStatus::Abandoned, t(120)).unwrap();
        ledger.append_entry("S3", "F-3", DispatchStatus::InProgress, t(3600)).unwrap();
        ledger.append_entry("S3", "F-4", DispatchStatus::Done, t(3600)).unwrap();

        let report = ledger.report().unwrap();

        assert_eq!(report.total, 6);
        assert_eq!(report.in_progress, 3);
        assert_eq!(report.done, 2);
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.units, 4);
        let rate = report.completion_rate.unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.done_per_hour.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_without_terminal_entries_has_no_rate() {
        let (_temp, ledger) = ledger();
        ledger.append_entry("S1", "F-1", DispatchStatus::InProgress, t(0)).unwrap();

        let report = ledger.report().unwrap();

        assert_eq!(report.completion_rate, None);
        assert_eq!(report.done_per_hour, None);
    }

    #[test]
    fn test_open_units_lists_in_progress_only() {
        let (_temp, ledger) = ledger();
        ledger.append_entry("S1", "F-1", DispatchStatus::InProgress, t(30)).unwrap();
        ledger.append_entry("S2", "F-2", DispatchStatus::InProgress, t(10)).unwrap();
        ledger.append_entry("S2", "F-3", DispatchStatus::InProgress, t(0)).unwrap();
        ledger.append_entry("S2", "F-3", DispatchStatus::Done, t(40)).unwrap();

        let open: Vec<String> = ledger
            .open_units()
            .unwrap()
            .into_iter()
            .map(|e| e.unit_id)
            .collect();

        assert_eq!(open, vec!["F-2", "F-1"]);
    }

    #[test]
    fn test_parse_skips_header_separator_and_junk() {
        let content = "# Dispatch\n\
                       | holder | unit | status | timestamp |\n\
                       |---|---|---|---|\n\
                       | S1 | F-9 | done | 2026-10-16T09:00:00Z |\n\
                       | S1 | F-9 | exploded | 2026-10-16T09:00:00Z |\n\
                       | S1 | F-9 | done | yesterday |\n\
                       random prose\n";

        let entries = parse_entries(content);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].unit_id, "F-9");
        assert_eq!(entries[0].timestamp, t(0));
    }

    #[test]
    fn test_append_rejects_pipe_in_ids() {
        let (_temp, ledger) = ledger();
        let err = ledger
            .append_entry("S|1", "F-1", DispatchStatus::Done, t(0))
            .unwrap_err();
        assert!(matches!(err, ClaimError::InvalidLedgerField { field: "holder", .. }));
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            DispatchStatus::InProgress,
            DispatchStatus::Done,
            DispatchStatus::Abandoned,
        ] {
            assert_eq!(status.as_str().parse::<DispatchStatus>().unwrap(), status);
        }
        assert!("finished".parse::<DispatchStatus>().is_err());
    }
}
