//! Terminal color utilities using ANSI escape codes.
//!
//! Colors holder ids, outcomes and counts in command output. Setting
//! `NO_COLOR` turns every helper into a plain passthrough.

use once_cell::sync::Lazy;

use crate::ledger::DispatchStatus;

/// ANSI color codes
pub mod codes {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const CYAN: &str = "\x1b[36m";

    pub const BRIGHT_CYAN: &str = "\x1b[96m";
    pub const BRIGHT_MAGENTA: &str = "\x1b[95m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_BLUE: &str = "\x1b[94m";
}

use codes::*;

static ENABLED: Lazy<bool> = Lazy::new(|| std::env::var_os("NO_COLOR").is_none());

/// Palette for holder ids, picked deterministically per holder.
const HOLDER_COLORS: &[&str] = &[
    CYAN,
    MAGENTA,
    YELLOW,
    BLUE,
    BRIGHT_CYAN,
    BRIGHT_MAGENTA,
    BRIGHT_YELLOW,
    BRIGHT_BLUE,
];

fn paint(style: &str, text: &str) -> String {
    if *ENABLED {
        format!("{}{}{}", style, text, RESET)
    } else {
        text.to_string()
    }
}

/// Stable palette color for a holder id.
pub fn holder_color(holder_id: &str) -> &'static str {
    let hash = holder_id
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    HOLDER_COLORS[hash % HOLDER_COLORS.len()]
}

/// Color a holder id deterministically.
pub fn holder(holder_id: &str) -> String {
    paint(&format!("{}{}", BOLD, holder_color(holder_id)), holder_id)
}

/// Resource ids and paths (bold).
pub fn resource(text: &str) -> String {
    paint(BOLD, text)
}

/// Ages and timestamps (dim).
pub fn dim(text: &str) -> String {
    paint(DIM, text)
}

pub fn success(text: &str) -> String {
    paint(GREEN, text)
}

pub fn warning(text: &str) -> String {
    paint(YELLOW, text)
}

pub fn error(text: &str) -> String {
    paint(RED, text)
}

pub fn label(text: &str) -> String {
    paint(BOLD, text)
}

pub fn number(n: impl std::fmt::Display) -> String {
    paint(BRIGHT_CYAN, &n.to_string())
}

/// Color a dispatch status by how it ended.
pub fn status(status: DispatchStatus) -> String {
    match status {
        DispatchStatus::InProgress => paint(YELLOW, status.as_str()),
        DispatchStatus::Done => paint(&format!("{}{}", BOLD, GREEN), status.as_str()),
        DispatchStatus::Abandoned => paint(&format!("{}{}", BOLD, RED), status.as_str()),
    }
}
