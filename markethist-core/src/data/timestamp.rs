//! Parsing of the marketplace's history timestamps.
//!
//! Samples arrive as strings like `"Jul 02 2014 01: +0"`. The trailing `+0`
//! marks UTC; it is stripped and the result is kept as a naive instant that
//! the rest of the pipeline reads as UTC.

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable timestamp: {raw:?}")]
pub struct NotParseable {
    pub raw: String,
}

/// Clean up the known quirks before format matching.
fn clean(raw: &str) -> String {
    let mut ts = raw.trim();
    if let Some(stripped) = ts.strip_suffix("+0") {
        ts = stripped.trim();
    }
    let mut ts = ts.replace("  ", " ");
    if ts.ends_with(':') {
        ts.pop();
    }
    ts
}

/// Parse a raw history timestamp.
///
/// Formats tried in order: `Mon DD YYYY HH`, `Mon DD YYYY HH:MM`,
/// `YYYY-MM-DD HH:MM:SS`.
pub fn parse_history_timestamp(raw: &str) -> Result<NaiveDateTime, NotParseable> {
    let ts = clean(raw);

    // chrono needs a minute field, so the hour-only form gets ":00" appended.
    let parsed = NaiveDateTime::parse_from_str(&format!("{ts}:00"), "%b %d %Y %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(&ts, "%b %d %Y %H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(&ts, "%Y-%m-%d %H:%M:%S"));

    parsed.map_err(|_| NotParseable {
        raw: raw.to_string(),
    })
}
