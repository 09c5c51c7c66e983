//! Timestamp codec for the two known event-log display layouts.
//!
//! Raw entries carry their generation time as display text in one of two
//! layouts: a numeric `MM/DD/YYYY HH:MM:SS` form and a locale textual
//! `Weekday Mon DD HH:MM:SS YYYY` form. Parsing dispatches on a pattern
//! match between the two and fails with [`HarvestError::TimeParse`] when
//! neither applies.
//!
//! All epoch math is naive: a parsed stamp is mapped straight onto the epoch
//! scale with no timezone conversion, and [`now_epoch`] reads the local wall
//! clock under the same convention, so ages computed as `now - parsed`
//! subtract consistently regardless of host timezone.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;

use crate::util::error::{HarvestError, Result};

/// The two timestamp text layouts a channel is known to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLayout {
    /// `MM/DD/YYYY HH:MM:SS`, e.g. `08/04/2026 13:45:00`.
    Numeric,
    /// `Weekday Mon DD HH:MM:SS YYYY`, e.g. `Tue Aug 04 13:45:00 2026`.
    Textual,
}

impl TimeLayout {
    /// The chrono format string for this layout.
    pub fn pattern(self) -> &'static str {
        match self {
            TimeLayout::Numeric => "%m/%d/%Y %H:%M:%S",
            TimeLayout::Textual => "%a %b %d %H:%M:%S %Y",
        }
    }

    /// Pick the layout a timestamp string is written in.
    ///
    /// Dispatches on the numeric shape; anything else is attempted as the
    /// textual layout (and rejected by [`parse`] if it does not conform).
    pub fn detect(text: &str) -> TimeLayout {
        static NUMERIC_SHAPE: OnceLock<Regex> = OnceLock::new();
        let re = NUMERIC_SHAPE.get_or_init(|| {
            Regex::new(r"^\d{2}/\d{2}/\d{4}\s\d{2}:\d{2}:\d{2}")
                .expect("numeric timestamp shape regex is valid")
        });
        if re.is_match(text) {
            TimeLayout::Numeric
        } else {
            TimeLayout::Textual
        }
    }
}

/// Parse a display timestamp into epoch seconds.
///
/// Deterministic: the same input text always yields the same epoch value.
///
/// # Errors
/// Returns [`HarvestError::TimeParse`] if the text matches neither layout.
pub fn parse(text: &str) -> Result<i64> {
    let text = text.trim();
    let layout = TimeLayout::detect(text);
    let naive = NaiveDateTime::parse_from_str(text, layout.pattern())
        .map_err(|_| HarvestError::TimeParse(text.to_string()))?;
    Ok(naive.and_utc().timestamp())
}

/// Render epoch seconds back to display text in the given layout.
///
/// Only the parse direction is used operationally; this exists for fixtures
/// and round-trip verification.
pub fn format(epoch_secs: i64, layout: TimeLayout) -> String {
    let dt = DateTime::from_timestamp(epoch_secs, 0).unwrap_or(DateTime::UNIX_EPOCH);
    dt.naive_utc().format(layout.pattern()).to_string()
}

/// Current wall-clock time on the same naive epoch scale [`parse`] uses.
///
/// Scan-start times for the recency-window rule must come from here, not
/// from `Utc::now`, or ages would be offset by the host timezone.
pub fn now_epoch() -> i64 {
    chrono::Local::now().naive_local().and_utc().timestamp()
}
