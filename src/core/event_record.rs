//! Canonical data structures for event log entries.
//!
//! [`RawEntry`] is one unprocessed record exactly as a channel backend
//! delivers it, in source-specific field layout. [`Record`] is the canonical
//! normalized representation produced by the normalizer and persisted by the
//! store. Both are serde-serializable: raw entries travel through the JSONL
//! channel backend and test fixtures, records through the store and exports.

use chrono::{DateTime, Utc};

/// Classification of an event, derived from the raw type flag.
///
/// The mapping is a fixed table over the legacy event-type flag values; any
/// flag outside the table classifies as `Unknown`. Every record carries
/// exactly one of these six values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EventType {
    /// Failed security audit (flag `0x0010`).
    AuditFailure,
    /// Successful security audit (flag `0x0008`).
    AuditSuccess,
    /// Informational event (flag `0x0004`).
    Information,
    /// Warning event (flag `0x0002`).
    Warning,
    /// Error event (flag `0x0001`).
    Error,
    /// Any flag not in the table.
    Unknown,
}

impl EventType {
    /// Classify a raw type flag via the fixed lookup table.
    pub fn from_flag(flag: u16) -> EventType {
        match flag {
            0x0010 => EventType::AuditFailure,
            0x0008 => EventType::AuditSuccess,
            0x0004 => EventType::Information,
            0x0002 => EventType::Warning,
            0x0001 => EventType::Error,
            _ => EventType::Unknown,
        }
    }

    /// Display label used in CSV output and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::AuditFailure => "AuditFailure",
            EventType::AuditSuccess => "AuditSuccess",
            EventType::Information => "Information",
            EventType::Warning => "Warning",
            EventType::Error => "Error",
            EventType::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unprocessed record as delivered by a channel, newest-first.
///
/// Field layout follows the source: the identifier is the composite
/// status/facility-coded value (qualifiers in the upper 16 bits), the type is
/// the raw flag, and the user is carried positionally in `string_inserts`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawEntry {
    /// Generation time as display text, in one of the two known layouts.
    pub time_generated: String,

    /// Composite identifier: `qualifiers << 16 | code`.
    pub event_id: u32,

    /// Raw type flag; see [`EventType::from_flag`].
    pub event_type_flag: u16,

    /// The computer the event was generated on.
    pub computer_name: String,

    /// The reporting source / provider name.
    pub source_name: String,

    /// Numeric task category as delivered.
    pub category: u16,

    /// Position of the record within the channel.
    pub record_number: u32,

    /// Fully formatted message text.
    pub message: String,

    /// Positional insertion strings; index 1 carries the user name.
    pub string_inserts: Vec<String>,
}

/// The canonical, persisted representation of one event.
///
/// Constructed transiently per raw entry by the normalizer and written once
/// to the store on the ingestion path; never updated.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Record {
    /// Generation time display string, copied from the raw entry.
    pub time: String,

    /// Epoch seconds derived from `time` (naive, no timezone conversion).
    pub timestamp_secs: i64,

    /// Numeric code: lower 16 bits of the raw composite identifier.
    pub event_id: u16,

    /// The computer the event was generated on.
    pub computer_name: String,

    /// Second positional string insert of the raw entry.
    pub user_name: String,

    /// Task category, stringified from the raw value.
    pub category: String,

    /// The reporting source / provider name.
    pub source: String,

    /// Record position, stringified from the raw value.
    pub record_number: String,

    /// Classification derived from the raw type flag.
    pub event_type: EventType,

    /// First sentence of the formatted message, terminator included.
    pub message: String,

    /// When this record was ingested; distinct from `time`.
    pub created_date: DateTime<Utc>,
}

impl Record {
    /// Row values in the ingestion/filter CSV column order
    /// (`Event_ID, Time, user_name, Computer, Category, src, record,
    /// event_type, Text_Info`).
    pub fn csv_row(&self) -> [String; 9] {
        [
            self.event_id.to_string(),
            self.time.clone(),
            self.user_name.clone(),
            self.computer_name.clone(),
            self.category.clone(),
            self.source.clone(),
            self.record_number.clone(),
            self.event_type.to_string(),
            self.message.clone(),
        ]
    }

    /// Row values in the full-store export column order
    /// (`Event ID, Time, Computer, Event Category, Username, Source, Record,
    /// Event Type, Message`).
    pub fn export_row(&self) -> [String; 9] {
        [
            self.event_id.to_string(),
            self.time.clone(),
            self.computer_name.clone(),
            self.category.clone(),
            self.user_name.clone(),
            self.source.clone(),
            self.record_number.clone(),
            self.event_type.to_string(),
            self.message.clone(),
        ]
    }
}
