//! Application-wide constants for EventHarvest.
//!
//! Centralising magic numbers, default file names and the fixed CSV column
//! labels here keeps the rest of the codebase clean and makes tuning
//! straightforward.

/// Number of raw entries to request per `read_backward` call.
/// Larger batches reduce per-call overhead; 200 is a good balance between
/// memory and throughput.
pub const READ_BATCH_SIZE: usize = 200;

/// How many failed batch reads a single scan tolerates before giving up.
/// A failed batch is abandoned, never re-requested; this bound only stops a
/// persistently broken handle from looping forever.
pub const MAX_READ_FAILURES: u32 = 3;

/// Channel queried when the caller does not name one.
pub const DEFAULT_CHANNEL: &str = "Security";

/// Default path of the append-only record store.
pub const DEFAULT_STORE_FILE: &str = "events.jsonl";

/// Default path of the ingestion-path CSV mirror.
pub const INGEST_CSV_FILE: &str = "read_events.csv";

/// Default path of the filter-path CSV output.
pub const FILTER_CSV_FILE: &str = "filtering_events.csv";

/// Default path of the full-store CSV export.
pub const EXPORT_CSV_FILE: &str = "event_log.csv";

/// Column labels of the ingestion-path CSV mirror.
pub const INGEST_CSV_HEADER: [&str; 9] = [
    "Event_ID",
    "Time",
    "user_name",
    "Computer",
    "Category",
    "src",
    "record",
    "event_type",
    "Text_Info",
];

/// Column labels of the filter-path CSV. Same logical columns as the
/// ingestion mirror under the variant `Text-Info` label.
pub const FILTER_CSV_HEADER: [&str; 9] = [
    "Event_ID",
    "Time",
    "user_name",
    "Computer",
    "Category",
    "src",
    "record",
    "event_type",
    "Text-Info",
];

/// Column labels of the full-store export file. Note the column order
/// differs from the ingestion mirror.
pub const EXPORT_CSV_HEADER: [&str; 9] = [
    "Event ID",
    "Time",
    "Computer",
    "Event Category",
    "Username",
    "Source",
    "Record",
    "Event Type",
    "Message",
];

/// Characters that terminate the first sentence of a formatted message.
pub const SENTENCE_TERMINATORS: [char; 3] = ['.', '?', '!'];

/// Application display name used in log banners.
pub const APP_NAME: &str = "EventHarvest";

/// Application version string.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
