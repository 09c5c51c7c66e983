//! Raw entry normalization.
//!
//! Pure transform from a source-layout [`RawEntry`] to a canonical
//! [`Record`]. Every step that can fail reports the canonical field it was
//! deriving; the caller logs, skips that entry, and continues, so a single
//! malformed entry never aborts a batch.

use chrono::Utc;

use crate::core::event_record::{EventType, RawEntry, Record};
use crate::util::constants::SENTENCE_TERMINATORS;
use crate::util::error::{HarvestError, Result};
use crate::util::time;

/// Index of the positional string insert that carries the user name.
const USER_NAME_INSERT: usize = 1;

/// Extract the numeric event code from the composite identifier.
///
/// The raw identifier is status/facility coded with qualifiers in the upper
/// 16 bits; the code is the lower 16.
pub fn event_code(composite_id: u32) -> u16 {
    (composite_id & 0xFFFF) as u16
}

/// Truncate a formatted message to its first sentence.
///
/// Returns the substring up to and including the first `.`, `?` or `!`, or
/// `None` when the text contains no terminator.
pub fn first_sentence(message: &str) -> Option<&str> {
    // Terminators are ASCII, so idx + 1 is always a char boundary.
    let idx = message.find(SENTENCE_TERMINATORS)?;
    Some(&message[..=idx])
}

/// Normalize one raw entry into a canonical [`Record`].
///
/// Steps, in order: parse the display timestamp, extract the event code,
/// classify the type flag, truncate the message to its first sentence, and
/// read the user name from string-insert index 1.
///
/// # Errors
/// [`HarvestError::TimeParse`] if the timestamp matches neither layout;
/// [`HarvestError::Normalize`] naming the failing field otherwise.
pub fn normalize(raw: &RawEntry) -> Result<Record> {
    let timestamp_secs = time::parse(&raw.time_generated)?;

    let event_id = event_code(raw.event_id);
    let event_type = EventType::from_flag(raw.event_type_flag);

    let message = first_sentence(&raw.message)
        .ok_or_else(|| HarvestError::Normalize {
            field: "message",
            detail: "no sentence terminator in formatted message".into(),
        })?
        .to_string();

    let user_name = raw
        .string_inserts
        .get(USER_NAME_INSERT)
        .cloned()
        .ok_or_else(|| HarvestError::Normalize {
            field: "user_name",
            detail: format!(
                "string insert {USER_NAME_INSERT} out of range (have {})",
                raw.string_inserts.len()
            ),
        })?;

    Ok(Record {
        time: raw.time_generated.clone(),
        timestamp_secs,
        event_id,
        computer_name: raw.computer_name.clone(),
        user_name,
        category: raw.category.to_string(),
        source: raw.source_name.clone(),
        record_number: raw.record_number.to_string(),
        event_type,
        message,
        created_date: Utc::now(),
    })
}
