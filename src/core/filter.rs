//! Predicate scanning over a live channel stream.
//!
//! [`FilterCriteria`] holds five independently optional predicates;
//! [`FilterEngine`] applies them to a [`LogSource`] stream newest-first,
//! with checks ordered cheapest-first for short-circuit efficiency and a
//! recency-window rule that terminates the whole scan: because entries
//! arrive newest-first, the first entry older than the window proves every
//! remaining entry is older still.
//!
//! Matches are normalized fully and mirrored to the filter CSV sink only —
//! the filter path never writes to the record store.

use crate::core::event_record::{EventType, RawEntry};
use crate::core::log_source::LogSource;
use crate::core::normalizer::{self, event_code};
use crate::export::csv_sink::CsvSink;
use crate::util::constants::{MAX_READ_FAILURES, READ_BATCH_SIZE};
use crate::util::error::Result;
use crate::util::time;

/// Event id of a successful interactive logon.
pub const LOGON_SUCCESS_ID: u16 = 4624;

/// Event id of a failed logon attempt.
pub const LOGON_FAILURE_ID: u16 = 4625;

/// The optional predicate set applied per raw entry.
///
/// All fields default to `None` (pass all). `Some` turns the predicate on:
/// list predicates accept membership, string predicates accept equality.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FilterCriteria {
    /// Accepted classifications, from the raw type flag.
    pub event_types: Option<Vec<EventType>>,

    /// Accepted numeric codes (lower 16 bits of the composite identifier).
    pub event_ids: Option<Vec<u16>>,

    /// Exact computer name to accept.
    pub computer_name: Option<String>,

    /// Exact user name (string-insert index 1) to accept. An entry with no
    /// such insert is a mismatch while this predicate is active.
    pub user_name: Option<String>,

    /// Maximum age in seconds relative to scan start. Exceeding it stops
    /// the scan entirely rather than skipping the entry.
    pub seconds_window: Option<i64>,
}

impl FilterCriteria {
    /// Successful logons: AuditSuccess, id 4624.
    pub fn logon_success() -> Self {
        Self {
            event_types: Some(vec![EventType::AuditSuccess]),
            event_ids: Some(vec![LOGON_SUCCESS_ID]),
            ..Self::default()
        }
    }

    /// Failed logon attempts: AuditFailure, id 4625.
    pub fn logon_failure() -> Self {
        Self {
            event_types: Some(vec![EventType::AuditFailure]),
            event_ids: Some(vec![LOGON_FAILURE_ID]),
            ..Self::default()
        }
    }

    /// Both logon outcomes together.
    pub fn logon_activity() -> Self {
        Self {
            event_types: Some(vec![EventType::AuditSuccess, EventType::AuditFailure]),
            event_ids: Some(vec![LOGON_SUCCESS_ID, LOGON_FAILURE_ID]),
            ..Self::default()
        }
    }

    /// Test whether a raw entry passes every active predicate except the
    /// recency window (which is a scan-termination rule, not a skip).
    ///
    /// Checks run in fixed order, cheapest first: type, id, computer, user.
    pub fn matches_raw(&self, raw: &RawEntry) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.contains(&EventType::from_flag(raw.event_type_flag)) {
                return false;
            }
        }

        if let Some(ref ids) = self.event_ids {
            if !ids.contains(&event_code(raw.event_id)) {
                return false;
            }
        }

        if let Some(ref computer) = self.computer_name {
            if raw.computer_name != *computer {
                return false;
            }
        }

        if let Some(ref user) = self.user_name {
            if raw.string_inserts.get(1).map(String::as_str) != Some(user.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Result of one filter scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOutcome {
    /// Entries that passed all predicates and were written to the sink.
    pub matched: usize,
    /// Entries examined before the scan ended.
    pub scanned: usize,
    /// Whether the recency window terminated the scan before exhaustion.
    pub stopped_early: bool,
}

/// Scans an open [`LogSource`] against a criteria set, mirroring matches to
/// a CSV sink.
pub struct FilterEngine<'a> {
    criteria: FilterCriteria,
    sink: &'a CsvSink,
}

impl<'a> FilterEngine<'a> {
    /// Build an engine over injected collaborators.
    pub fn new(criteria: FilterCriteria, sink: &'a CsvSink) -> Self {
        Self { criteria, sink }
    }

    /// Scan `source` (already open) to exhaustion or to the recency-window
    /// early exit.
    ///
    /// Per-entry failures (unparseable timestamp, normalization, sink write)
    /// are logged and skipped; failed batch reads are abandoned, up to
    /// [`MAX_READ_FAILURES`] per scan.
    pub fn scan(&self, source: &mut dyn LogSource) -> Result<ScanOutcome> {
        let begin_secs = time::now_epoch();
        let mut outcome = ScanOutcome::default();
        let mut read_failures = 0u32;

        'scan: loop {
            let batch = match source.read_backward(READ_BATCH_SIZE) {
                Ok(batch) => batch,
                Err(e) => {
                    read_failures += 1;
                    tracing::warn!(
                        "Abandoning batch ({read_failures}/{MAX_READ_FAILURES}): {e}"
                    );
                    if read_failures >= MAX_READ_FAILURES {
                        break;
                    }
                    continue;
                }
            };
            if batch.is_empty() {
                break;
            }

            for raw in &batch {
                outcome.scanned += 1;

                if !self.criteria.matches_raw(raw) {
                    continue;
                }

                let entry_secs = match time::parse(&raw.time_generated) {
                    Ok(secs) => secs,
                    Err(e) => {
                        tracing::warn!("Skipping record {}: {e}", raw.record_number);
                        continue;
                    }
                };

                // Newest-first: one entry beyond the window proves the rest
                // of the stream is beyond it too.
                if let Some(window) = self.criteria.seconds_window {
                    if entry_secs < begin_secs - window {
                        outcome.stopped_early = true;
                        break 'scan;
                    }
                }

                let record = match normalizer::normalize(raw) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!("Skipping record {}: {e}", raw.record_number);
                        continue;
                    }
                };

                if let Err(e) = self.sink.append(&record.csv_row()) {
                    tracing::warn!("Dropping matched record {}: {e}", raw.record_number);
                    continue;
                }
                outcome.matched += 1;
            }
        }

        tracing::info!(
            "Filter scan done: {} matched of {} scanned{}",
            outcome.matched,
            outcome.scanned,
            if outcome.stopped_early {
                " (stopped at recency window)"
            } else {
                ""
            }
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(flag: u16, id: u32, computer: &str, user: &str) -> RawEntry {
        RawEntry {
            time_generated: "08/04/2026 13:45:00".into(),
            event_id: id,
            event_type_flag: flag,
            computer_name: computer.into(),
            source_name: "Security-Auditing".into(),
            category: 0,
            record_number: 1,
            message: "Logged on.".into(),
            string_inserts: vec!["S-1-5-18".into(), user.into()],
        }
    }

    #[test]
    fn test_default_criteria_match_all() {
        let c = FilterCriteria::default();
        assert!(c.matches_raw(&raw(0x0008, 4624, "PC-1", "alice")));
        assert!(c.matches_raw(&raw(0x0000, 0, "", "")));
    }

    #[test]
    fn test_type_predicate() {
        let c = FilterCriteria {
            event_types: Some(vec![EventType::AuditFailure]),
            ..Default::default()
        };
        assert!(c.matches_raw(&raw(0x0010, 4625, "PC-1", "alice")));
        assert!(!c.matches_raw(&raw(0x0008, 4625, "PC-1", "alice")));
    }

    #[test]
    fn test_id_predicate_uses_extracted_code() {
        let c = FilterCriteria {
            event_ids: Some(vec![4624]),
            ..Default::default()
        };
        // Qualifiers in the upper 16 bits must not defeat the match.
        assert!(c.matches_raw(&raw(0x0008, 0x0002_1210, "PC-1", "alice")));
        assert!(!c.matches_raw(&raw(0x0008, 4625, "PC-1", "alice")));
    }

    #[test]
    fn test_computer_and_user_predicates() {
        let c = FilterCriteria {
            computer_name: Some("PC-1".into()),
            user_name: Some("alice".into()),
            ..Default::default()
        };
        assert!(c.matches_raw(&raw(0x0008, 1, "PC-1", "alice")));
        assert!(!c.matches_raw(&raw(0x0008, 1, "PC-2", "alice")));
        assert!(!c.matches_raw(&raw(0x0008, 1, "PC-1", "bob")));
    }

    #[test]
    fn test_missing_user_insert_is_mismatch() {
        let c = FilterCriteria {
            user_name: Some("alice".into()),
            ..Default::default()
        };
        let mut entry = raw(0x0008, 1, "PC-1", "alice");
        entry.string_inserts.truncate(1);
        assert!(!c.matches_raw(&entry));
    }

    #[test]
    fn test_logon_presets() {
        let success = FilterCriteria::logon_success();
        assert!(success.matches_raw(&raw(0x0008, 4624, "PC-1", "alice")));
        assert!(!success.matches_raw(&raw(0x0010, 4625, "PC-1", "alice")));

        let failure = FilterCriteria::logon_failure();
        assert!(failure.matches_raw(&raw(0x0010, 4625, "PC-1", "alice")));

        let both = FilterCriteria::logon_activity();
        assert!(both.matches_raw(&raw(0x0008, 4624, "PC-1", "alice")));
        assert!(both.matches_raw(&raw(0x0010, 4625, "PC-1", "alice")));
        assert!(!both.matches_raw(&raw(0x0004, 7036, "PC-1", "alice")));
    }
}
