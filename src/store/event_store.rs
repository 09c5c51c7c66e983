//! Append-only record store with read-side queries.
//!
//! Records are persisted as one JSON line each in an append-only file.
//! Writes are insert-only: no update, no delete, no deduplication —
//! re-ingesting the same underlying log range produces duplicate rows, a
//! known limitation of the observed design.
//!
//! The read side scans the file per query. Lines that fail to deserialize
//! are logged and skipped, never fatal: a corrupt line is one bad record,
//! not a broken store.

use std::cmp::Reverse;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};

use crate::core::event_record::Record;
use crate::util::error::{HarvestError, Result};

/// Preset windows over `created_date`, newest-anchored at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    /// The last eight hours, anchored to the start of the hour.
    EightHours,
    /// The current calendar day.
    OneDay,
    /// The current week, Monday through today.
    Week,
    /// The current calendar month.
    Month,
    /// No bound.
    AllPeriod,
}

impl TimeRange {
    /// Inclusive bounds of this range relative to `now`.
    pub fn bounds(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = now.date_naive();
        match self {
            TimeRange::EightHours => {
                let then = now - Duration::hours(8);
                let start = then
                    .with_minute(0)
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))
                    .unwrap_or(then);
                (start, now)
            }
            TimeRange::OneDay => (day_start(today), day_end(today)),
            TimeRange::Week => {
                let monday =
                    today - Duration::days(today.weekday().num_days_from_monday() as i64);
                (day_start(monday), day_end(today))
            }
            TimeRange::Month => {
                let first = today - Duration::days(today.day0() as i64);
                let into_next = first + Duration::days(32);
                let first_of_next = into_next - Duration::days(into_next.day0() as i64);
                (day_start(first), day_start(first_of_next) - Duration::seconds(1))
            }
            TimeRange::AllPeriod => (DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC),
        }
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::seconds(86_399)
}

/// Descending sort key for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderBy {
    /// Newest ingested first.
    #[default]
    CreatedDate,
    /// Newest generated first.
    Timestamp,
}

/// Field filters and ordering for a store query. All filters optional.
#[derive(Debug, Clone, Default)]
pub struct StoreQuery {
    /// Exact numeric event code.
    pub event_id: Option<u16>,
    /// Exact computer name.
    pub computer_name: Option<String>,
    /// Exact user name.
    pub user_name: Option<String>,
    /// Bound on `created_date`.
    pub created_within: Option<TimeRange>,
    /// Result ordering, always descending.
    pub order: OrderBy,
}

/// Append-only persistence of normalized [`Record`]s.
pub struct EventStore {
    path: PathBuf,
}

impl EventStore {
    /// Create a store backed by `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert one record. Insert-only; a failure affects this record alone
    /// and the enclosing scan is expected to log and continue.
    ///
    /// # Errors
    /// [`HarvestError::Persistence`] if serialization or the write fails.
    pub fn append(&self, record: &Record) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| HarvestError::Persistence(format!("{}: {e}", parent.display())))?;
            }
        }

        let line = serde_json::to_string(record)
            .map_err(|e| HarvestError::Persistence(format!("record did not serialize: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HarvestError::Persistence(format!("{}: {e}", self.path.display())))?;
        writeln!(file, "{line}")
            .map_err(|e| HarvestError::Persistence(format!("{}: {e}", self.path.display())))?;
        file.sync_all()
            .map_err(|e| HarvestError::Persistence(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    /// All records, ordered descending.
    pub fn query_all(&self, order: OrderBy) -> Result<Vec<Record>> {
        self.query(&StoreQuery {
            order,
            ..StoreQuery::default()
        })
    }

    /// Records with the given numeric event code, newest ingested first.
    pub fn query_by_event_id(&self, code: u16) -> Result<Vec<Record>> {
        self.query(&StoreQuery {
            event_id: Some(code),
            ..StoreQuery::default()
        })
    }

    /// Records matching every active filter, ordered descending.
    pub fn query(&self, query: &StoreQuery) -> Result<Vec<Record>> {
        let mut records = self.load()?;

        if let Some(code) = query.event_id {
            records.retain(|r| r.event_id == code);
        }
        if let Some(ref computer) = query.computer_name {
            records.retain(|r| r.computer_name == *computer);
        }
        if let Some(ref user) = query.user_name {
            records.retain(|r| r.user_name == *user);
        }
        if let Some(range) = query.created_within {
            let (start, end) = range.bounds(Utc::now());
            records.retain(|r| r.created_date >= start && r.created_date <= end);
        }

        match query.order {
            OrderBy::CreatedDate => records.sort_by_key(|r| Reverse(r.created_date)),
            OrderBy::Timestamp => records.sort_by_key(|r| Reverse(r.timestamp_secs)),
        }
        Ok(records)
    }

    /// Read every stored record in file (append) order.
    fn load(&self) -> Result<Vec<Record>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        "Skipping corrupt store line {}:{}: {e}",
                        self.path.display(),
                        line_no + 1
                    );
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_record::EventType;
    use chrono::TimeZone;

    fn record(code: u16, user: &str, created: DateTime<Utc>) -> Record {
        Record {
            time: "08/04/2026 13:45:00".into(),
            timestamp_secs: 1_000,
            event_id: code,
            computer_name: "WKS-07".into(),
            user_name: user.into(),
            category: "2".into(),
            source: "Security-Auditing".into(),
            record_number: "1".into(),
            event_type: EventType::AuditSuccess,
            message: "Logged on.".into(),
            created_date: created,
        }
    }

    #[test]
    fn test_append_then_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("events.jsonl"));
        let now = Utc::now();
        store.append(&record(4624, "alice", now)).unwrap();
        store.append(&record(4625, "bob", now)).unwrap();

        assert_eq!(store.count().unwrap(), 2);
        let failures = store.query_by_event_id(4625).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].user_name, "bob");
    }

    #[test]
    fn test_query_field_filters_combine() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("events.jsonl"));
        let now = Utc::now();
        store.append(&record(4624, "alice", now)).unwrap();
        store.append(&record(4624, "bob", now)).unwrap();

        let q = StoreQuery {
            event_id: Some(4624),
            user_name: Some("alice".into()),
            ..Default::default()
        };
        let hits = store.query(&q).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_name, "alice");
    }

    #[test]
    fn test_corrupt_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let store = EventStore::new(&path);
        store.append(&record(1, "alice", Utc::now())).unwrap();
        {
            use std::io::Write as _;
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "{{ not a record").unwrap();
        }
        store.append(&record(2, "bob", Utc::now())).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("never-written.jsonl"));
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.query_all(OrderBy::CreatedDate).unwrap().is_empty());
    }

    #[test]
    fn test_ordering_descends() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("events.jsonl"));
        let older = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap();
        store.append(&record(1, "alice", older)).unwrap();
        store.append(&record(2, "bob", newer)).unwrap();

        let all = store.query_all(OrderBy::CreatedDate).unwrap();
        assert_eq!(all[0].event_id, 2);
        assert_eq!(all[1].event_id, 1);
    }

    #[test]
    fn test_created_within_range_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("events.jsonl"));
        let now = Utc::now();
        store.append(&record(1, "recent", now)).unwrap();
        store
            .append(&record(2, "ancient", now - Duration::days(400)))
            .unwrap();

        let q = StoreQuery {
            created_within: Some(TimeRange::Month),
            ..Default::default()
        };
        let hits = store.query(&q).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_name, "recent");

        let all = StoreQuery {
            created_within: Some(TimeRange::AllPeriod),
            ..Default::default()
        };
        assert_eq!(store.query(&all).unwrap().len(), 2);
    }

    #[test]
    fn test_time_range_bounds() {
        let now = Utc.with_ymd_and_hms(2026, 8, 4, 13, 45, 30).unwrap();

        let (start, end) = TimeRange::OneDay.bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 4, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 8, 4, 23, 59, 59).unwrap());

        // 2026-08-04 is a Tuesday; the week starts Monday the 3rd.
        let (start, _) = TimeRange::Week.bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap());

        let (start, end) = TimeRange::Month.bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 8, 31, 23, 59, 59).unwrap());

        let (start, end) = TimeRange::EightHours.bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 4, 5, 0, 0).unwrap());
        assert_eq!(end, now);
    }
}
