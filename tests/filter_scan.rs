//! Live filter scan tests: predicate order, the recency-window early exit,
//! and the store/CSV write asymmetry.

use eventharvest::core::event_record::{EventType, RawEntry};
use eventharvest::core::filter::FilterCriteria;
use eventharvest::core::log_source::MemoryChannel;
use eventharvest::engine::Engine;
use eventharvest::export::csv_sink::CsvSink;
use eventharvest::store::event_store::{EventStore, OrderBy};
use eventharvest::util::constants::{FILTER_CSV_HEADER, INGEST_CSV_HEADER};
use eventharvest::util::time::{format, now_epoch, TimeLayout};

fn entry_aged(age_secs: i64, n: u32, user: &str) -> RawEntry {
    RawEntry {
        time_generated: format(now_epoch() - age_secs, TimeLayout::Numeric),
        event_id: 4624,
        event_type_flag: 0x0008,
        computer_name: "WKS-07".into(),
        source_name: "Security-Auditing".into(),
        category: 2,
        record_number: n,
        message: "An account was successfully logged on. More text.".into(),
        string_inserts: vec!["S-1-5-18".into(), user.into()],
    }
}

fn engine_at(dir: &std::path::Path) -> Engine {
    Engine::new(
        EventStore::new(dir.join("events.jsonl")),
        CsvSink::new(dir.join("read_events.csv"), &INGEST_CSV_HEADER),
        CsvSink::new(dir.join("filtering_events.csv"), &FILTER_CSV_HEADER),
    )
}

fn filter_csv_data_rows(dir: &std::path::Path) -> usize {
    let text = std::fs::read_to_string(dir.join("filtering_events.csv")).unwrap_or_default();
    text.lines().count().saturating_sub(1)
}

#[test]
fn recency_window_stops_the_scan_instead_of_skipping() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    // Newest first: 0s, 10s in the window; 200s beyond it; 300s behind that.
    let entries = vec![
        entry_aged(0, 1, "alice"),
        entry_aged(10, 2, "bob"),
        entry_aged(200, 3, "carol"),
        entry_aged(300, 4, "dave"),
    ];
    let mut channel = MemoryChannel::new("Security", entries);

    let criteria = FilterCriteria {
        seconds_window: Some(60),
        ..Default::default()
    };
    let outcome = engine
        .query_filtered(&mut channel, "Security", criteria)
        .unwrap();

    assert_eq!(outcome.matched, 2);
    assert!(outcome.stopped_early, "window exceedance must stop the scan");
    assert_eq!(
        outcome.scanned, 3,
        "the entry behind the first too-old one is never examined"
    );
    assert_eq!(filter_csv_data_rows(dir.path()), 2);
}

#[test]
fn entries_rejected_by_predicates_do_not_trigger_the_window() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    // The old entry fails the user predicate, so its age is never consulted
    // and the scan runs to exhaustion.
    let entries = vec![entry_aged(5, 1, "alice"), entry_aged(500, 2, "bob")];
    let mut channel = MemoryChannel::new("Security", entries);

    let criteria = FilterCriteria {
        user_name: Some("alice".into()),
        seconds_window: Some(60),
        ..Default::default()
    };
    let outcome = engine
        .query_filtered(&mut channel, "Security", criteria)
        .unwrap();

    assert_eq!(outcome.matched, 1);
    assert_eq!(outcome.scanned, 2);
    assert!(!outcome.stopped_early);
}

#[test]
fn predicates_compose_and_reject_independently() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let mut failure = entry_aged(1, 2, "alice");
    failure.event_type_flag = 0x0010;
    failure.event_id = 4625;
    let mut other_computer = entry_aged(2, 3, "alice");
    other_computer.computer_name = "WKS-99".into();

    let entries = vec![entry_aged(0, 1, "alice"), failure, other_computer];
    let mut channel = MemoryChannel::new("Security", entries);

    let criteria = FilterCriteria {
        event_types: Some(vec![EventType::AuditSuccess]),
        event_ids: Some(vec![4624]),
        computer_name: Some("WKS-07".into()),
        user_name: Some("alice".into()),
        ..Default::default()
    };
    let outcome = engine
        .query_filtered(&mut channel, "Security", criteria)
        .unwrap();

    assert_eq!(outcome.matched, 1);
    assert_eq!(outcome.scanned, 3);
}

#[test]
fn sequential_scans_append_without_deduplication() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let entries = vec![entry_aged(0, 1, "alice"), entry_aged(1, 2, "bob")];
    let mut channel = MemoryChannel::new("Security", entries);

    let criteria = FilterCriteria::default();
    engine
        .query_filtered(&mut channel, "Security", criteria.clone())
        .unwrap();
    assert_eq!(filter_csv_data_rows(dir.path()), 2);

    engine
        .query_filtered(&mut channel, "Security", criteria)
        .unwrap();
    assert_eq!(filter_csv_data_rows(dir.path()), 4, "row counts sum across calls");

    // Exactly one header regardless of how many scans appended.
    let text = std::fs::read_to_string(dir.path().join("filtering_events.csv")).unwrap();
    assert_eq!(text.lines().filter(|l| l.starts_with("Event_ID,")).count(), 1);
}

#[test]
fn filter_path_never_writes_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let mut channel = MemoryChannel::new("Security", vec![entry_aged(0, 1, "alice")]);
    let outcome = engine
        .query_filtered(&mut channel, "Security", FilterCriteria::default())
        .unwrap();

    assert_eq!(outcome.matched, 1);
    assert!(engine.query_all(OrderBy::CreatedDate).unwrap().is_empty());
}

#[test]
fn logon_preset_selects_only_its_events() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let mut failure = entry_aged(1, 2, "mallory");
    failure.event_type_flag = 0x0010;
    failure.event_id = 4625;
    let mut service_info = entry_aged(2, 3, "system");
    service_info.event_type_flag = 0x0004;
    service_info.event_id = 7036;

    let entries = vec![entry_aged(0, 1, "alice"), failure, service_info];
    let mut channel = MemoryChannel::new("Security", entries);

    let outcome = engine
        .query_filtered(&mut channel, "Security", FilterCriteria::logon_failure())
        .unwrap();
    assert_eq!(outcome.matched, 1);
    assert_eq!(outcome.scanned, 3);

    let text = std::fs::read_to_string(dir.path().join("filtering_events.csv")).unwrap();
    assert!(text.contains("mallory"));
    assert!(!text.contains("alice"));
}
