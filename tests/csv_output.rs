//! CSV sink behaviour: header lifetime and append-only semantics.

use eventharvest::core::event_record::{EventType, Record};
use eventharvest::export::csv_sink::CsvSink;
use eventharvest::util::constants::{FILTER_CSV_HEADER, INGEST_CSV_HEADER};

fn record(user: &str) -> Record {
    Record {
        time: "08/04/2026 13:45:00".into(),
        timestamp_secs: 1_786_196_700,
        event_id: 4624,
        computer_name: "WKS-07".into(),
        user_name: user.into(),
        category: "2".into(),
        source: "Security-Auditing".into(),
        record_number: "1".into(),
        event_type: EventType::AuditSuccess,
        message: "Logged on.".into(),
        created_date: chrono::Utc::now(),
    }
}

#[test]
fn header_is_written_exactly_once_per_file_lifetime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("read_events.csv");

    let sink = CsvSink::new(&path, &INGEST_CSV_HEADER);
    sink.append(&record("alice").csv_row()).unwrap();

    // A second sink bound to the same existing file must not repeat it.
    let again = CsvSink::new(&path, &INGEST_CSV_HEADER);
    again.append(&record("bob").csv_row()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert_eq!(
        text.lines().filter(|l| l.starts_with("Event_ID,")).count(),
        1
    );
}

#[test]
fn ingest_and_filter_headers_differ_only_in_the_message_label() {
    assert_eq!(INGEST_CSV_HEADER.len(), FILTER_CSV_HEADER.len());
    for (a, b) in INGEST_CSV_HEADER
        .iter()
        .zip(FILTER_CSV_HEADER.iter())
        .take(INGEST_CSV_HEADER.len() - 1)
    {
        assert_eq!(a, b);
    }
    assert_eq!(INGEST_CSV_HEADER.last(), Some(&"Text_Info"));
    assert_eq!(FILTER_CSV_HEADER.last(), Some(&"Text-Info"));
}

#[test]
fn row_columns_follow_the_header_order() {
    let row = record("alice").csv_row();
    assert_eq!(row[0], "4624"); // Event_ID
    assert_eq!(row[1], "08/04/2026 13:45:00"); // Time
    assert_eq!(row[2], "alice"); // user_name
    assert_eq!(row[3], "WKS-07"); // Computer
    assert_eq!(row[7], "AuditSuccess"); // event_type
    assert_eq!(row[8], "Logged on."); // Text_Info
}

#[test]
fn rows_with_embedded_commas_stay_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let sink = CsvSink::new(&path, &INGEST_CSV_HEADER);

    let mut r = record("alice");
    r.message = "Logged on, with delegation.".into();
    sink.append(&r.csv_row()).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][8], "Logged on, with delegation.");
}
