//! Boundary operations over the injected collaborators.
//!
//! [`Engine`] owns the persistence and CSV collaborators and exposes the
//! operations a presentation layer consumes: `ingest`, the store queries,
//! `query_filtered`, and the full-store export. Channel sources are passed
//! per call so each operation performs its own open/close cycle and callers
//! (and tests) can substitute any [`LogSource`] implementation.
//!
//! The two write paths stay asymmetric on purpose: ingestion persists to
//! the store and mirrors to its own CSV; filtering only writes the filter
//! CSV and never touches the store.

use std::path::Path;

use crate::core::event_record::Record;
use crate::core::filter::{FilterCriteria, FilterEngine, ScanOutcome};
use crate::core::log_source::LogSource;
use crate::core::normalizer;
use crate::export::csv_sink::{self, CsvSink};
use crate::store::event_store::{EventStore, OrderBy, StoreQuery};
use crate::util::constants::{EXPORT_CSV_HEADER, MAX_READ_FAILURES, READ_BATCH_SIZE};
use crate::util::error::Result;

/// Counters reported by one ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestSummary {
    /// Records normalized, persisted, and mirrored.
    pub persisted: usize,
    /// Raw entries dropped by normalization failures.
    pub skipped: usize,
    /// Normalized records dropped by store write failures.
    pub write_failures: usize,
    /// Total records the channel reported at scan start.
    pub total_in_channel: u64,
}

/// The ingestion/normalization/filtering engine behind the boundary
/// operations.
pub struct Engine {
    store: EventStore,
    ingest_sink: CsvSink,
    filter_sink: CsvSink,
}

impl Engine {
    /// Build an engine over explicit collaborators.
    pub fn new(store: EventStore, ingest_sink: CsvSink, filter_sink: CsvSink) -> Self {
        Self {
            store,
            ingest_sink,
            filter_sink,
        }
    }

    /// Read `channel` to exhaustion, persisting every normalizable entry to
    /// the store and mirroring it to the ingestion CSV.
    ///
    /// Per-entry failures are logged and skipped; only a failed `open` is
    /// fatal. The source is closed on every exit path.
    pub fn ingest(&self, source: &mut dyn LogSource, channel: &str) -> Result<IngestSummary> {
        source.open(channel)?;
        let result = self.ingest_open(source, channel);
        source.close();
        result
    }

    fn ingest_open(&self, source: &mut dyn LogSource, channel: &str) -> Result<IngestSummary> {
        let mut summary = IngestSummary {
            total_in_channel: match source.count() {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Channel count unavailable: {e}");
                    0
                }
            },
            ..IngestSummary::default()
        };
        tracing::info!(
            "Ingesting channel '{channel}' ({} records)",
            summary.total_in_channel
        );

        let mut read_failures = 0u32;
        loop {
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
                let record = match normalizer::normalize(raw) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!("Skipping record {}: {e}", raw.record_number);
                        summary.skipped += 1;
                        continue;
                    }
                };

                if let Err(e) = self.store.append(&record) {
                    tracing::warn!("Skipping record {}: {e}", raw.record_number);
                    summary.write_failures += 1;
                    continue;
                }

                // Mirror failures do not undo the persisted record.
                if let Err(e) = self.ingest_sink.append(&record.csv_row()) {
                    tracing::warn!("CSV mirror failed for record {}: {e}", raw.record_number);
                }
                summary.persisted += 1;
            }
        }

        tracing::info!(
            "Ingest done: {} persisted, {} skipped, {} write failures",
            summary.persisted,
            summary.skipped,
            summary.write_failures
        );
        Ok(summary)
    }

    /// Every stored record, ordered descending.
    pub fn query_all(&self, order: OrderBy) -> Result<Vec<Record>> {
        self.store.query_all(order)
    }

    /// Stored records with the given numeric event code.
    pub fn query_by_event_id(&self, code: u16) -> Result<Vec<Record>> {
        self.store.query_by_event_id(code)
    }

    /// Stored records matching a field/date query.
    pub fn query(&self, query: &StoreQuery) -> Result<Vec<Record>> {
        self.store.query(query)
    }

    /// Scan `channel` live against `criteria`, appending matches to the
    /// filter CSV. Never writes to the store.
    ///
    /// The source is closed on every exit path, including the recency-window
    /// early exit.
    pub fn query_filtered(
        &self,
        source: &mut dyn LogSource,
        channel: &str,
        criteria: FilterCriteria,
    ) -> Result<ScanOutcome> {
        source.open(channel)?;
        let result = FilterEngine::new(criteria, &self.filter_sink).scan(source);
        source.close();
        result
    }

    /// Write every stored record to a fresh CSV snapshot at `path`,
    /// newest-ingested first. Returns the number of rows written.
    pub fn export_all_to_csv(&self, path: &Path) -> Result<usize> {
        let records = self.store.query_all(OrderBy::CreatedDate)?;
        let written = csv_sink::write_snapshot(
            path,
            &EXPORT_CSV_HEADER,
            records.iter().map(Record::export_row),
        )?;
        tracing::info!("Exported {written} records to {}", path.display());
        Ok(written)
    }
}
