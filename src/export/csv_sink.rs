//! Append-only CSV row writer.
//!
//! A [`CsvSink`] is bound to a target path and a fixed header at
//! construction. Each [`append`](CsvSink::append) opens the file in append
//! mode, writes one row, and closes it again; the header is written only
//! when the sink creates the file. An existing file is purely additive —
//! no header re-validation, no rotation, no truncation.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::util::error::{HarvestError, Result};

/// Append-only CSV writer bound to one file and one column layout.
pub struct CsvSink {
    path: PathBuf,
    header: &'static [&'static str],
}

impl CsvSink {
    /// Bind a sink to `path` with the given fixed header labels.
    pub fn new(path: impl Into<PathBuf>, header: &'static [&'static str]) -> Self {
        Self {
            path: path.into(),
            header,
        }
    }

    /// Target file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, creating the file (with its header) if needed.
    ///
    /// # Errors
    /// Returns [`HarvestError::Export`] if the file cannot be opened or
    /// written.
    pub fn append(&self, row: &[String]) -> Result<()> {
        let write_header = !existing_nonempty(&self.path);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HarvestError::Export(format!("{}: {e}", self.path.display())))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if write_header {
            writer
                .write_record(self.header)
                .map_err(|e| HarvestError::Export(format!("Failed to write CSV header: {e}")))?;
        }
        writer
            .write_record(row)
            .map_err(|e| HarvestError::Export(format!("Failed to write CSV row: {e}")))?;
        writer
            .flush()
            .map_err(|e| HarvestError::Export(format!("Failed to flush CSV: {e}")))?;
        Ok(())
    }
}

/// Write a complete CSV snapshot: fresh file, header, all rows.
///
/// Used by the full-store export, which replaces the target rather than
/// appending to it.
///
/// # Errors
/// Returns [`HarvestError::Export`] if the file cannot be created or written.
pub fn write_snapshot(
    path: &Path,
    header: &'static [&'static str],
    rows: impl IntoIterator<Item = [String; 9]>,
) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| HarvestError::Export(format!("Failed to create CSV file: {e}")))?;

    writer
        .write_record(header)
        .map_err(|e| HarvestError::Export(format!("Failed to write CSV header: {e}")))?;

    let mut written = 0usize;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| HarvestError::Export(format!("Failed to write CSV row: {e}")))?;
        written += 1;
    }

    writer
        .flush()
        .map_err(|e| HarvestError::Export(format!("Failed to flush CSV: {e}")))?;
    Ok(written)
}

/// Whether `path` already exists with content (so the header was written).
fn existing_nonempty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
