//! Channel handle abstraction and portable backends.
//!
//! [`LogSource`] is the seam between the engine and whatever delivers raw
//! entries. A source has exactly two states — Closed (initial and terminal)
//! and Open — transitioning on [`open`](LogSource::open) and
//! [`close`](LogSource::close); reads are only valid while Open. Ingestion
//! and filtering are two independent consumers: each performs its own
//! open/close cycle and no scan state is shared between them.
//!
//! Two backends live here: [`JsonlChannel`] reads a channel captured as a
//! JSONL file (one raw entry per line, append order oldest-first, served
//! newest-first), and [`MemoryChannel`] serves a fixed in-memory list, the
//! substitutable fake the engine's constructor-injection design exists for.
//! The live Windows backend is in [`crate::core::win_channel`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::core::event_record::RawEntry;
use crate::util::error::{HarvestError, Result};

/// A named event-log channel yielding raw entries in reverse chronological
/// order (newest first).
pub trait LogSource {
    /// Acquire the handle for `channel`. Closed → Open.
    ///
    /// # Errors
    /// [`HarvestError::Open`] if the channel is missing or inaccessible, or
    /// if the source is already open.
    fn open(&mut self, channel: &str) -> Result<()>;

    /// Return the next batch of raw entries, newest first relative to the
    /// current read position. An empty batch means the channel is exhausted.
    ///
    /// # Errors
    /// [`HarvestError::Read`] on a transient failure (the handle stays
    /// valid, the batch is abandoned) or when the source is not open.
    fn read_backward(&mut self, batch_size: usize) -> Result<Vec<RawEntry>>;

    /// Total number of records in the channel.
    ///
    /// # Errors
    /// [`HarvestError::Read`] when the source is not open.
    fn count(&mut self) -> Result<u64>;

    /// Release the handle. Open → Closed; idempotent, safe to call twice.
    fn close(&mut self);

    /// Whether the source currently holds an open handle.
    fn is_open(&self) -> bool;
}

fn not_open_error() -> HarvestError {
    HarvestError::Read {
        channel: "(closed)".into(),
        detail: "channel is not open".into(),
    }
}

// ── JSONL-backed channel ────────────────────────────────────────────────

/// A channel captured as a JSONL file under a directory, one [`RawEntry`]
/// per line in append (oldest-first) order.
///
/// `open("Security")` reads `<dir>/Security.jsonl` and serves its entries
/// newest-first. Lines that fail to deserialize are logged and skipped;
/// they are source corruption, not a reason to fail the whole channel.
pub struct JsonlChannel {
    dir: PathBuf,
    state: Option<JsonlHandle>,
}

struct JsonlHandle {
    channel: String,
    /// Entries in service order, newest first.
    entries: Vec<RawEntry>,
    cursor: usize,
}

impl JsonlChannel {
    /// Create a source rooted at `dir`. No file is touched until `open`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state: None,
        }
    }
}

impl LogSource for JsonlChannel {
    fn open(&mut self, channel: &str) -> Result<()> {
        if self.state.is_some() {
            return Err(HarvestError::Open {
                channel: channel.to_string(),
                detail: "source is already open".into(),
            });
        }

        let path = self.dir.join(format!("{channel}.jsonl"));
        let file = File::open(&path).map_err(|e| HarvestError::Open {
            channel: channel.to_string(),
            detail: format!("{}: {e}", path.display()),
        })?;

        let mut entries = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| HarvestError::Open {
                channel: channel.to_string(),
                detail: format!("{}: {e}", path.display()),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed entry at {}:{}: {e}",
                        path.display(),
                        line_no + 1
                    );
                }
            }
        }

        // File order is append order; the read contract is newest-first.
        entries.reverse();
        tracing::debug!(
            "Opened channel '{channel}' from {} ({} entries)",
            path.display(),
            entries.len()
        );

        self.state = Some(JsonlHandle {
            channel: channel.to_string(),
            entries,
            cursor: 0,
        });
        Ok(())
    }

    fn read_backward(&mut self, batch_size: usize) -> Result<Vec<RawEntry>> {
        let handle = self.state.as_mut().ok_or_else(not_open_error)?;
        let end = (handle.cursor + batch_size).min(handle.entries.len());
        let batch = handle.entries[handle.cursor..end].to_vec();
        handle.cursor = end;
        Ok(batch)
    }

    fn count(&mut self) -> Result<u64> {
        let handle = self.state.as_ref().ok_or_else(not_open_error)?;
        Ok(handle.entries.len() as u64)
    }

    fn close(&mut self) {
        if let Some(handle) = self.state.take() {
            tracing::debug!("Closed channel '{}'", handle.channel);
        }
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }
}

// ── In-memory channel ───────────────────────────────────────────────────

/// An in-memory channel over a fixed entry list, newest first.
///
/// The substitutable test double: entries are provided up front, `delivered`
/// counts how many have been handed out (scan-termination behaviour is
/// observable through it), and `fail_reads` makes the next N
/// `read_backward` calls fail to exercise abandoned-batch handling.
pub struct MemoryChannel {
    channel: String,
    entries: Vec<RawEntry>,
    cursor: usize,
    open: bool,
    /// Total entries handed out across all reads since the last `open`.
    pub delivered: usize,
    /// Number of upcoming `read_backward` calls that fail with a
    /// [`HarvestError::Read`] before reads succeed again.
    pub fail_reads: u32,
}

impl MemoryChannel {
    /// Create a channel named `channel` serving `entries` (newest first).
    pub fn new(channel: impl Into<String>, entries: Vec<RawEntry>) -> Self {
        Self {
            channel: channel.into(),
            entries,
            cursor: 0,
            open: false,
            delivered: 0,
            fail_reads: 0,
        }
    }
}

impl LogSource for MemoryChannel {
    fn open(&mut self, channel: &str) -> Result<()> {
        if self.open {
            return Err(HarvestError::Open {
                channel: channel.to_string(),
                detail: "source is already open".into(),
            });
        }
        if channel != self.channel {
            return Err(HarvestError::Open {
                channel: channel.to_string(),
                detail: format!("no such channel (have '{}')", self.channel),
            });
        }
        self.open = true;
        self.cursor = 0;
        self.delivered = 0;
        Ok(())
    }

    fn read_backward(&mut self, batch_size: usize) -> Result<Vec<RawEntry>> {
        if !self.open {
            return Err(not_open_error());
        }
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(HarvestError::Read {
                channel: self.channel.clone(),
                detail: "injected read failure".into(),
            });
        }
        let end = (self.cursor + batch_size).min(self.entries.len());
        let batch = self.entries[self.cursor..end].to_vec();
        self.cursor = end;
        self.delivered += batch.len();
        Ok(batch)
    }

    fn count(&mut self) -> Result<u64> {
        if !self.open {
            return Err(not_open_error());
        }
        Ok(self.entries.len() as u64)
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
