//! Unified error types for EventHarvest.
//!
//! All fallible operations throughout the codebase return `Result<T, HarvestError>`.
//! This ensures consistent error reporting and clean propagation via the `?` operator.

/// Unified error type used throughout EventHarvest.
///
/// Each variant captures enough context to produce an actionable message for
/// log output. Per-entry failures (`Normalize`, `TimeParse`, `Persistence`)
/// are logged and skipped by the scan loops; they never abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// The channel could not be opened. Fatal to the invocation that
    /// requested it; whether to retry is the caller's policy.
    #[error("failed to open channel '{channel}': {detail}")]
    Open {
        /// The channel name that was requested.
        channel: String,
        /// Human-readable description of the failure.
        detail: String,
    },

    /// A batch read failed. The handle remains valid; the batch is abandoned.
    #[error("read failed on channel '{channel}': {detail}")]
    Read {
        /// The channel the handle was opened on.
        channel: String,
        /// Human-readable description of the failure.
        detail: String,
    },

    /// One raw entry could not be normalized. `field` names the canonical
    /// field whose derivation failed.
    #[error("normalization failed on field '{field}': {detail}")]
    Normalize {
        /// The canonical field that could not be derived.
        field: &'static str,
        /// Human-readable description of the failure.
        detail: String,
    },

    /// A timestamp string matched neither of the two known layouts.
    #[error("unrecognized timestamp layout: '{0}'")]
    TimeParse(String),

    /// A single-record store write failed. The enclosing scan continues.
    #[error("store write failed: {0}")]
    Persistence(String),

    /// CSV output failed — typically an I/O error on the target file.
    #[error("CSV export failed: {0}")]
    Export(String),

    /// Catch-all for I/O errors (file reads, directory creation, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HarvestError>;
