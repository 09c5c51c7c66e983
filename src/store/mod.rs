//! Persistence for normalized records.

pub mod event_store;

pub use event_store::{EventStore, OrderBy, StoreQuery, TimeRange};
