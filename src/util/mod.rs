//! Cross-cutting helpers: constants, errors, and the timestamp codec.

pub mod constants;
pub mod error;
pub mod time;
