//! Error module orchestrator.
//!
//! Callers import `StickyError`/`Result` from here; the variants live in the
//! private `types` module.

mod types;

pub use types::{Result, StickyError};
