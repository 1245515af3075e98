//! Export format generators module.
//!
//! Converters for sub-layer payloads that are not fetched verbatim.

pub mod style;

// Re-export for convenience
pub use style::{StyleExporter, StyleRule};
