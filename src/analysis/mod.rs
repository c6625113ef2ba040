//! Aggregation engine.
//!
//! Pure aggregation functions live in [`aggregator`]; [`engine`] owns the
//! loaded dataset and answers view queries with them.

pub mod aggregator;
pub mod engine;

pub use engine::Engine;
