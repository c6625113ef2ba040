//! Report rendering.
//!
//! Markdown, JSON and CSV output of the dashboard state.

pub mod generator;

pub use generator::*;
