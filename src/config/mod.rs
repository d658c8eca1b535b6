//! Configuration parsing
//!
//! This module handles parsing of tasku.yaml configuration files.
//! Structural validation (references, cycles) lives in the task graph.

pub mod parse;
pub mod types;

// Re-export main types
pub use parse::*;
pub use types::*;
