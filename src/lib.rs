//! Tasku - a YAML-based hierarchical task runner
//!
//! Tasks live in named groups inside a `tasku.yaml` file, carry layered
//! environment and template variables, and can chain into each other
//! through pre-run, post-run and failure hooks.

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod render;
pub mod runner;
pub mod scope;
pub mod ui;

pub use error::{Result, TaskuError};

/// Current version of Tasku
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
