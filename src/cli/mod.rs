//! Command line interface

pub mod app;

pub use app::{run, App};
