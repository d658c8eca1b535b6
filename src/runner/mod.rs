//! Task execution: backends, logging, hooks and the run controller

pub mod backend;
pub mod controller;
pub mod executor;
pub mod hooks;
pub mod logging;

pub use backend::Backend;
pub use controller::{RunController, RunOptions};
pub use hooks::{HookInvocation, HookPhase};
