//! Core configuration types
//!
//! This module defines the data structures that represent a tasku.yaml
//! configuration file: groups, tasks, argument specs, hooks, retry and
//! logging settings, and remote host entries.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Application name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Global environment variables
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, Value>,

    /// Global env-file (key=value lines) loaded before literal `env`
    #[serde(rename = "env-file", default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,

    /// Global template variables (never exported to the process environment)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vars: HashMap<String, Value>,

    /// Global working directory
    #[serde(
        rename = "working-directory",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub working_directory: Option<String>,

    /// Default backend interpreter for all tasks (e.g., "bash")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Stop at the first failing line in line-oriented backends
    /// (default true)
    #[serde(
        rename = "stop-on-error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_on_error: Option<bool>,

    /// Named remote host entries
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub hosts: HashMap<String, HostDef>,

    /// Task groups
    #[serde(default)]
    pub groups: HashMap<String, Group>,
}

/// A group of tasks sharing scope defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Group {
    /// Help text for the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,

    /// Group-level environment variables (override global)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, Value>,

    /// Group-level env-file
    #[serde(rename = "env-file", default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,

    /// Group-level template variables
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vars: HashMap<String, Value>,

    /// Group working directory (absolute, or relative to the global one)
    #[serde(
        rename = "working-directory",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub working_directory: Option<String>,

    /// Backend interpreter for all tasks in the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Tasks in this group
    #[serde(default)]
    pub tasks: HashMap<String, TaskDef>,
}

/// A task definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskDef {
    /// Help text for the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,

    /// Whether this task is hidden from the CLI surface
    #[serde(default)]
    pub private: bool,

    /// Argument specs, name -> spec, in declaration order. The order drives
    /// CLI option listing, binding and prompt order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub args: IndexMap<String, ArgSpec>,

    /// Task-level environment variables (override group and global)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, Value>,

    /// Task-level env-file
    #[serde(rename = "env-file", default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,

    /// Task-level template variables
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vars: HashMap<String, Value>,

    /// Task working directory (absolute, or relative to the group one)
    #[serde(
        rename = "working-directory",
        default,
        skip_serializing_if = "Option::is_none",
        alias = "dir"
    )]
    pub working_directory: Option<String>,

    /// Backend interpreter for this task ("shell" is accepted as an alias)
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "shell")]
    pub backend: Option<String>,

    /// Stop at the first failing line (overrides the global setting)
    #[serde(
        rename = "stop-on-error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_on_error: Option<bool>,

    /// Name of a remote host entry to run this task on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,

    /// Retry settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySpec>,

    /// File logging settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogSpec>,

    /// Hook chains
    #[serde(default, skip_serializing_if = "Hooks::is_empty")]
    pub hooks: Hooks,

    /// Templated command body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
}

/// Hook chains for a task, each an ordered list of references
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Hooks {
    /// Hooks run before the task body
    #[serde(rename = "pre-run", default, skip_serializing_if = "Vec::is_empty")]
    pub pre_run: Vec<HookRef>,

    /// Hooks run after a successful body
    #[serde(rename = "post-run", default, skip_serializing_if = "Vec::is_empty")]
    pub post_run: Vec<HookRef>,

    /// Hooks run when the final retry attempt fails
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure: Vec<HookRef>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.pre_run.is_empty() && self.post_run.is_empty() && self.failure.is_empty()
    }
}

/// A reference to another task invoked as a hook
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HookRef {
    /// Bare qualified task name
    Simple(String),

    /// Reference with a conditional and argument overrides
    Complex(HookRefDetail),
}

/// Detailed hook reference
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HookRefDetail {
    /// Qualified name of the target task
    pub task: String,

    /// Templated boolean expression; absent means always run
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Argument overrides passed to the target task
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub args: HashMap<String, Value>,
}

impl HookRef {
    /// Qualified name of the referenced task
    pub fn target(&self) -> &str {
        match self {
            HookRef::Simple(name) => name,
            HookRef::Complex(detail) => &detail.task,
        }
    }

    /// The `if` expression, when present
    pub fn condition(&self) -> Option<&str> {
        match self {
            HookRef::Simple(_) => None,
            HookRef::Complex(detail) => detail.condition.as_deref(),
        }
    }

    /// Argument overrides for the target task
    pub fn args(&self) -> Option<&HashMap<String, Value>> {
        match self {
            HookRef::Simple(_) => None,
            HookRef::Complex(detail) => Some(&detail.args),
        }
    }
}

/// An argument spec for a task
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArgSpec {
    /// Help text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,

    /// Value type: string, bool, integer, float, list
    #[serde(rename = "type", default = "default_arg_type")]
    pub arg_type: String,

    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Action, e.g. store_true for flags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Required argument
    #[serde(default)]
    pub required: bool,

    /// Numeric range checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validations: Option<Validations>,

    /// Prompt the user when no value is supplied and the run is attended
    #[serde(default)]
    pub interactive: bool,
}

impl Default for ArgSpec {
    fn default() -> Self {
        ArgSpec {
            help: None,
            arg_type: default_arg_type(),
            default: None,
            action: None,
            required: false,
            validations: None,
            interactive: false,
        }
    }
}

impl ArgSpec {
    /// Whether the argument is a boolean flag
    pub fn is_flag(&self) -> bool {
        self.arg_type == "bool" || self.action.as_deref() == Some("store_true")
    }
}

fn default_arg_type() -> String {
    "string".to_string()
}

/// Numeric bounds for argument validation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Validations {
    #[serde(rename = "min-value", default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,

    #[serde(rename = "max-value", default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

/// Retry settings: `count` additional attempts after the first failure,
/// with `delay` seconds between attempts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySpec {
    #[serde(default)]
    pub count: u32,

    #[serde(default)]
    pub delay: f64,
}

/// File logging settings for a task
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSpec {
    /// File path; lines are appended, never truncated
    pub path: String,

    /// Which streams to capture
    #[serde(default)]
    pub level: LogLevel,

    /// Line format with %(asctime)s, %(task)s, %(file)s, %(levelname)s,
    /// %(message)s placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Which output streams a task log captures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Out,
    Err,
    #[default]
    Both,
}

impl LogLevel {
    pub fn captures_out(&self) -> bool {
        matches!(self, LogLevel::Out | LogLevel::Both)
    }

    pub fn captures_err(&self) -> bool {
        matches!(self, LogLevel::Err | LogLevel::Both)
    }
}

/// A named remote host entry, consumed opaquely by the remote transport
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostDef {
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}
