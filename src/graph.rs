//! Task graph: addressable groups, tasks and hooks
//!
//! Builds the group/task index from a parsed configuration, resolves
//! qualified names, and validates hook references and cycles at load time.

use crate::config::{Config, Group, TaskDef};
use crate::error::{ConfigError, ConfigResult};
use std::collections::HashSet;
use std::path::PathBuf;

/// The group bare task names resolve against
pub const DEFAULT_GROUP: &str = "default";

/// A validated task graph
#[derive(Debug, Clone)]
pub struct TaskGraph {
    pub config: Config,
    /// Path to the config file this graph was loaded from, when known
    pub config_path: Option<PathBuf>,
}

/// A resolved reference into the graph
#[derive(Debug, Clone)]
pub struct TaskHandle<'a> {
    pub qualified_name: String,
    pub group_name: &'a str,
    pub task_name: &'a str,
    pub group: &'a Group,
    pub task: &'a TaskDef,
}

impl TaskGraph {
    /// Build a graph from configuration, validating every hook reference
    /// and rejecting cyclic hook chains
    pub fn load(config: Config, config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let graph = TaskGraph {
            config,
            config_path,
        };
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> ConfigResult<()> {
        for (group_name, group) in &self.config.groups {
            for (task_name, task) in &group.tasks {
                let qualified = format!("{}.{}", group_name, task_name);

                for hook in task.all_hook_refs() {
                    if self.resolve_name(hook.target()).is_none() {
                        return Err(ConfigError::UnknownTaskReference {
                            referrer: qualified.clone(),
                            target: hook.target().to_string(),
                        });
                    }
                }

                if let Some(host) = &task.remote {
                    if !self.config.hosts.contains_key(host) {
                        return Err(ConfigError::UnknownHost(host.clone()));
                    }
                }
            }
        }

        self.detect_hook_cycles()
    }

    /// Look up a task by qualified name (`group.task`), or bare name for
    /// tasks in the default group
    pub fn lookup(&self, name: &str) -> ConfigResult<TaskHandle<'_>> {
        let (group_name, task_name) = self
            .resolve_name(name)
            .ok_or_else(|| self.lookup_error(name))?;

        let group = &self.config.groups[group_name];
        let task = &group.tasks[task_name];

        Ok(TaskHandle {
            qualified_name: format!("{}.{}", group_name, task_name),
            group_name,
            task_name,
            group,
            task,
        })
    }

    /// Turn any accepted name into its canonical `group.task` form
    pub fn qualify(&self, name: &str) -> ConfigResult<String> {
        let (group_name, task_name) = self
            .resolve_name(name)
            .ok_or_else(|| self.lookup_error(name))?;
        Ok(format!("{}.{}", group_name, task_name))
    }

    /// All qualified task names, sorted for deterministic listings
    pub fn qualified_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .config
            .groups
            .iter()
            .flat_map(|(g, group)| group.tasks.keys().map(move |t| format!("{}.{}", g, t)))
            .collect();
        names.sort();
        names
    }

    fn resolve_name(&self, name: &str) -> Option<(&str, &str)> {
        let (group_name, task_name) = match name.split_once('.') {
            Some(parts) => parts,
            None => {
                // Bare name: the `default` group, or the only group when
                // there is exactly one
                let group_name = if self.config.groups.contains_key(DEFAULT_GROUP) {
                    DEFAULT_GROUP
                } else if self.config.groups.len() == 1 {
                    self.config.groups.keys().next().map(String::as_str)?
                } else {
                    return None;
                };
                (group_name, name)
            }
        };

        let (g, group) = self.config.groups.get_key_value(group_name)?;
        let (t, _) = group.tasks.get_key_value(task_name)?;
        Some((g.as_str(), t.as_str()))
    }

    fn lookup_error(&self, name: &str) -> ConfigError {
        if let Some((group_name, _)) = name.split_once('.') {
            if !self.config.groups.contains_key(group_name) {
                return ConfigError::GroupNotFound(group_name.to_string());
            }
        }
        ConfigError::TaskNotFound(name.to_string())
    }

    /// Hook chains, followed transitively, must never reach back to the
    /// originating task
    fn detect_hook_cycles(&self) -> ConfigResult<()> {
        for (group_name, group) in &self.config.groups {
            for task_name in group.tasks.keys() {
                let qualified = format!("{}.{}", group_name, task_name);
                let mut visited = HashSet::new();
                let mut stack = Vec::new();
                self.check_cycle(&qualified, &mut visited, &mut stack)?;
            }
        }
        Ok(())
    }

    fn check_cycle(
        &self,
        qualified: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> ConfigResult<()> {
        if stack.iter().any(|n| n == qualified) {
            stack.push(qualified.to_string());
            return Err(ConfigError::CyclicHook(stack.join(" -> ")));
        }

        if visited.contains(qualified) {
            return Ok(());
        }

        stack.push(qualified.to_string());

        let handle = self.lookup(qualified)?;
        for hook in handle.task.all_hook_refs() {
            let target = self.qualify(hook.target())?;
            self.check_cycle(&target, visited, stack)?;
        }

        stack.pop();
        visited.insert(qualified.to_string());

        Ok(())
    }
}

impl TaskDef {
    /// Every hook reference of the task, across all three phases
    pub fn all_hook_refs(&self) -> impl Iterator<Item = &crate::config::HookRef> {
        self.hooks
            .pre_run
            .iter()
            .chain(self.hooks.post_run.iter())
            .chain(self.hooks.failure.iter())
    }
}
