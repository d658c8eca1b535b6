//! Run orchestration
//!
//! Drives one task invocation end to end: scope resolution, pre-run hooks,
//! the body with its retry loop, then post-run or failure hooks. Hooks run
//! as full nested invocations with their own scope resolution.

use crate::error::{ExecutionError, Phase, Result, TaskuError};
use crate::graph::{TaskGraph, TaskHandle};
use crate::render;
use crate::runner::backend::Backend;
use crate::runner::executor::{self, ExecSpec};
use crate::runner::hooks::{self, HookInvocation, HookPhase};
use crate::scope::{self, Attended, VariableContext};
use crate::ui::{self, Verbosity};
use serde_yaml::Value;
use std::collections::HashMap;

/// Invocation-wide options from the CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Resolve and print instead of executing
    pub dry_run: bool,
    /// Skip every hook phase; only task bodies run
    pub skip_hooks: bool,
    pub verbosity: Verbosity,
    /// Whether interactive arguments may prompt
    pub attended: Attended,
}

/// Runs tasks against a loaded graph
pub struct RunController<'a> {
    graph: &'a TaskGraph,
    options: RunOptions,
}

impl<'a> RunController<'a> {
    pub fn new(graph: &'a TaskGraph, options: RunOptions) -> Self {
        RunController { graph, options }
    }

    /// Run a task by name with arguments bound from the CLI
    pub fn run_task(&self, name: &str, cli_args: &HashMap<String, Value>) -> Result<()> {
        let handle = self.graph.lookup(name)?;
        self.run_invocation(&handle, cli_args)
    }

    fn run_invocation(
        &self,
        handle: &TaskHandle<'_>,
        cli_args: &HashMap<String, Value>,
    ) -> Result<()> {
        let ctx = scope::resolve(self.graph, handle, cli_args, self.options.attended)?;

        if !self.options.skip_hooks {
            let pre = hooks::expand(
                self.graph,
                &handle.task.hooks.pre_run,
                HookPhase::PreRun,
                &ctx,
            )?;
            for invocation in pre {
                self.run_hook(handle, invocation, Phase::PreHook)?;
            }
        }

        match self.run_body(handle, &ctx) {
            Ok(()) => {
                if !self.options.skip_hooks {
                    let post = hooks::expand(
                        self.graph,
                        &handle.task.hooks.post_run,
                        HookPhase::PostRun,
                        &ctx,
                    )?;
                    for invocation in post {
                        self.run_hook(handle, invocation, Phase::PostHook)?;
                    }
                }
                Ok(())
            }
            Err(primary) => {
                // an interrupt tears the invocation down without hooks
                let interrupted = matches!(
                    primary,
                    TaskuError::Execution(ExecutionError::Interrupted { .. })
                );

                if !self.options.skip_hooks && !interrupted {
                    self.run_failure_hooks(handle, &ctx);
                }
                Err(primary)
            }
        }
    }

    /// Failure hooks run after the final retry attempt has failed. Their
    /// own failures are reported but the original error still propagates.
    fn run_failure_hooks(&self, handle: &TaskHandle<'_>, ctx: &VariableContext) {
        let expanded = hooks::expand(
            self.graph,
            &handle.task.hooks.failure,
            HookPhase::Failure,
            ctx,
        );

        let invocations = match expanded {
            Ok(invocations) => invocations,
            Err(e) => {
                ui::print_error(&format!(
                    "failure hook of '{}' could not be expanded: {}",
                    handle.qualified_name, e
                ));
                return;
            }
        };

        for invocation in invocations {
            if let Err(e) = self.run_hook(handle, invocation, Phase::FailureHook) {
                ui::print_error(&e.to_string());
            }
        }
    }

    fn run_hook(
        &self,
        parent: &TaskHandle<'_>,
        invocation: HookInvocation,
        phase: Phase,
    ) -> Result<()> {
        ui::print_debug(
            self.options.verbosity,
            &format!("{} of '{}': {}", phase, parent.qualified_name, invocation.target),
        );

        let target = self.graph.lookup(&invocation.target)?;
        self.run_invocation(&target, &invocation.args)
            .map_err(|e| {
                TaskuError::Execution(ExecutionError::HookFailed {
                    phase,
                    task: invocation.target.clone(),
                    source: Box::new(e),
                })
            })
    }

    fn run_body(&self, handle: &TaskHandle<'_>, ctx: &VariableContext) -> Result<()> {
        let Some(raw_body) = handle.task.run.as_deref() else {
            // a task may exist only to fan out into hooks
            return Ok(());
        };

        let render_ctx = ctx.render_ctx("task");
        let body = render::render(raw_body, &render_ctx)?;

        let backend = effective_backend(self.graph, handle);
        let working_dir = self.working_directory(handle, ctx)?;
        let stop_on_error = handle
            .task
            .stop_on_error
            .or(self.graph.config.stop_on_error)
            .unwrap_or(true);

        let remote = match &handle.task.remote {
            Some(host_name) => Some(
                self.graph
                    .config
                    .hosts
                    .get(host_name)
                    .ok_or_else(|| crate::error::ConfigError::UnknownHost(host_name.clone()))?,
            ),
            None => None,
        };

        if self.options.dry_run {
            ui::print_info(
                self.options.verbosity,
                &format!("(dry-run) {} [{}]", handle.qualified_name, backend.program()),
            );
            println!("{}", body);
            return Ok(());
        }

        ui::print_info(
            self.options.verbosity,
            &format!("Running {}", handle.qualified_name),
        );

        let source_file = self
            .graph
            .config_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let spec = ExecSpec {
            qualified_name: &handle.qualified_name,
            body: &body,
            backend,
            stop_on_error,
            working_dir,
            env: &ctx.env,
            retry: handle.task.retry.as_ref(),
            log: handle.task.log.as_ref(),
            remote,
            source_file: &source_file,
        };

        match executor::run(&spec, self.options.verbosity) {
            Ok(_) => Ok(()),
            Err((e, _)) => Err(e),
        }
    }

    /// Effective working directory, rendered and resolved top-down
    fn working_directory(
        &self,
        handle: &TaskHandle<'_>,
        ctx: &VariableContext,
    ) -> Result<Option<std::path::PathBuf>> {
        let global = self.render_dir(self.graph.config.working_directory.as_deref(), ctx, "global")?;
        let group = self.render_dir(handle.group.working_directory.as_deref(), ctx, "group")?;
        let task = self.render_dir(handle.task.working_directory.as_deref(), ctx, "task")?;

        Ok(executor::resolve_working_directory(
            global.as_deref(),
            group.as_deref(),
            task.as_deref(),
        ))
    }

    fn render_dir(
        &self,
        dir: Option<&str>,
        ctx: &VariableContext,
        scope: &str,
    ) -> Result<Option<String>> {
        match dir {
            Some(dir) => Ok(Some(render::render(dir, &ctx.render_ctx(scope))?)),
            None => Ok(None),
        }
    }
}

/// Task backend wins over group, which wins over the global default
fn effective_backend(graph: &TaskGraph, handle: &TaskHandle<'_>) -> Backend {
    let spec = handle
        .task
        .backend
        .as_deref()
        .or(handle.group.backend.as_deref())
        .or(graph.config.backend.as_deref());
    Backend::from_spec(spec)
}
