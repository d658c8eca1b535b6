//! Hook expansion
//!
//! Turns a task's declared hooks for one phase into the ordered list of
//! invocations to run, evaluating `if` conditions and rendering argument
//! overrides against the parent task's resolved context.

use crate::config::HookRef;
use crate::error::Result;
use crate::graph::TaskGraph;
use crate::render::{self, RenderContext};
use crate::scope::VariableContext;
use serde_yaml::Value;
use std::collections::HashMap;

/// Which hook list of a task is being expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreRun,
    PostRun,
    Failure,
}

/// One hook invocation, ready to be run as a nested task
#[derive(Debug, Clone)]
pub struct HookInvocation {
    /// Canonical `group.task` name of the hook target
    pub target: String,

    /// Rendered argument overrides for the target
    pub args: HashMap<String, Value>,
}

/// Expand the hooks of one phase into ordered invocations. Hooks whose `if`
/// condition renders falsy are dropped; declaration order is preserved.
pub fn expand(
    graph: &TaskGraph,
    hooks: &[HookRef],
    phase: HookPhase,
    ctx: &VariableContext,
) -> Result<Vec<HookInvocation>> {
    let scope = match phase {
        HookPhase::PreRun => "pre-run hook",
        HookPhase::PostRun => "post-run hook",
        HookPhase::Failure => "failure hook",
    };
    let render_ctx = ctx.render_ctx(scope);

    let mut invocations = Vec::new();
    for hook in hooks {
        if let Some(condition) = hook.condition() {
            if !render::render_bool(condition, &render_ctx)? {
                continue;
            }
        }

        invocations.push(HookInvocation {
            target: graph.qualify(hook.target())?,
            args: render_args(hook.args(), &render_ctx)?,
        });
    }

    Ok(invocations)
}

/// Render each override value. String values go through the template engine
/// and are reparsed so numeric and boolean overrides keep their type.
fn render_args(
    args: Option<&HashMap<String, Value>>,
    render_ctx: &RenderContext<'_>,
) -> Result<HashMap<String, Value>> {
    let Some(args) = args else {
        return Ok(HashMap::new());
    };

    let mut rendered = HashMap::with_capacity(args.len());
    for (name, value) in args {
        let value = match value {
            Value::String(s) => render::render_value(s, render_ctx)?,
            other => other.clone(),
        };
        rendered.insert(name.clone(), value);
    }
    Ok(rendered)
}
