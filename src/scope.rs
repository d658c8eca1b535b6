//! Scope resolution
//!
//! Builds the layered variable context for a task invocation: process
//! environment, env-files and literal `env:` entries merged global -> group
//! -> task, `vars` merged the same way (but never exported to the process
//! environment), and `args` bound from CLI values, defaults and prompts.

use crate::config::{ArgSpec, TaskDef};
use crate::error::{ConfigError, Result, ScopeError};
use crate::graph::{TaskGraph, TaskHandle};
use crate::render::{self, RenderContext};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The fully resolved variable context for one invocation
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// Merged environment: process env, env-files and literal `env:` layers
    pub env: HashMap<String, String>,

    /// Merged template variables; visible to templates only
    pub vars: HashMap<String, Value>,

    /// Bound arguments for the active invocation
    pub args: HashMap<String, Value>,
}

impl VariableContext {
    /// Render context over this scope for the given layer name
    pub fn render_ctx<'a>(&'a self, scope: &'a str) -> RenderContext<'a> {
        RenderContext::new(&self.env, &self.vars, &self.args, scope)
    }
}

/// How argument values missing from the CLI are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attended {
    /// Interactive args may prompt the user
    Yes,
    /// Never prompt; missing required args fail
    #[default]
    No,
}

/// Resolve the variable context for a task.
///
/// Layer order is global -> group -> task; within each layer the env-file
/// loads first and literal `env:` entries override it. A name defined in a
/// closer layer shadows the same name from a farther one.
pub fn resolve(
    graph: &TaskGraph,
    handle: &TaskHandle<'_>,
    cli_args: &HashMap<String, Value>,
    attended: Attended,
) -> Result<VariableContext> {
    let mut ctx = VariableContext {
        env: std::env::vars().collect(),
        vars: HashMap::new(),
        args: HashMap::new(),
    };

    let base_dir = config_dir(graph);

    merge_layer(
        &mut ctx,
        "global",
        graph.config.env_file.as_deref(),
        &graph.config.env,
        &graph.config.vars,
        &base_dir,
    )?;
    merge_layer(
        &mut ctx,
        "group",
        handle.group.env_file.as_deref(),
        &handle.group.env,
        &handle.group.vars,
        &base_dir,
    )?;
    merge_layer(
        &mut ctx,
        "task",
        handle.task.env_file.as_deref(),
        &handle.task.env,
        &handle.task.vars,
        &base_dir,
    )?;

    bind_args(&mut ctx, handle.task, cli_args, attended)?;

    Ok(ctx)
}

fn config_dir(graph: &TaskGraph) -> PathBuf {
    graph
        .config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn merge_layer(
    ctx: &mut VariableContext,
    scope: &str,
    env_file: Option<&str>,
    env: &HashMap<String, Value>,
    vars: &HashMap<String, Value>,
    base_dir: &Path,
) -> Result<()> {
    if let Some(env_file) = env_file {
        load_env_file(ctx, env_file, base_dir)?;
    }

    // Literal env entries override same-layer env-file values. Sorted for a
    // deterministic resolution order; an entry may reference env and vars
    // that are already resolved.
    let mut names: Vec<&String> = env.keys().collect();
    names.sort();
    for name in names {
        let raw = render::stringify(&env[name]);
        let rendered = render::render(&raw, &ctx.render_ctx(scope))?;
        ctx.env.insert(name.clone(), rendered);
    }

    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();
    for name in names {
        let value = render_var(&vars[name], ctx, scope)?;
        let value = alias_dashed_keys(value);
        ctx.vars.insert(name.clone(), value.clone());
        if name.contains('-') {
            ctx.vars.insert(name.replace('-', "_"), value);
        }
    }

    Ok(())
}

/// String vars are rendered against the layers resolved so far; containers
/// are rendered element-wise
fn render_var(value: &Value, ctx: &VariableContext, scope: &str) -> Result<Value> {
    Ok(match value {
        Value::String(s) => render::render_value(s, &ctx.render_ctx(scope))?,
        Value::Sequence(seq) => Value::Sequence(
            seq.iter()
                .map(|v| render_var(v, ctx, scope))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in map {
                out.insert(k.clone(), render_var(v, ctx, scope)?);
            }
            Value::Mapping(out)
        }
        other => other.clone(),
    })
}

/// Replicate dash-named mapping keys under their underscore form, so
/// templates can use attribute access on them
fn alias_dashed_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in map {
                let v = alias_dashed_keys(v);
                if let Value::String(name) = &k {
                    if name.contains('-') {
                        out.insert(Value::String(name.replace('-', "_")), v.clone());
                    }
                }
                out.insert(k, v);
            }
            Value::Mapping(out)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(alias_dashed_keys).collect()),
        other => other,
    }
}

fn load_env_file(ctx: &mut VariableContext, env_file: &str, base_dir: &Path) -> Result<()> {
    let path = if Path::new(env_file).is_absolute() {
        PathBuf::from(env_file)
    } else {
        base_dir.join(env_file)
    };

    let entries = dotenvy::from_path_iter(&path).map_err(|e| ConfigError::EnvFile {
        path: path.clone(),
        error: e.to_string(),
    })?;

    for entry in entries {
        let (key, value) = entry.map_err(|e| ConfigError::EnvFile {
            path: path.clone(),
            error: e.to_string(),
        })?;
        ctx.env.insert(key, value);
    }

    Ok(())
}

fn bind_args(
    ctx: &mut VariableContext,
    task: &TaskDef,
    cli_args: &HashMap<String, Value>,
    attended: Attended,
) -> Result<()> {
    // declaration order, so interactive prompts appear as written
    for (name, spec) in &task.args {
        let value = bind_one_arg(name, spec, cli_args.get(name.as_str()), attended)?;
        validate_arg(name, spec, &value)?;

        ctx.args.insert(name.clone(), value.clone());
        if name.contains('-') {
            ctx.args.insert(name.replace('-', "_"), value);
        }
    }

    Ok(())
}

fn bind_one_arg(
    name: &str,
    spec: &ArgSpec,
    supplied: Option<&Value>,
    attended: Attended,
) -> Result<Value> {
    if let Some(value) = supplied {
        return coerce_arg(name, spec, value.clone());
    }

    if let Some(default) = &spec.default {
        return coerce_arg(name, spec, default.clone());
    }

    if spec.is_flag() {
        return Ok(Value::Bool(false));
    }

    if spec.interactive && attended == Attended::Yes {
        let prompt = spec.help.clone().unwrap_or_else(|| name.to_string());
        let input: String = dialoguer::Input::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| ScopeError::Prompt {
                name: name.to_string(),
                error: e.to_string(),
            })?;
        return coerce_arg(name, spec, Value::String(input));
    }

    if spec.required {
        return Err(ScopeError::MissingRequiredArgument(name.to_string()).into());
    }

    Ok(Value::Null)
}

/// Coerce a supplied value to the declared argument type
fn coerce_arg(name: &str, spec: &ArgSpec, value: Value) -> Result<Value> {
    let fail = |error: String| -> crate::error::TaskuError {
        ScopeError::ValidationError {
            name: name.to_string(),
            error,
        }
        .into()
    };

    match spec.arg_type.as_str() {
        "bool" => match value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" | "" => Ok(Value::Bool(false)),
                other => Err(fail(format!("expected a boolean, got '{}'", other))),
            },
            other => Err(fail(format!("expected a boolean, got {:?}", other))),
        },
        "integer" | "int" => match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| fail(format!("expected an integer, got '{}'", s))),
            other => Err(fail(format!("expected an integer, got {:?}", other))),
        },
        "float" => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| fail(format!("expected a float, got '{}'", s))),
            other => Err(fail(format!("expected a float, got {:?}", other))),
        },
        "list" => match value {
            Value::Sequence(_) => Ok(value),
            Value::String(s) => Ok(Value::Sequence(
                s.split(',')
                    .map(|item| Value::String(item.trim().to_string()))
                    .collect(),
            )),
            other => Err(fail(format!("expected a list, got {:?}", other))),
        },
        _ => match value {
            Value::String(s) => Ok(Value::String(s.trim().to_string())),
            other => Ok(Value::String(render::stringify(&other))),
        },
    }
}

/// Range-check numeric arguments with a `validations` block
fn validate_arg(name: &str, spec: &ArgSpec, value: &Value) -> Result<()> {
    let Some(validations) = &spec.validations else {
        return Ok(());
    };

    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::Null => return Ok(()),
        _ => None,
    };

    let Some(number) = number else {
        return Ok(());
    };

    if let Some(min) = validations.min_value {
        if number < min {
            return Err(ScopeError::ValidationError {
                name: name.to_string(),
                error: format!("value {} is below the minimum of {}", number, min),
            }
            .into());
        }
    }

    if let Some(max) = validations.max_value {
        if number > max {
            return Err(ScopeError::ValidationError {
                name: name.to_string(),
                error: format!("value {} is above the maximum of {}", number, max),
            }
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use std::fs;
    use tempfile::TempDir;

    fn graph_from(yaml: &str) -> TaskGraph {
        TaskGraph::load(parse_config(yaml).unwrap(), None).unwrap()
    }

    fn graph_from_with_path(yaml: &str, path: PathBuf) -> TaskGraph {
        TaskGraph::load(parse_config(yaml).unwrap(), Some(path)).unwrap()
    }

    #[test]
    fn test_env_precedence_task_over_group_over_global() {
        let graph = graph_from(
            r#"
env:
  WHO: global
  ONLY_GLOBAL: g
groups:
  g1:
    env:
      WHO: group
    tasks:
      t1:
        env:
          WHO: task
        run: echo
      t2:
        run: echo
"#,
        );

        let handle = graph.lookup("g1.t1").unwrap();
        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();
        assert_eq!(ctx.env["WHO"], "task");
        assert_eq!(ctx.env["ONLY_GLOBAL"], "g");

        let handle = graph.lookup("g1.t2").unwrap();
        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();
        assert_eq!(ctx.env["WHO"], "group");
    }

    #[test]
    fn test_vars_shadowing_and_no_env_export() {
        let graph = graph_from(
            r#"
vars:
  project: outer
groups:
  g1:
    vars:
      project: inner
    tasks:
      t1:
        run: echo
"#,
        );

        let handle = graph.lookup("g1.t1").unwrap();
        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();
        assert_eq!(ctx.vars["project"], Value::from("inner"));
        assert!(!ctx.env.contains_key("project"));
    }

    #[test]
    fn test_env_file_layering() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("global.env"), "ENV=dev\nSHARED=a\n").unwrap();
        fs::write(temp.path().join("group.env"), "ENV=prod\n").unwrap();

        let yaml = r#"
env-file: global.env
groups:
  g1:
    env-file: group.env
    tasks:
      t1:
        run: echo
  g2:
    tasks:
      t1:
        run: echo
"#;
        let graph = graph_from_with_path(yaml, temp.path().join("tasku.yaml"));

        let handle = graph.lookup("g1.t1").unwrap();
        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();
        assert_eq!(ctx.env["ENV"], "prod");
        assert_eq!(ctx.env["SHARED"], "a");

        // group without its own env-file inherits the global one
        let handle = graph.lookup("g2.t1").unwrap();
        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();
        assert_eq!(ctx.env["ENV"], "dev");
    }

    #[test]
    fn test_literal_env_overrides_same_layer_env_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("layer.env"), "ENV=from-file\n").unwrap();

        let yaml = r#"
env-file: layer.env
env:
  ENV: from-literal
groups:
  g1:
    tasks:
      t1:
        run: echo
"#;
        let graph = graph_from_with_path(yaml, temp.path().join("tasku.yaml"));
        let handle = graph.lookup("g1.t1").unwrap();
        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();
        assert_eq!(ctx.env["ENV"], "from-literal");
    }

    #[test]
    fn test_env_chaining_from_outer_scope() {
        let graph = graph_from(
            r#"
env:
  BASE: /srv
groups:
  g1:
    env:
      APP_DIR: ${{ env.BASE }}/app
    vars:
      data_dir: ${{ env.APP_DIR }}/data
    tasks:
      t1:
        run: echo
"#,
        );

        let handle = graph.lookup("g1.t1").unwrap();
        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();
        assert_eq!(ctx.env["APP_DIR"], "/srv/app");
        assert_eq!(ctx.vars["data_dir"], Value::from("/srv/app/data"));
    }

    #[test]
    fn test_missing_env_file() {
        let temp = TempDir::new().unwrap();
        let yaml = r#"
env-file: nope.env
groups:
  g1:
    tasks:
      t1:
        run: echo
"#;
        let graph = graph_from_with_path(yaml, temp.path().join("tasku.yaml"));
        let handle = graph.lookup("g1.t1").unwrap();
        let result = resolve(&graph, &handle, &HashMap::new(), Attended::No);
        assert!(result.is_err());
    }

    #[test]
    fn test_arg_binding_cli_over_default() {
        let graph = graph_from(
            r#"
groups:
  g1:
    tasks:
      t1:
        args:
          name:
            default: world
        run: echo
"#,
        );
        let handle = graph.lookup("g1.t1").unwrap();

        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();
        assert_eq!(ctx.args["name"], Value::from("world"));

        let mut cli = HashMap::new();
        cli.insert("name".to_string(), Value::from("cli"));
        let ctx = resolve(&graph, &handle, &cli, Attended::No).unwrap();
        assert_eq!(ctx.args["name"], Value::from("cli"));
    }

    #[test]
    fn test_required_arg_without_default_fails() {
        let graph = graph_from(
            r#"
groups:
  g1:
    tasks:
      t1:
        args:
          target:
            required: true
        run: echo
"#,
        );
        let handle = graph.lookup("g1.t1").unwrap();
        let result = resolve(&graph, &handle, &HashMap::new(), Attended::No);
        match result {
            Err(crate::error::TaskuError::Scope(ScopeError::MissingRequiredArgument(name))) => {
                assert_eq!(name, "target");
            }
            other => panic!("expected MissingRequiredArgument, got {:?}", other),
        }
    }

    #[test]
    fn test_flag_defaults_to_false() {
        let graph = graph_from(
            r#"
groups:
  g1:
    tasks:
      t1:
        args:
          clean:
            type: bool
            action: store_true
        run: echo
"#,
        );
        let handle = graph.lookup("g1.t1").unwrap();
        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();
        assert_eq!(ctx.args["clean"], Value::Bool(false));
    }

    #[test]
    fn test_dashed_arg_gets_underscore_alias() {
        let graph = graph_from(
            r#"
groups:
  g1:
    tasks:
      t1:
        args:
          dry-run:
            type: bool
        run: echo
"#,
        );
        let handle = graph.lookup("g1.t1").unwrap();
        let mut cli = HashMap::new();
        cli.insert("dry-run".to_string(), Value::Bool(true));
        let ctx = resolve(&graph, &handle, &cli, Attended::No).unwrap();
        assert_eq!(ctx.args["dry-run"], Value::Bool(true));
        assert_eq!(ctx.args["dry_run"], Value::Bool(true));
    }

    #[test]
    fn test_integer_coercion_and_range_validation() {
        let graph = graph_from(
            r#"
groups:
  g1:
    tasks:
      t1:
        args:
          workers:
            type: integer
            validations:
              min-value: 1
              max-value: 8
        run: echo
"#,
        );
        let handle = graph.lookup("g1.t1").unwrap();

        let mut cli = HashMap::new();
        cli.insert("workers".to_string(), Value::from("4"));
        let ctx = resolve(&graph, &handle, &cli, Attended::No).unwrap();
        assert_eq!(ctx.args["workers"], Value::from(4));

        cli.insert("workers".to_string(), Value::from("12"));
        let result = resolve(&graph, &handle, &cli, Attended::No);
        match result {
            Err(crate::error::TaskuError::Scope(ScopeError::ValidationError {
                name,
                error,
            })) => {
                assert_eq!(name, "workers");
                assert!(error.contains("maximum"), "error was: {}", error);
            }
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_vars_dash_alias() {
        let graph = graph_from(
            r#"
groups:
  g1:
    vars:
      build-opts:
        opt-level: high
    tasks:
      t1:
        run: echo
"#,
        );
        let handle = graph.lookup("g1.t1").unwrap();
        let ctx = resolve(&graph, &handle, &HashMap::new(), Attended::No).unwrap();

        let aliased = &ctx.vars["build_opts"];
        let inner = aliased.get("opt_level").unwrap();
        assert_eq!(inner, &Value::from("high"));
    }

    #[test]
    fn test_list_arg_from_comma_string() {
        let graph = graph_from(
            r#"
groups:
  g1:
    tasks:
      t1:
        args:
          features:
            type: list
        run: echo
"#,
        );
        let handle = graph.lookup("g1.t1").unwrap();
        let mut cli = HashMap::new();
        cli.insert("features".to_string(), Value::from("a, b, c"));
        let ctx = resolve(&graph, &handle, &cli, Attended::No).unwrap();
        let seq = ctx.args["features"].as_sequence().unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq[1], Value::from("b"));
    }
}
