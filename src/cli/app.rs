//! Main CLI application
//!
//! The command surface is generated from the loaded configuration: every
//! public task becomes a subcommand named `group.task`, with per-argument
//! options derived from the task's arg specs.

use crate::config::{parse_config_auto, parse_config_file, ArgSpec, TaskDef};
use crate::error::TaskuError;
use crate::graph::TaskGraph;
use crate::runner::{RunController, RunOptions};
use crate::scope::Attended;
use crate::ui::Verbosity;
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_yaml::Value;
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;

/// CLI application
pub struct App {
    command: Command,
    graph: TaskGraph,
}

impl App {
    /// Create the app, discovering the config file from the working
    /// directory upward
    pub fn new() -> Result<Self, TaskuError> {
        let (config, config_path) = parse_config_auto()?;
        let graph = TaskGraph::load(config, Some(config_path))?;
        let command = build_command(&graph);
        Ok(App { command, graph })
    }

    /// Create the app from a specific config file
    pub fn with_config_file(path: PathBuf) -> Result<Self, TaskuError> {
        let config = parse_config_file(&path)?;
        let graph = TaskGraph::load(config, Some(path))?;
        let command = build_command(&graph);
        Ok(App { command, graph })
    }

    /// Parse command line arguments and run the selected task
    pub fn run(mut self) -> Result<(), TaskuError> {
        let matches = self.command.clone().get_matches();

        let (task_name, task_matches) = match matches.subcommand() {
            Some((name, sub_matches)) => (name.to_string(), sub_matches),
            None => {
                self.command.print_help().ok();
                println!();
                return Ok(());
            }
        };

        let handle = self.graph.lookup(&task_name)?;
        let cli_args = parse_task_args(handle.task, task_matches);

        let options = RunOptions {
            dry_run: matches.get_flag("dry-run"),
            skip_hooks: matches.get_flag("skip-hooks"),
            verbosity: get_verbosity(&matches),
            attended: if std::io::stdin().is_terminal() {
                Attended::Yes
            } else {
                Attended::No
            },
        };

        RunController::new(&self.graph, options).run_task(&task_name, &cli_args)
    }
}

/// Build the clap command from the task graph
fn build_command(graph: &TaskGraph) -> Command {
    let name = graph
        .config
        .name
        .clone()
        .unwrap_or_else(|| "tasku".to_string());

    let mut cmd = Command::new(name)
        .version(env!("CARGO_PKG_VERSION"))
        .about("A YAML-based hierarchical task runner")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to the tasku.yaml config file")
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Resolve and print commands without executing them")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("skip-hooks")
                .long("skip-hooks")
                .help("Run task bodies only, skipping every hook")
                .action(ArgAction::SetTrue)
                .global(true),
        );

    for qualified in graph.qualified_names() {
        let handle = match graph.lookup(&qualified) {
            Ok(handle) => handle,
            Err(_) => continue,
        };

        // private tasks stay reachable as hooks but get no subcommand
        if handle.task.private {
            continue;
        }

        let mut task_cmd =
            Command::new(qualified.clone()).about(handle.task.help.clone().unwrap_or_default());

        if let Some(group_help) = &handle.group.help {
            task_cmd = task_cmd.long_about(format!(
                "{}\n\nGroup: {}",
                handle.task.help.clone().unwrap_or_default(),
                group_help
            ));
        }

        for (arg_name, spec) in &handle.task.args {
            task_cmd = task_cmd.arg(build_arg(arg_name, spec));
        }

        cmd = cmd.subcommand(task_cmd);
    }

    cmd
}

/// Build one clap option from an arg spec. Defaults and prompting happen
/// during scope resolution, so the option itself is never required here.
fn build_arg(name: &str, spec: &ArgSpec) -> Arg {
    let mut arg = Arg::new(name.to_string())
        .long(name.to_string())
        .help(spec.help.clone().unwrap_or_default());

    if spec.is_flag() {
        arg = arg.action(ArgAction::SetTrue);
    } else {
        arg = arg.value_name(name.to_uppercase().replace('-', "_"));
    }

    arg
}

/// Collect explicitly provided argument values. Unset options are absent
/// from the map, letting defaults, prompts and required checks apply.
fn parse_task_args(task: &TaskDef, matches: &ArgMatches) -> HashMap<String, Value> {
    let mut args = HashMap::new();

    for (name, spec) in &task.args {
        if spec.is_flag() {
            if matches.get_flag(name) {
                args.insert(name.clone(), Value::Bool(true));
            }
        } else if let Some(value) = matches.get_one::<String>(name) {
            args.insert(name.clone(), Value::String(value.clone()));
        }
    }

    args
}

fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Entry point used by the binary
pub fn run() -> Result<(), TaskuError> {
    let args: Vec<String> = std::env::args().collect();

    let app = match extract_file_arg(&args) {
        Some(path) => App::with_config_file(path)?,
        None => App::new()?,
    };

    app.run()
}

/// Extract the --file argument before clap parsing; the command surface
/// itself depends on which file is loaded
fn extract_file_arg(args: &[String]) -> Option<PathBuf> {
    for i in 0..args.len() {
        if (args[i] == "--file" || args[i] == "-f") && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
    }
    None
}
