//! Task body execution
//!
//! Writes the rendered command body to a transient script, invokes the
//! selected backend (locally or through the ssh client for remote hosts),
//! duplicates output to the task log, and drives the retry loop.

use crate::config::{HostDef, LogSpec, RetrySpec};
use crate::error::{ExecutionError, Result, TaskuError};
use crate::runner::backend::Backend;
use crate::runner::logging::TaskLogger;
use crate::ui::{self, Verbosity};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;

/// Everything the executor needs to run one task body
pub struct ExecSpec<'a> {
    pub qualified_name: &'a str,
    /// Fully rendered command body
    pub body: &'a str,
    pub backend: Backend,
    pub stop_on_error: bool,
    pub working_dir: Option<PathBuf>,
    pub env: &'a HashMap<String, String>,
    pub retry: Option<&'a RetrySpec>,
    pub log: Option<&'a LogSpec>,
    pub remote: Option<&'a HostDef>,
    /// Config file the task came from, for log line formatting
    pub source_file: &'a str,
}

/// What a finished (or failed) execution looked like
#[derive(Debug)]
pub struct ExecOutcome {
    /// Total attempts performed, including the first
    pub attempts: u32,
    /// Log file written, when logging was configured
    pub log_path: Option<PathBuf>,
}

/// Resolve the effective working directory top-down: the global directory
/// first, then the group's (absolute replaces, relative joins), then the
/// task's against the group's resolved directory.
pub fn resolve_working_directory(
    global: Option<&str>,
    group: Option<&str>,
    task: Option<&str>,
) -> Option<PathBuf> {
    let mut resolved: Option<PathBuf> = None;

    for level in [global, group, task].into_iter().flatten() {
        if level.is_empty() {
            continue;
        }
        resolved = Some(match resolved {
            // PathBuf::join replaces the base when the argument is absolute
            Some(base) => base.join(level),
            None => PathBuf::from(level),
        });
    }

    resolved
}

/// Run a task body with retry semantics. `retry.count` is the number of
/// additional attempts after the first failure; only the final attempt's
/// failure propagates to the caller.
pub fn run(spec: &ExecSpec<'_>, verbosity: Verbosity) -> std::result::Result<ExecOutcome, (TaskuError, ExecOutcome)> {
    let max_attempts = 1 + spec.retry.map(|r| r.count).unwrap_or(0);
    let delay = spec.retry.map(|r| r.delay).unwrap_or(0.0);

    let logger = match spec.log {
        Some(log_spec) => match TaskLogger::open(log_spec, spec.qualified_name, spec.source_file)
        {
            Ok(logger) => Some(Mutex::new(logger)),
            Err(e) => {
                return Err((
                    TaskuError::Execution(e),
                    ExecOutcome {
                        attempts: 0,
                        log_path: None,
                    },
                ))
            }
        },
        None => None,
    };
    let log_path = logger
        .as_ref()
        .map(|l| l.lock().expect("log lock").path().clone());

    let mut attempts = 0;
    loop {
        attempts += 1;
        let outcome = ExecOutcome {
            attempts,
            log_path: log_path.clone(),
        };

        match run_once(spec, logger.as_ref(), verbosity) {
            Ok(()) => return Ok(outcome),
            Err(e) => {
                // an unlaunchable backend is never retried
                let retryable = !matches!(
                    e,
                    TaskuError::Execution(ExecutionError::BackendUnavailable { .. })
                );

                if retryable && attempts < max_attempts {
                    ui::print_warning(
                        verbosity,
                        &format!(
                            "Task '{}' failed (attempt {}/{}), retrying",
                            spec.qualified_name, attempts, max_attempts
                        ),
                    );
                    if delay > 0.0 {
                        std::thread::sleep(Duration::from_secs_f64(delay));
                    }
                    continue;
                }

                return Err((e, outcome));
            }
        }
    }
}

fn run_once(
    spec: &ExecSpec<'_>,
    logger: Option<&Mutex<TaskLogger>>,
    verbosity: Verbosity,
) -> Result<()> {
    let script = write_script(spec)?;

    let (program, args) = match spec.remote {
        Some(host) => spec.backend.build_remote_invocation(host, spec.stop_on_error),
        None => spec.backend.build_invocation(script.path(), spec.stop_on_error),
    };

    ui::print_debug(
        verbosity,
        &format!("Spawning {} {}", program, args.join(" ")),
    );

    let mut command = Command::new(&program);
    command.args(&args);
    command.env_clear();
    command.envs(spec.env);

    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    // remote backends read the script on stdin
    match spec.remote {
        Some(_) => {
            let file = std::fs::File::open(script.path())?;
            command.stdin(Stdio::from(file));
        }
        None => {
            command.stdin(Stdio::inherit());
        }
    }

    let capture_out = logger
        .map(|l| l.lock().expect("log lock").level().captures_out())
        .unwrap_or(false);
    let capture_err = logger
        .map(|l| l.lock().expect("log lock").level().captures_err())
        .unwrap_or(false);

    command.stdout(if capture_out {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });
    command.stderr(if capture_err {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TaskuError::Execution(ExecutionError::BackendUnavailable {
                backend: program.clone(),
                error: e.to_string(),
            })
        } else {
            TaskuError::Io(e)
        }
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let status = std::thread::scope(|scope| {
        if let (Some(stdout), Some(logger)) = (stdout, logger) {
            scope.spawn(move || tee_stream(stdout, logger, "OUT"));
        }
        if let (Some(stderr), Some(logger)) = (stderr, logger) {
            scope.spawn(move || tee_stream(stderr, logger, "ERR"));
        }
        child.wait()
    })?;

    if let Some(logger) = logger {
        logger.lock().expect("log lock").flush();
    }

    if status.success() {
        return Ok(());
    }

    match status.code() {
        Some(code) => Err(TaskuError::Execution(ExecutionError::TaskFailed {
            task: spec.qualified_name.to_string(),
            code: Some(code),
        })),
        // killed by a signal: treat as interrupted, no further hooks run
        None => Err(TaskuError::Execution(ExecutionError::Interrupted {
            task: spec.qualified_name.to_string(),
        })),
    }
}

/// Forward one captured stream to the console and the task log
fn tee_stream<R: std::io::Read>(stream: R, logger: &Mutex<TaskLogger>, level_name: &str) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        match level_name {
            "ERR" => eprintln!("{}", line),
            _ => println!("{}", line),
        }
        logger.lock().expect("log lock").log_line(level_name, &line);
    }
}

/// Materialize the rendered body into a transient script file
fn write_script(spec: &ExecSpec<'_>) -> Result<tempfile::NamedTempFile> {
    let mut script = tempfile::Builder::new()
        .prefix("tasku-")
        .suffix(spec.backend.script_suffix())
        .tempfile()?;
    script.write_all(spec.body.as_bytes())?;
    script.flush()?;
    Ok(script)
}
