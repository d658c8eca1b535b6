//! Integration tests for task execution, hooks and the CLI binary

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use std::collections::HashMap;
use std::fs;
use tasku::config::parse_config_file;
use tasku::graph::TaskGraph;
use tasku::runner::{RunController, RunOptions};
use tasku::scope::Attended;
use tasku::ui::Verbosity;

fn run_task(config_path: &std::path::Path, task: &str) -> tasku::Result<()> {
    let config = parse_config_file(config_path).unwrap();
    let graph = TaskGraph::load(config, Some(config_path.to_path_buf())).unwrap();
    let controller = RunController::new(
        &graph,
        RunOptions {
            verbosity: Verbosity::Quiet,
            attended: Attended::No,
            ..RunOptions::default()
        },
    );
    controller.run_task(task, &HashMap::new())
}

#[test]
fn test_execute_simple_task() {
    let (temp, config_path) = common::create_test_config("");
    let yaml = format!(
        r#"
groups:
  default:
    tasks:
      touch:
        dir: {}
        run: touch ran.txt
"#,
        temp.path().display()
    );
    fs::write(&config_path, yaml).unwrap();

    run_task(&config_path, "touch").unwrap();
    assert!(temp.path().join("ran.txt").exists());
}

#[test]
fn test_failing_task_is_an_error() {
    let (_temp, config_path) = common::create_test_config(
        r#"
groups:
  default:
    tasks:
      fail:
        run: exit 4
"#,
    );

    assert!(run_task(&config_path, "fail").is_err());
}

#[test]
fn test_scope_shadowing_task_wins() {
    let (temp, config_path) = common::create_test_config("");
    let out = temp.path().join("out");
    let yaml = format!(
        r#"
env:
  LEVEL: global
vars:
  who: global
groups:
  g:
    env:
      LEVEL: group
    tasks:
      t:
        env:
          LEVEL: task
        vars:
          who: task
        run: printf '%s-%s' "$LEVEL" "${{{{ vars.who }}}}" > {}
"#,
        out.display()
    );
    fs::write(&config_path, yaml).unwrap();

    run_task(&config_path, "g.t").unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "task-task");
}

#[test]
fn test_env_file_layering_and_literal_override() {
    let (temp, config_path) = common::create_test_config("");
    fs::write(temp.path().join("base.env"), "FROM_FILE=file\nSHARED=file\n").unwrap();
    let out = temp.path().join("out");
    let yaml = format!(
        r#"
env-file: base.env
env:
  SHARED: literal
groups:
  g:
    tasks:
      t:
        run: printf '%s-%s' "$FROM_FILE" "$SHARED" > {}
"#,
        out.display()
    );
    fs::write(&config_path, yaml).unwrap();

    run_task(&config_path, "g.t").unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "file-literal");
}

#[test]
fn test_retry_makes_additional_attempts() {
    let (temp, config_path) = common::create_test_config("");
    let counter = temp.path().join("attempts");
    let yaml = format!(
        r#"
groups:
  g:
    tasks:
      flaky:
        retry:
          count: 2
          delay: 0
        run: |
          echo x >> {}
          exit 1
"#,
        counter.display()
    );
    fs::write(&config_path, yaml).unwrap();

    assert!(run_task(&config_path, "g.flaky").is_err());
    let attempts = fs::read_to_string(&counter).unwrap().lines().count();
    assert_eq!(attempts, 3, "count: 2 means two retries after the first run");
}

#[test]
fn test_conditional_clean_hook() {
    let (temp, config_path) = common::create_test_config("");
    let trace = temp.path().join("trace");
    let yaml = format!(
        r#"
groups:
  build:
    tasks:
      all:
        args:
          clean:
            type: bool
        hooks:
          pre-run:
            - task: build.clean
              if: ${{{{ args.clean }}}}
        run: echo build >> {trace}
      clean:
        run: echo clean >> {trace}
"#,
        trace = trace.display()
    );
    fs::write(&config_path, yaml).unwrap();

    // without the flag the clean hook is skipped
    run_task(&config_path, "build.all").unwrap();
    assert_eq!(fs::read_to_string(&trace).unwrap(), "build\n");

    fs::remove_file(&trace).unwrap();

    let config = parse_config_file(&config_path).unwrap();
    let graph = TaskGraph::load(config, Some(config_path.clone())).unwrap();
    let controller = RunController::new(
        &graph,
        RunOptions {
            verbosity: Verbosity::Quiet,
            attended: Attended::No,
            ..RunOptions::default()
        },
    );
    let mut args = HashMap::new();
    args.insert("clean".to_string(), serde_yaml::Value::Bool(true));
    controller.run_task("build.all", &args).unwrap();
    assert_eq!(fs::read_to_string(&trace).unwrap(), "clean\nbuild\n");
}

#[test]
fn test_log_file_receives_output() {
    let (temp, config_path) = common::create_test_config("");
    let log = temp.path().join("logs/run.log");
    let yaml = format!(
        r#"
groups:
  g:
    tasks:
      noisy:
        log:
          path: {}
          level: both
          format: "%(levelname)s %(task)s %(message)s"
        run: |
          echo visible
          echo problem >&2
"#,
        log.display()
    );
    fs::write(&config_path, yaml).unwrap();

    run_task(&config_path, "g.noisy").unwrap();
    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("OUT g.noisy visible"), "log: {}", contents);
    assert!(contents.contains("ERR g.noisy problem"), "log: {}", contents);
}

// --- CLI binary ---

#[test]
fn test_cli_runs_task_by_qualified_name() {
    let (temp, config_path) = common::create_test_config("");
    let marker = temp.path().join("done");
    let yaml = format!(
        r#"
groups:
  g:
    tasks:
      go:
        run: touch {}
"#,
        marker.display()
    );
    fs::write(&config_path, yaml).unwrap();

    Command::cargo_bin("tasku")
        .unwrap()
        .args(["-f", config_path.to_str().unwrap(), "g.go"])
        .assert()
        .success();
    assert!(marker.exists());
}

#[test]
fn test_cli_exit_code_on_task_failure() {
    let (_temp, config_path) = common::create_test_config(
        r#"
groups:
  g:
    tasks:
      bad:
        run: exit 3
"#,
    );

    Command::cargo_bin("tasku")
        .unwrap()
        .args(["-f", config_path.to_str().unwrap(), "g.bad"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_cli_exit_code_on_unknown_task() {
    let (_temp, config_path) = common::create_test_config(
        r#"
groups:
  g:
    tasks:
      ok:
        run: "true"
"#,
    );

    // unknown subcommands are rejected by the generated command surface
    Command::cargo_bin("tasku")
        .unwrap()
        .args(["-f", config_path.to_str().unwrap(), "g.missing"])
        .assert()
        .failure();
}

#[test]
fn test_cli_missing_required_argument_exits_2() {
    let (_temp, config_path) = common::create_test_config(
        r#"
groups:
  g:
    tasks:
      strict:
        args:
          version:
            type: string
            required: true
        run: echo ${{ args.version }}
"#,
    );

    Command::cargo_bin("tasku")
        .unwrap()
        .args(["-f", config_path.to_str().unwrap(), "g.strict"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("version"));
}

#[test]
fn test_cli_dry_run_prints_without_executing() {
    let (temp, config_path) = common::create_test_config("");
    let marker = temp.path().join("ran");
    let yaml = format!(
        r#"
groups:
  g:
    tasks:
      t:
        run: touch {}
"#,
        marker.display()
    );
    fs::write(&config_path, yaml).unwrap();

    Command::cargo_bin("tasku")
        .unwrap()
        .args(["-f", config_path.to_str().unwrap(), "--dry-run", "g.t"])
        .assert()
        .success()
        .stdout(predicate::str::contains("touch"));
    assert!(!marker.exists());
}

#[test]
fn test_cli_skip_hooks() {
    let (temp, config_path) = common::create_test_config("");
    let hook_marker = temp.path().join("hooked");
    let yaml = format!(
        r#"
groups:
  g:
    tasks:
      main:
        hooks:
          pre-run: [g.side]
        run: "true"
      side:
        run: touch {}
"#,
        hook_marker.display()
    );
    fs::write(&config_path, yaml).unwrap();

    Command::cargo_bin("tasku")
        .unwrap()
        .args(["-f", config_path.to_str().unwrap(), "--skip-hooks", "g.main"])
        .assert()
        .success();
    assert!(!hook_marker.exists());
}

#[test]
fn test_cli_task_argument_reaches_body() {
    let (temp, config_path) = common::create_test_config("");
    let out = temp.path().join("out");
    let yaml = format!(
        r#"
groups:
  g:
    tasks:
      greet:
        args:
          name:
            type: string
            default: world
        run: printf '%s' "${{{{ args.name }}}}" > {}
"#,
        out.display()
    );
    fs::write(&config_path, yaml).unwrap();

    Command::cargo_bin("tasku")
        .unwrap()
        .args(["-f", config_path.to_str().unwrap(), "g.greet", "--name", "rust"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&out).unwrap(), "rust");
}

#[test]
fn test_cli_help_lists_public_tasks() {
    let (_temp, config_path) = common::create_test_config(
        r#"
groups:
  g:
    tasks:
      visible:
        help: A visible task
        run: "true"
      hidden:
        private: true
        run: "true"
"#,
    );

    Command::cargo_bin("tasku")
        .unwrap()
        .args(["-f", config_path.to_str().unwrap(), "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("g.visible"))
        .stdout(predicate::str::contains("g.hidden").not());
}
