//! Task file logging
//!
//! Duplicates captured task output into a log file, one formatted line per
//! output line. File logging is additive: the file is opened in append mode
//! and console output is unaffected.

use crate::config::{LogLevel, LogSpec};
use crate::error::ExecutionError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Default line format when the log spec does not set one
const DEFAULT_FORMAT: &str = "%(asctime)s [%(levelname)s] %(task)s: %(message)s";

/// An open task log
#[derive(Debug)]
pub struct TaskLogger {
    file: File,
    path: PathBuf,
    format: String,
    level: LogLevel,
    task: String,
    source: String,
}

impl TaskLogger {
    /// Open the log file in append mode. Parent directories are created so a
    /// first run can log into a fresh path.
    pub fn open(
        spec: &LogSpec,
        task: &str,
        source: &str,
    ) -> std::result::Result<TaskLogger, ExecutionError> {
        let path = PathBuf::from(&spec.path);

        let map_err = |e: std::io::Error| ExecutionError::LogFile {
            path: path.clone(),
            error: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(map_err)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(map_err)?;

        Ok(TaskLogger {
            file,
            path,
            format: spec.format.clone().unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            level: spec.level,
            task: task.to_string(),
            source: source.to_string(),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Append one formatted line. `level_name` is OUT or ERR.
    pub fn log_line(&mut self, level_name: &str, message: &str) {
        let line = format_line(
            &self.format,
            &self.task,
            &self.source,
            level_name,
            message,
        );
        // a failed log write must not fail the task itself
        let _ = writeln!(self.file, "{}", line);
    }

    pub fn flush(&mut self) {
        let _ = self.file.flush();
    }
}

/// Expand `%(name)s` placeholders in the line format
fn format_line(format: &str, task: &str, source: &str, level_name: &str, message: &str) -> String {
    let asctime = timestamp();
    format
        .replace("%(asctime)s", &asctime)
        .replace("%(task)s", task)
        .replace("%(file)s", source)
        .replace("%(levelname)s", level_name)
        .replace("%(message)s", message)
}

/// Local wall-clock time as `YYYY-MM-DD HH:MM:SS`
fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_line_placeholders() {
        let line = format_line(
            "%(task)s | %(levelname)s | %(message)s",
            "g.t",
            "tasku.yaml",
            "OUT",
            "hello",
        );
        assert_eq!(line, "g.t | OUT | hello");
    }

    #[test]
    fn test_format_line_asctime_is_local_wall_clock() {
        let before = chrono::Local::now();
        let line = format_line("%(asctime)s", "g.t", "f", "OUT", "m");
        let after = chrono::Local::now();

        let stamp = chrono::NaiveDateTime::parse_from_str(&line, "%Y-%m-%d %H:%M:%S").unwrap();
        // truncated to whole seconds, so allow the enclosing second window
        assert!(stamp >= before.naive_local() - chrono::Duration::seconds(1));
        assert!(stamp <= after.naive_local() + chrono::Duration::seconds(1));
    }

    #[test]
    fn test_logger_appends_never_truncates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("task.log");
        let spec = LogSpec {
            path: path.display().to_string(),
            level: LogLevel::Both,
            format: Some("%(levelname)s %(message)s".to_string()),
        };

        let mut logger = TaskLogger::open(&spec, "g.t", "tasku.yaml").unwrap();
        logger.log_line("OUT", "first");
        logger.flush();
        drop(logger);

        let mut logger = TaskLogger::open(&spec, "g.t", "tasku.yaml").unwrap();
        logger.log_line("ERR", "second");
        logger.flush();
        drop(logger);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "OUT first\nERR second\n");
    }

    #[test]
    fn test_logger_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs/nested/task.log");
        let spec = LogSpec {
            path: path.display().to_string(),
            level: LogLevel::Out,
            format: None,
        };

        let mut logger = TaskLogger::open(&spec, "g.t", "f").unwrap();
        logger.log_line("OUT", "hi");
        logger.flush();
        assert!(path.exists());
    }

}
