//! Console output
//!
//! Status messages go to stderr so they never mix with command output.

use colored::Colorize;

/// Verbosity levels for console output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet = 0,
    Normal = 1,
    Verbose = 2,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Normal
    }
}

/// Print an informational message
pub fn print_info(verbosity: Verbosity, message: &str) {
    if verbosity >= Verbosity::Normal {
        eprintln!("{} {}", "[tasku]".blue(), message);
    }
}

/// Print a debug message (verbose mode only)
pub fn print_debug(verbosity: Verbosity, message: &str) {
    if verbosity >= Verbosity::Verbose {
        eprintln!("{} {}", "[tasku]".dimmed(), message.dimmed());
    }
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[tasku]".red().bold(), message.red());
}

/// Print a warning message
pub fn print_warning(verbosity: Verbosity, message: &str) {
    if verbosity >= Verbosity::Quiet {
        eprintln!("{} {}", "[tasku]".yellow(), message.yellow());
    }
}
