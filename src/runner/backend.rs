//! Shell/interpreter backends
//!
//! A backend turns a rendered script file into a process invocation. Known
//! interpreter families get their conventional flags; anything else is a
//! generic named-executable pass-through.

use crate::config::HostDef;
use std::path::Path;

/// A task execution backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Sh,
    Bash,
    Zsh,
    Python,
    Node,
    /// Any named executable; extra args are passed before the script path
    Generic {
        program: String,
        args: Vec<String>,
        suffix: String,
    },
}

/// Default script suffix for generic backends
const GENERIC_SUFFIX: &str = ".tasku";

impl Default for Backend {
    fn default() -> Self {
        Backend::Sh
    }
}

impl Backend {
    /// Parse a backend spec string, e.g. `"bash"`, `"python -u"`, or any
    /// `"program arg1 arg2"` pass-through. An optional trailing
    /// `suffix=.ext` word sets the script suffix for generic backends.
    pub fn from_spec(spec: Option<&str>) -> Backend {
        let Some(spec) = spec else {
            return Backend::default();
        };

        let mut words: Vec<String> = spec.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            return Backend::default();
        }

        let mut suffix = GENERIC_SUFFIX.to_string();
        if let Some(last) = words.last() {
            if let Some(ext) = last.strip_prefix("suffix=") {
                suffix = ext.to_string();
                words.pop();
            }
        }

        let program = words.remove(0);
        match (program.as_str(), words.is_empty()) {
            ("sh", true) => Backend::Sh,
            ("bash", true) => Backend::Bash,
            ("zsh", true) => Backend::Zsh,
            ("python" | "python3", true) => Backend::Python,
            ("node" | "nodejs", true) => Backend::Node,
            _ => Backend::Generic {
                program,
                args: words,
                suffix,
            },
        }
    }

    /// Executable name
    pub fn program(&self) -> &str {
        match self {
            Backend::Sh => "sh",
            Backend::Bash => "bash",
            Backend::Zsh => "zsh",
            Backend::Python => "python3",
            Backend::Node => "node",
            Backend::Generic { program, .. } => program,
        }
    }

    /// Suffix given to the transient script file
    pub fn script_suffix(&self) -> &str {
        match self {
            Backend::Sh | Backend::Bash | Backend::Zsh => ".sh",
            Backend::Python => ".py",
            Backend::Node => ".js",
            Backend::Generic { suffix, .. } => suffix,
        }
    }

    /// Whether the backend executes line-oriented shell scripts, where
    /// stop-on-first-failing-line applies
    pub fn is_line_oriented(&self) -> bool {
        matches!(self, Backend::Sh | Backend::Bash | Backend::Zsh)
    }

    /// Build the local invocation for a script file
    pub fn build_invocation(&self, script: &Path, stop_on_error: bool) -> (String, Vec<String>) {
        let mut args = Vec::new();

        if stop_on_error && self.is_line_oriented() {
            args.push("-e".to_string());
        }

        if let Backend::Generic {
            args: extra_args, ..
        } = self
        {
            args.extend(extra_args.iter().cloned());
        }

        args.push(script.display().to_string());
        (self.program().to_string(), args)
    }

    /// Build a remote invocation routed through the system ssh client; the
    /// script is fed on stdin to the interpreter running on the host
    pub fn build_remote_invocation(
        &self,
        host: &HostDef,
        stop_on_error: bool,
    ) -> (String, Vec<String>) {
        let mut args = vec!["-p".to_string(), host.port.to_string()];

        if let Some(key) = &host.key {
            args.push("-i".to_string());
            args.push(key.clone());
        }

        let destination = match &host.user {
            Some(user) => format!("{}@{}", user, host.host),
            None => host.host.clone(),
        };
        args.push(destination);

        let mut remote_cmd = vec![self.program().to_string()];
        if stop_on_error && self.is_line_oriented() {
            remote_cmd.push("-e".to_string());
        }
        if self.is_line_oriented() {
            remote_cmd.push("-s".to_string());
        }
        args.push(remote_cmd.join(" "));

        ("ssh".to_string(), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_backend_is_sh() {
        assert_eq!(Backend::from_spec(None), Backend::Sh);
    }

    #[test]
    fn test_known_interpreters() {
        assert_eq!(Backend::from_spec(Some("bash")), Backend::Bash);
        assert_eq!(Backend::from_spec(Some("python")), Backend::Python);
        assert_eq!(Backend::from_spec(Some("python3")), Backend::Python);
        assert_eq!(Backend::from_spec(Some("node")), Backend::Node);
    }

    #[test]
    fn test_generic_backend_with_args() {
        let backend = Backend::from_spec(Some("ruby -w"));
        match &backend {
            Backend::Generic {
                program,
                args,
                suffix,
            } => {
                assert_eq!(program, "ruby");
                assert_eq!(args, &vec!["-w".to_string()]);
                assert_eq!(suffix, ".tasku");
            }
            other => panic!("expected generic backend, got {:?}", other),
        }
    }

    #[test]
    fn test_generic_backend_custom_suffix() {
        let backend = Backend::from_spec(Some("ruby suffix=.rb"));
        assert_eq!(backend.script_suffix(), ".rb");
        assert_eq!(backend.program(), "ruby");
    }

    #[test]
    fn test_shell_invocation_stop_on_error() {
        let script = PathBuf::from("/tmp/x.sh");
        let (program, args) = Backend::Bash.build_invocation(&script, true);
        assert_eq!(program, "bash");
        assert_eq!(args, vec!["-e".to_string(), "/tmp/x.sh".to_string()]);

        let (_, args) = Backend::Bash.build_invocation(&script, false);
        assert_eq!(args, vec!["/tmp/x.sh".to_string()]);
    }

    #[test]
    fn test_python_invocation_ignores_stop_on_error() {
        let script = PathBuf::from("/tmp/x.py");
        let (program, args) = Backend::Python.build_invocation(&script, true);
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["/tmp/x.py".to_string()]);
    }

    #[test]
    fn test_remote_invocation() {
        let host = HostDef {
            host: "example.com".to_string(),
            port: 2222,
            user: Some("deploy".to_string()),
            password: None,
            key: Some("~/.ssh/id".to_string()),
        };
        let (program, args) = Backend::Sh.build_remote_invocation(&host, true);
        assert_eq!(program, "ssh");
        assert_eq!(
            args,
            vec![
                "-p".to_string(),
                "2222".to_string(),
                "-i".to_string(),
                "~/.ssh/id".to_string(),
                "deploy@example.com".to_string(),
                "sh -e -s".to_string(),
            ]
        );
    }
}
