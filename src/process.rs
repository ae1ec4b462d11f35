//! External command helper.
//!
//! Provisioning shells out to system utilities (useradd, chpasswd,
//! ssh-keygen). This wraps `std::process::Command` with captured output,
//! context-rich errors, and an `allow_fail` escape hatch for commands
//! whose failure is tolerated.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Builder for an external command invocation.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
    allow_fail: bool,
}

/// Captured result of a finished command.
pub struct CmdResult {
    pub stdout: String,
    pub stderr: String,
    status: std::process::ExitStatus,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.display().to_string());
        self
    }

    /// Pipe `input` to the child's stdin (chpasswd reads "user:pass").
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// A non-zero exit is reported in the result instead of as an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Run the command to completion, capturing stdout and stderr.
    pub fn run(self) -> Result<CmdResult> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = if let Some(input) = &self.stdin {
            use std::io::Write;
            command.stdin(Stdio::piped());
            let mut child = command
                .spawn()
                .with_context(|| format!("failed to spawn '{}'", self.program))?;
            child
                .stdin
                .take()
                .context("child stdin not captured")?
                .write_all(input.as_bytes())
                .with_context(|| format!("failed to write stdin of '{}'", self.program))?;
            child
                .wait_with_output()
                .with_context(|| format!("failed to wait for '{}'", self.program))?
        } else {
            command
                .output()
                .with_context(|| format!("failed to run '{}'", self.program))?
        };

        let result = CmdResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status,
        };

        if !result.success() && !self.allow_fail {
            bail!(
                "'{} {}' failed ({}): {}",
                self.program,
                self.args.join(" "),
                result.status,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}

/// Locate a program on PATH. Returns the full path if found.
pub fn which(program: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// True if a program is available on PATH.
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let result = Cmd::new("echo").arg("hello").run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn test_failure_is_error() {
        let result = Cmd::new("false").run();
        assert!(result.is_err());
    }

    #[test]
    fn test_allow_fail() {
        let result = Cmd::new("false").allow_fail().run().unwrap();
        assert!(!result.success());
    }

    #[test]
    fn test_stdin_piped() {
        let result = Cmd::new("cat").stdin("user:pass\n").run().unwrap();
        assert_eq!(result.stdout, "user:pass\n");
    }

    #[test]
    fn test_which_existing() {
        assert!(which("ls").is_some());
        assert!(exists("ls"));
    }

    #[test]
    fn test_which_nonexistent() {
        assert!(!exists("definitely_not_a_real_command_12345"));
    }
}
