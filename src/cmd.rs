use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Error from a command that ran but exited unsuccessfully.
///
/// Callers match on `stderr` when a specific failure must be recognized
/// (the empty cherry-pick signal from git, HTTP status lines from gh).
#[derive(Debug, thiserror::Error)]
#[error("'{command}' failed ({exit}): {}", output_summary(.stderr, .stdout))]
pub struct CmdError {
    pub command: String,
    pub exit: String,
    pub stderr: String,
    pub stdout: String,
}

// Some tools report errors on stdout (git commit with nothing to commit).
fn output_summary(stderr: &str, stdout: &str) -> String {
    [stderr.trim(), stdout.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builder for running external commands with captured output.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl Cmd {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            workdir: None,
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|a| a.to_string()));
        self
    }

    pub fn workdir(mut self, dir: &Path) -> Self {
        self.workdir = Some(dir.to_path_buf());
        self
    }

    /// Add an environment variable for the child process. Values are never
    /// logged; they may carry credentials.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    fn output(&self) -> Result<Output> {
        debug!(command = %self.command_line(), "cmd:run");
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command
            .output()
            .with_context(|| format!("Failed to execute '{}'", self.command_line()))
    }

    fn failure(&self, output: &Output) -> CmdError {
        let exit = match output.status.code() {
            Some(code) => format!("exit code {code}"),
            None => "killed by signal".to_string(),
        };
        CmdError {
            command: self.command_line(),
            exit,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        }
    }

    /// Run the command, failing if it exits unsuccessfully.
    pub fn run(self) -> Result<()> {
        let output = self.output()?;
        if !output.status.success() {
            return Err(self.failure(&output).into());
        }
        Ok(())
    }

    /// Run the command and report success as a boolean instead of an error.
    /// For commands whose exit code carries the answer (`diff --quiet`,
    /// probing fetches).
    pub fn run_as_check(self) -> Result<bool> {
        Ok(self.output()?.status.success())
    }

    /// Run the command and return its trimmed stdout.
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.output()?;
        if !output.status.success() {
            return Err(self.failure(&output).into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run the command and return the raw output for callers that need to
    /// inspect the exit code themselves.
    pub fn run_with_output(self) -> Result<Output> {
        self.output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_stdout_is_trimmed() {
        let version = Cmd::new("git")
            .args(&["--version"])
            .run_and_capture_stdout()
            .unwrap();
        assert!(version.starts_with("git version"));
        assert_eq!(version, version.trim());
    }

    #[test]
    fn test_failure_carries_command_and_stderr() {
        let err = Cmd::new("git")
            .args(&["check-ref-format", ".."])
            .run()
            .unwrap_err();
        let cmd_err = err.downcast_ref::<CmdError>().unwrap();
        assert!(cmd_err.command.contains("check-ref-format"));
        assert!(cmd_err.exit.starts_with("exit code"));
    }

    #[test]
    fn test_run_as_check_reports_exit_code() {
        assert!(Cmd::new("git").args(&["--version"]).run_as_check().unwrap());
    }
}
