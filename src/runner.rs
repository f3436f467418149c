//! Child-process execution behind the [`CommandRunner`] capability.
//!
//! Build-system orchestration never touches `std::process` directly; it
//! hands a [`CommandSpec`] to a runner. The production [`SystemRunner`]
//! either streams output to the terminal (verbose installs) or captures
//! it for error reporting. Tests substitute a recording mock so no real
//! compilers run.

use crate::error::{KegError, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// A fully-described command: program, arguments, working directory, and
/// environment additions (the parent environment is inherited).
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            envs: Vec::new(),
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Shell-ish rendering for logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Captured output merged for error surfaces. Empty when streaming.
    pub fn combined(&self) -> String {
        let mut text = String::new();
        if !self.stdout.is_empty() {
            text.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

pub trait CommandRunner {
    /// Execute the command to completion. Non-zero exit is reported via
    /// `CommandOutput::success`, not an `Err`; failing to spawn at all is
    /// an `Err`.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    /// Stream child stdout/stderr to the terminal instead of capturing.
    pub stream: bool,
}

impl SystemRunner {
    pub fn new(stream: bool) -> Self {
        Self { stream }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(cwd = %spec.cwd.display(), "running: {}", spec.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null());

        if self.stream {
            let status = cmd.status().map_err(|e| KegError::Build {
                system: None,
                reason: format!("failed to execute {}: {e}", spec.program),
                output: None,
            })?;
            Ok(CommandOutput {
                success: status.success(),
                status_code: status.code(),
                stdout: String::new(),
                stderr: String::new(),
            })
        } else {
            let output = cmd.output().map_err(|e| KegError::Build {
                system: None,
                reason: format!("failed to execute {}: {e}", spec.program),
                output: None,
            })?;
            Ok(CommandOutput {
                success: output.status.success(),
                status_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}
