//! Async subprocess invocation for the external tools (`docker`, `kubectl`,
//! `minikube`).
//!
//! Every child is spawned with `kill_on_drop`, so dropping an in-flight
//! future (cancellation, or a sibling build failing) terminates the process.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Result, StackupError};

#[derive(Debug, Clone)]
pub struct Cmd {
    program: PathBuf,
    args: Vec<OsString>,
}

/// Captured result of a finished command. Not checked for success.
#[derive(Debug, Clone)]
pub struct Output {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Return stdout, or a `CommandFailed` error carrying stderr.
    pub fn checked(self, cmd: &Cmd) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(cmd.failure(self.code, self.stderr.trim().to_string()))
        }
    }
}

impl Cmd {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Human-readable command line for logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }

    fn failure(&self, code: Option<i32>, stderr: String) -> StackupError {
        StackupError::CommandFailed {
            command: self.display(),
            code: code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr,
        }
    }

    fn spawn_error(&self, source: std::io::Error) -> StackupError {
        StackupError::Spawn {
            program: self.program.display().to_string(),
            source,
        }
    }

    /// Run with stdout/stderr passed through to the terminal and fail on a
    /// non-zero exit.
    pub async fn status(&self) -> Result<()> {
        tracing::debug!(command = %self.display(), "running");
        let status = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if status.success() {
            Ok(())
        } else {
            Err(self.failure(status.code(), String::new()))
        }
    }

    /// Run with stdout and stderr captured, optionally feeding `stdin`.
    pub async fn output(&self, stdin: Option<&str>) -> Result<Output> {
        tracing::debug!(command = %self.display(), "running (captured)");
        let mut cmd = self.command();
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes()).await?;
                // Dropping the handle closes stdin so the child sees EOF.
            }
        }

        let out = child.wait_with_output().await?;
        Ok(Output {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}
