//! Supervised external processes.
//!
//! Every external tool the pipeline touches (ffmpeg, ffprobe, xdotool,
//! chromedriver) goes through a [`ProcessRunner`]. One-shot tools use
//! [`ProcessRunner::run`]; long-lived ones (screen capture, WebDriver
//! server) are started with [`SupervisedProcess::start`], which guarantees
//! the child is terminated and reaped on every exit path.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{ReelError, ReelResult};

/// Grace period between a polite terminate and a hard kill.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                parts.push(format!("'{arg}'"));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }

    /// The last argument; for ffmpeg this is the output file.
    pub fn last_arg(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

/// Captured result of a one-shot command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawns external processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion and capture stdout/stderr.
    async fn run(&self, spec: &CommandSpec) -> ReelResult<CommandOutput>;

    /// Start a long-lived child.
    async fn spawn(&self, spec: &CommandSpec) -> ReelResult<Box<dyn ChildHandle>>;
}

/// Handle to a running child process.
#[async_trait]
pub trait ChildHandle: Send {
    fn id(&self) -> Option<u32>;

    /// Ask the process to exit (SIGTERM on Unix).
    fn terminate(&mut self) -> ReelResult<()>;

    /// Force the process to exit.
    fn kill(&mut self) -> ReelResult<()>;

    /// Wait for exit and return the exit code.
    async fn wait(&mut self) -> ReelResult<Option<i32>>;
}

/// Scoped ownership of a child process.
///
/// `shutdown` terminates, waits (bounded by the grace period) and falls
/// back to a kill. Dropping a supervisor that was never shut down kills the
/// child so no process outlives its owner.
pub struct SupervisedProcess {
    name: String,
    child: Option<Box<dyn ChildHandle>>,
    grace: Duration,
}

impl SupervisedProcess {
    /// Spawn `spec` through `runner` under supervision.
    pub async fn start(
        runner: &dyn ProcessRunner,
        name: impl Into<String>,
        spec: &CommandSpec,
    ) -> ReelResult<Self> {
        let name = name.into();
        tracing::debug!(process = %name, command = %spec.display(), "Spawning supervised process");
        let child = runner.spawn(spec).await?;
        tracing::info!(process = %name, pid = ?child.id(), "Supervised process started");
        Ok(Self {
            name,
            child: Some(child),
            grace: DEFAULT_TERMINATE_GRACE,
        })
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Whether the child is still owned (not yet reaped).
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Wait for the child to exit on its own.
    pub async fn wait(&mut self) -> ReelResult<Option<i32>> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };
        let code = child.wait().await?;
        tracing::debug!(process = %self.name, ?code, "Supervised process exited");
        Ok(code)
    }

    /// Terminate and reap the child. Idempotent.
    pub async fn shutdown(&mut self) -> ReelResult<Option<i32>> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };

        if let Err(e) = child.terminate() {
            tracing::warn!(process = %self.name, error = %e, "Terminate failed; killing");
            child.kill()?;
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(result) => {
                let code = result?;
                tracing::debug!(process = %self.name, ?code, "Supervised process stopped");
                Ok(code)
            }
            Err(_) => {
                tracing::warn!(
                    process = %self.name,
                    grace_secs = self.grace.as_secs_f64(),
                    "Process ignored terminate; killing"
                );
                child.kill()?;
                child.wait().await
            }
        }
    }
}

impl Drop for SupervisedProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            tracing::warn!(process = %self.name, "Supervised process dropped while running; killing");
            let _ = child.kill();
        }
    }
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &CommandSpec) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> ReelResult<CommandOutput> {
        tracing::debug!(command = %spec.display(), "Running command");
        let output = Self::command(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ReelError::process(format!("Failed to start {}: {e}", spec.program)))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn(&self, spec: &CommandSpec) -> ReelResult<Box<dyn ChildHandle>> {
        let mut child = Self::command(spec)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ReelError::process(format!("Failed to start {}: {e}", spec.program)))?;

        // Drain stderr concurrently so a chatty child never blocks on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            let program = spec.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!(process = %program, "{line}");
                }
            });
        }

        Ok(Box::new(TokioChild { child }))
    }
}

struct TokioChild {
    child: tokio::process::Child,
}

#[async_trait]
impl ChildHandle for TokioChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> ReelResult<()> {
        let Some(pid) = self.child.id() else {
            // Already reaped.
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| ReelError::process(format!("pid {pid} out of range")))?;
        // SAFETY: kill(2) has no memory-safety preconditions; `pid` is our own child.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> ReelResult<()> {
        self.kill()
    }

    fn kill(&mut self) -> ReelResult<()> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait(&mut self) -> ReelResult<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
