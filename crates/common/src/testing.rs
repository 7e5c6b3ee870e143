//! In-memory [`ProcessRunner`] for tests.
//!
//! Records every `run`/`spawn`, answers `run` from scripted rules and hands
//! out children whose terminate/kill/wait calls can be inspected afterwards.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{ReelError, ReelResult};
use crate::process::{ChildHandle, CommandOutput, CommandSpec, ProcessRunner};

type Matcher = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;
type Responder = Box<dyn Fn(&CommandSpec) -> ReelResult<CommandOutput> + Send + Sync>;

struct Rule {
    matcher: Matcher,
    responder: Responder,
}

#[derive(Default)]
struct State {
    runs: Vec<CommandSpec>,
    spawns: Vec<CommandSpec>,
    children: Vec<MockChildProbe>,
}

/// Scriptable process runner.
#[derive(Default)]
pub struct MockRunner {
    rules: Mutex<Vec<Rule>>,
    state: Mutex<State>,
    ignore_terminate: bool,
    fail_spawn: Option<String>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Children ignore `terminate` and only exit on `kill`.
    pub fn ignore_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }

    /// Spawning `program` fails as if the binary were missing.
    pub fn fail_spawn_of(mut self, program: impl Into<String>) -> Self {
        self.fail_spawn = Some(program.into());
        self
    }

    /// Answer `run` calls matching `matcher`. First registered rule wins;
    /// unmatched commands succeed with empty output.
    pub fn on_run<M, R>(self, matcher: M, responder: R) -> Self
    where
        M: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
        R: Fn(&CommandSpec) -> ReelResult<CommandOutput> + Send + Sync + 'static,
    {
        self.rules
            .lock()
            .expect("rules lock poisoned")
            .push(Rule {
                matcher: Box::new(matcher),
                responder: Box::new(responder),
            });
        self
    }

    pub fn runs(&self) -> Vec<CommandSpec> {
        self.state.lock().expect("state lock poisoned").runs.clone()
    }

    pub fn spawns(&self) -> Vec<CommandSpec> {
        self.state.lock().expect("state lock poisoned").spawns.clone()
    }

    pub fn children(&self) -> Vec<MockChildProbe> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .children
            .clone()
    }

    /// Total processes started through this runner.
    pub fn invocations(&self) -> usize {
        let state = self.state.lock().expect("state lock poisoned");
        state.runs.len() + state.spawns.len()
    }

    pub fn runs_of(&self, program: &str) -> Vec<CommandSpec> {
        self.runs()
            .into_iter()
            .filter(|spec| spec.program == program)
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> ReelResult<CommandOutput> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .runs
            .push(spec.clone());

        let rules = self.rules.lock().expect("rules lock poisoned");
        match rules.iter().find(|rule| (rule.matcher)(spec)) {
            Some(rule) => (rule.responder)(spec),
            None => Ok(ok_output()),
        }
    }

    async fn spawn(&self, spec: &CommandSpec) -> ReelResult<Box<dyn ChildHandle>> {
        if self.fail_spawn.as_deref() == Some(spec.program.as_str()) {
            return Err(ReelError::process(format!(
                "Failed to start {}: not found",
                spec.program
            )));
        }

        let probe = MockChildProbe::default();
        let mut state = self.state.lock().expect("state lock poisoned");
        state.spawns.push(spec.clone());
        state.children.push(probe.clone());
        let pid = 1000 + state.children.len() as u32;
        Ok(Box::new(MockChild {
            pid,
            probe,
            ignore_terminate: self.ignore_terminate,
        }))
    }
}

/// Shared view of a mock child's lifecycle.
#[derive(Clone, Default)]
pub struct MockChildProbe {
    terminated: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    reaped: Arc<AtomicBool>,
    exited: Arc<Notify>,
}

impl MockChildProbe {
    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn reaped(&self) -> bool {
        self.reaped.load(Ordering::SeqCst)
    }

    /// Still running: neither stopped nor reaped.
    pub fn is_alive(&self) -> bool {
        !self.reaped() && !self.killed()
    }
}

struct MockChild {
    pid: u32,
    probe: MockChildProbe,
    ignore_terminate: bool,
}

impl MockChild {
    fn has_exited(&self) -> bool {
        self.probe.killed() || (self.probe.terminated() && !self.ignore_terminate)
    }
}

#[async_trait]
impl ChildHandle for MockChild {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn terminate(&mut self) -> ReelResult<()> {
        self.probe.terminated.store(true, Ordering::SeqCst);
        if !self.ignore_terminate {
            self.probe.exited.notify_waiters();
        }
        Ok(())
    }

    fn kill(&mut self) -> ReelResult<()> {
        self.probe.killed.store(true, Ordering::SeqCst);
        self.probe.exited.notify_waiters();
        Ok(())
    }

    async fn wait(&mut self) -> ReelResult<Option<i32>> {
        loop {
            let notified = self.probe.exited.notified();
            if self.has_exited() {
                break;
            }
            notified.await;
        }
        self.probe.reaped.store(true, Ordering::SeqCst);
        Ok(if self.probe.killed() { None } else { Some(255) })
    }
}

/// A successful, silent command result.
pub fn ok_output() -> CommandOutput {
    CommandOutput {
        code: Some(0),
        ..Default::default()
    }
}

/// A successful result with the given stdout.
pub fn stdout_output(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

/// A failed result with the given exit code and stderr.
pub fn failed_output(code: i32, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

/// Responder side effect: create an empty file at the command's last
/// argument, the way ffmpeg creates its output.
pub fn touch_last_arg(spec: &CommandSpec) -> ReelResult<CommandOutput> {
    if let Some(path) = spec.last_arg() {
        let path = match &spec.cwd {
            Some(dir) => dir.join(path),
            None => Path::new(path).to_path_buf(),
        };
        std::fs::write(path, b"")?;
    }
    Ok(ok_output())
}

/// Matcher for commands by program name.
pub fn program_is(program: &'static str) -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    move |spec| spec.program == program
}
