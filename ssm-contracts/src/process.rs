use std::time::Duration;

/// One external command invocation request.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

/// Result of a bounded, one-shot external command invocation (mergerfs, fusermount, findmnt).
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Exited before the timeout, with the given exit code and captured stderr (truncated).
    Exited {
        code: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut,
    ToolNotFound,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ProcessOutcome::Exited { code: 0, .. })
    }
}

/// A long-running child process (e.g. `inotifywait -m`) whose stdout is drained line-by-line by a
/// background reader owned by the implementation. Implementations must guarantee the child is
/// killed, including any descendants, when the handle is dropped — see SPEC_FULL.md §5.1's
/// `ScopedProcess` note.
pub trait ScopedProcess: Send {
    /// Pops one buffered stdout line, if any is ready. Never blocks.
    fn try_recv_line(&mut self) -> Option<String>;
    /// Pops one buffered stderr-derived warning line, if any is ready. Never blocks.
    fn try_recv_warning(&mut self) -> Option<String>;
    fn is_alive(&mut self) -> bool;
}

/// Spawns external processes. One-shot invocations use `run`; long-running monitor sessions use
/// `spawn_long_running`.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, spec: &ProcessSpec) -> ProcessOutcome;

    fn spawn_long_running(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<Box<dyn ScopedProcess>, ProcessOutcome>;
}
