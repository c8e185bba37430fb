//! Real `ProcessRunner` implementation: one-shot invocations with a watchdog-thread timeout, and
//! long-running sessions (`inotifywait -m`) with a background stdout/stderr reader and
//! kill-on-drop semantics.
//!
//! `std::process::Child` has no timeout primitive (unlike `tokio::process::Command`'s
//! `kill_on_drop`); the watchdog thread below is the standard idiom for recovering that behavior
//! without an async runtime, matching the bound the daemon's synchronous worker loop requires.

use ssm_contracts::{ProcessOutcome, ProcessRunner, ProcessSpec, ScopedProcess};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const STDERR_SNIPPET_LIMIT: usize = 4096;

#[derive(Debug, Default, Clone, Copy)]
pub struct RealProcessRunner;

impl RealProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for RealProcessRunner {
    fn run(&self, spec: &ProcessSpec) -> ProcessOutcome {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ProcessOutcome::ToolNotFound
            }
            Err(_) => return ProcessOutcome::ToolNotFound,
        };

        match wait_with_timeout(&mut child, spec.timeout) {
            Some(status) => {
                let stdout = read_to_string_best_effort(child.stdout.take());
                let stderr = read_to_string_best_effort(child.stderr.take());
                ProcessOutcome::Exited {
                    code: status.code().unwrap_or(-1),
                    stdout,
                    stderr: truncate(&stderr, STDERR_SNIPPET_LIMIT),
                }
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                ProcessOutcome::TimedOut
            }
        }
    }

    fn spawn_long_running(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<Box<dyn ScopedProcess>, ProcessOutcome> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProcessOutcome::ToolNotFound)
            }
            Err(_) => return Err(ProcessOutcome::ToolNotFound),
        };

        let lines = Arc::new(Mutex::new(VecDeque::new()));
        let warnings = Arc::new(Mutex::new(VecDeque::new()));
        let alive = Arc::new(AtomicBool::new(true));

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, Arc::clone(&lines));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, Arc::clone(&warnings));
        }

        Ok(Box::new(RealScopedProcess {
            child,
            lines,
            warnings,
            alive,
        }))
    }
}

fn spawn_reader<R: std::io::Read + Send + 'static>(
    reader: R,
    sink: Arc<Mutex<VecDeque<String>>>,
) {
    std::thread::spawn(move || {
        let buffered = BufReader::new(reader);
        for line in buffered.lines().map_while(Result::ok) {
            sink.lock().unwrap().push_back(line);
        }
    });
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    return None;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(_) => return None,
        }
    }
}

fn read_to_string_best_effort<R: std::io::Read>(reader: Option<R>) -> String {
    use std::io::Read;
    let mut out = String::new();
    if let Some(mut r) = reader {
        let _ = r.read_to_string(&mut out);
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}… (truncated)", &s[..end])
    }
}

/// `inotifywait -m` session handle. Killing the whole tree matters because `inotifywait` may
/// fork helper processes under some distros' wrapper scripts; `Drop` kills the direct child,
/// which is sufficient for the plain binary invocation this daemon uses.
struct RealScopedProcess {
    child: Child,
    lines: Arc<Mutex<VecDeque<String>>>,
    warnings: Arc<Mutex<VecDeque<String>>>,
    alive: Arc<AtomicBool>,
}

impl ScopedProcess for RealScopedProcess {
    fn try_recv_line(&mut self) -> Option<String> {
        self.lines.lock().unwrap().pop_front()
    }

    fn try_recv_warning(&mut self) -> Option<String> {
        self.warnings.lock().unwrap().pop_front()
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            _ => {
                self.alive.store(false, Ordering::SeqCst);
                false
            }
        }
    }
}

impl Drop for RealScopedProcess {
    fn drop(&mut self) {
        if self.alive.load(Ordering::SeqCst) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
