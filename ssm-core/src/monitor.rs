//! Filesystem-event monitor (spec §4.1): long-running `inotifywait -m` sessions per watched
//! root, with progressive deep-watch discovery and a bounded `poll`.
//!
//! Each session owns a background OS-thread reader (inside `ScopedProcess`, not a tokio task —
//! the daemon's worker loop is single-threaded cooperative per SPEC_FULL.md §7) that pushes
//! lines into the session's lock-protected queues; `poll` only ever drains them.

use ssm_contracts::{ProcessRunner, ScopedProcess};
use ssm_model::PollOutcome;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::CancellationToken;

const FAILED_START_COOLDOWN: Duration = Duration::from_secs(5);
const MAX_DEEP_SESSIONS_PER_POLL: usize = 3;
const WATCH_EVENTS: &str = "create,moved_to,close_write,attrib,delete,moved_from";
const POLL_SPIN_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    Full,
    Progressive,
}

#[derive(Debug, Clone)]
pub struct FsEvent {
    pub path: PathBuf,
    pub mask: String,
}

#[derive(Debug, Clone, Default)]
pub struct PollResult {
    pub outcome: Option<PollOutcome>,
    pub events: Vec<FsEvent>,
    pub warnings: Vec<String>,
}

enum StartFailure {
    ToolNotFound,
    CommandFailed,
}

struct Session {
    process: Box<dyn ScopedProcess>,
}

pub struct FilesystemMonitor {
    runner: std::sync::Arc<dyn ProcessRunner>,
    startup_mode: StartupMode,
    sessions: Mutex<HashMap<String, Session>>,
    cooldowns: Mutex<HashMap<String, Instant>>,
    pending_deep_roots: Mutex<VecDeque<PathBuf>>,
    started_shallow_roots: Mutex<Vec<PathBuf>>,
}

impl FilesystemMonitor {
    pub fn new(runner: std::sync::Arc<dyn ProcessRunner>, startup_mode: StartupMode) -> Self {
        Self {
            runner,
            startup_mode,
            sessions: Mutex::new(HashMap::new()),
            cooldowns: Mutex::new(HashMap::new()),
            pending_deep_roots: Mutex::new(VecDeque::new()),
            started_shallow_roots: Mutex::new(Vec::new()),
        }
    }

    pub fn poll(&self, watch_roots: &[PathBuf], timeout: Duration, cancel: &CancellationToken) -> PollResult {
        let mut start_failures: Vec<StartFailure> = Vec::new();

        match self.startup_mode {
            StartupMode::Full => {
                for root in watch_roots {
                    if let Err(failure) = self.ensure_session(root, true) {
                        start_failures.push(failure);
                    }
                }
            }
            StartupMode::Progressive => {
                for root in watch_roots {
                    if let Err(failure) = self.ensure_session(root, false) {
                        start_failures.push(failure);
                    }
                }
                self.start_pending_deep_sessions(&mut start_failures);
            }
        }

        let mut result = PollResult::default();
        let deadline = Instant::now() + timeout;

        loop {
            self.drain_ready(&mut result);

            if self.startup_mode == StartupMode::Progressive {
                for event in &result.events {
                    if let Some(parent) = event.path.parent() {
                        self.enqueue_deep_root_if_child(parent, watch_roots);
                    }
                }
            }

            if cancel.is_cancelled() || !result.events.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(POLL_SPIN_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }

        result.outcome = Some(classify_outcome(&start_failures, &result.events));
        result
    }

    fn drain_ready(&self, result: &mut PollResult) {
        let mut sessions = self.sessions.lock().unwrap();
        for session in sessions.values_mut() {
            while let Some(line) = session.process.try_recv_line() {
                if let Some(event) = parse_event_line(&line) {
                    result.events.push(event);
                }
            }
            while let Some(warning) = session.process.try_recv_warning() {
                result.warnings.push(warning);
            }
        }
    }

    fn ensure_session(&self, path: &Path, recursive: bool) -> Result<(), StartFailure> {
        let key = session_key(path, recursive);

        {
            let sessions = self.sessions.lock().unwrap();
            if sessions.contains_key(&key) {
                return Ok(());
            }
        }
        {
            let cooldowns = self.cooldowns.lock().unwrap();
            if let Some(until) = cooldowns.get(&key) {
                if Instant::now() < *until {
                    return Ok(());
                }
            }
        }

        let mut args = vec!["-m".to_string()];
        if recursive {
            args.push("-r".to_string());
        }
        args.push("--format".to_string());
        args.push("%w%f\t%e".to_string());
        args.push("-e".to_string());
        args.push(WATCH_EVENTS.to_string());
        args.push(path.to_string_lossy().into_owned());

        match self.runner.spawn_long_running("inotifywait", &args) {
            Ok(process) => {
                self.sessions.lock().unwrap().insert(key, Session { process });
                if !recursive {
                    self.started_shallow_roots.lock().unwrap().push(path.to_path_buf());
                }
                Ok(())
            }
            Err(outcome) => {
                self.cooldowns
                    .lock()
                    .unwrap()
                    .insert(key, Instant::now() + FAILED_START_COOLDOWN);
                match outcome {
                    ssm_contracts::ProcessOutcome::ToolNotFound => Err(StartFailure::ToolNotFound),
                    _ => Err(StartFailure::CommandFailed),
                }
            }
        }
    }

    fn enqueue_deep_root_if_child(&self, candidate: &Path, watch_roots: &[PathBuf]) {
        let is_direct_child_of_shallow_root = self
            .started_shallow_roots
            .lock()
            .unwrap()
            .iter()
            .any(|root| candidate.parent() == Some(root.as_path()))
            || watch_roots.iter().any(|root| candidate.parent() == Some(root.as_path()));

        if !is_direct_child_of_shallow_root {
            return;
        }

        let key = session_key(candidate, true);
        if self.sessions.lock().unwrap().contains_key(&key) {
            return;
        }
        let mut pending = self.pending_deep_roots.lock().unwrap();
        if !pending.iter().any(|p| p == candidate) {
            pending.push_back(candidate.to_path_buf());
        }
    }

    fn start_pending_deep_sessions(&self, start_failures: &mut Vec<StartFailure>) {
        let mut started = 0;
        while started < MAX_DEEP_SESSIONS_PER_POLL {
            let next = self.pending_deep_roots.lock().unwrap().pop_front();
            match next {
                Some(root) => {
                    if let Err(failure) = self.ensure_session(&root, true) {
                        start_failures.push(failure);
                    }
                    started += 1;
                }
                None => break,
            }
        }
    }
}

fn session_key(path: &Path, recursive: bool) -> String {
    let prefix = if recursive { "r:" } else { "s:" };
    format!("{prefix}{}", normalize_path(path))
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().trim_end_matches('/').to_string()
}

fn parse_event_line(line: &str) -> Option<FsEvent> {
    let (path, mask) = line.split_once('\t')?;
    if path.is_empty() {
        return None;
    }
    Some(FsEvent { path: PathBuf::from(path), mask: mask.to_string() })
}

fn classify_outcome(start_failures: &[StartFailure], events: &[FsEvent]) -> PollOutcome {
    if start_failures.iter().any(|f| matches!(f, StartFailure::ToolNotFound)) {
        PollOutcome::ToolNotFound
    } else if !start_failures.is_empty() {
        PollOutcome::CommandFailed
    } else if !events.is_empty() {
        PollOutcome::Success
    } else {
        PollOutcome::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_separated_event_line() {
        let event = parse_event_line("/sources/vol/One Piece/\tCREATE,ISDIR").unwrap();
        assert_eq!(event.path, PathBuf::from("/sources/vol/One Piece/"));
        assert_eq!(event.mask, "CREATE,ISDIR");
    }

    #[test]
    fn ignores_line_with_no_tab() {
        assert!(parse_event_line("garbage line").is_none());
    }

    #[test]
    fn classify_tool_not_found_takes_priority() {
        let failures = vec![StartFailure::CommandFailed, StartFailure::ToolNotFound];
        assert_eq!(classify_outcome(&failures, &[]), PollOutcome::ToolNotFound);
    }

    #[test]
    fn classify_success_when_events_present() {
        let events = vec![FsEvent { path: PathBuf::from("/x"), mask: "CREATE".into() }];
        assert_eq!(classify_outcome(&[], &events), PollOutcome::Success);
    }

    #[test]
    fn classify_timed_out_when_idle() {
        assert_eq!(classify_outcome(&[], &[]), PollOutcome::TimedOut);
    }
}
