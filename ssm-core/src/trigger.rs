//! Filesystem-event trigger pipeline (spec §4.3): one cooperative `tick` that drains the
//! monitor, enqueues rename candidates, requests merges, and dispatches the coalesced request.

use crate::coalescer::ScanCoalescer;
use crate::error::CancellationToken;
use crate::monitor::FilesystemMonitor;
use chrono::{DateTime, Utc};
use ssm_model::{ChapterRenameQueueEntry, DispatchOutcome, MergePassOutcome};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// What a monitored event path resolves to, from the trigger pipeline's point of view. The
/// concrete directory-depth rules (sources root → volume → source → title → chapter) live with
/// the caller supplying this classification, since that layout is config-owned, not core logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    ChapterDirectory,
    RootAncestor,
    Irrelevant,
}

/// Injected directory-structure and side-effect hooks the pipeline needs but does not itself
/// define: path classification, bounded descendant enumeration, rename processing, and the
/// periodic full rescan.
pub trait TriggerHooks: Send + Sync {
    fn classify_path(&self, path: &Path) -> PathClass;
    /// Bounded enumeration of rename-queue candidates under a root/manga-root ancestor event.
    fn enumerate_candidates(&self, path: &Path) -> Vec<PathBuf>;
    fn process_rename(&self, entry: &ChapterRenameQueueEntry);
    /// Full rescan pass; returns newly discovered chapter-directory candidates to enqueue.
    fn rescan_and_enqueue(&self) -> Vec<PathBuf>;
}

pub struct TriggerPipelineConfig {
    pub watch_roots: Vec<PathBuf>,
    pub poll_timeout: Duration,
    pub rescan_interval: chrono::Duration,
    pub merge_interval: chrono::Duration,
    pub min_scan_spacing: chrono::Duration,
    pub lock_retry_interval: chrono::Duration,
    pub enqueue_startup_scan: bool,
}

#[derive(Default)]
struct TriggerState {
    last_rescan_at: Option<DateTime<Utc>>,
    last_merge_request_at: Option<DateTime<Utc>>,
    last_dispatch_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    is_first_tick: bool,
    material_event_since_dispatch: bool,
}

pub struct TriggerPipeline {
    monitor: FilesystemMonitor,
    coalescer: ScanCoalescer,
    hooks: Box<dyn TriggerHooks>,
    config: TriggerPipelineConfig,
    rename_queue: Mutex<VecDeque<ChapterRenameQueueEntry>>,
    state: Mutex<TriggerState>,
}

impl TriggerPipeline {
    pub fn new(monitor: FilesystemMonitor, hooks: Box<dyn TriggerHooks>, config: TriggerPipelineConfig) -> Self {
        Self {
            monitor,
            coalescer: ScanCoalescer::new(),
            hooks,
            config,
            rename_queue: Mutex::new(VecDeque::new()),
            state: Mutex::new(TriggerState { is_first_tick: true, ..Default::default() }),
        }
    }

    pub fn request_scan(&self, reason: impl Into<String>, force: bool) {
        self.coalescer.request_scan(reason, force);
    }

    /// One cooperative tick. `dispatch` is invoked at most once, only when a request is pending
    /// and spacing/lock-retry gates allow it; its result becomes this tick's `DispatchOutcome`.
    pub fn tick<F>(&self, now: DateTime<Utc>, cancel: &CancellationToken, dispatch: F) -> DispatchOutcome
    where
        F: FnOnce(&str, bool) -> MergePassOutcome,
    {
        let poll = self.monitor.poll(&self.config.watch_roots, self.config.poll_timeout, cancel);

        let mut newly_enqueued = Vec::new();
        for event in &poll.events {
            match self.hooks.classify_path(&event.path) {
                PathClass::ChapterDirectory => newly_enqueued.push(event.path.clone()),
                PathClass::RootAncestor => {
                    newly_enqueued.extend(self.hooks.enumerate_candidates(&event.path));
                }
                PathClass::Irrelevant => {}
            }
        }
        let had_material_event = !newly_enqueued.is_empty();
        self.enqueue_renames(newly_enqueued, now);

        self.run_one_rename_pass();

        {
            let mut state = self.state.lock().unwrap();
            let due = state
                .last_rescan_at
                .map(|last| now - last >= self.config.rescan_interval)
                .unwrap_or(true);
            if due {
                state.last_rescan_at = Some(now);
                drop(state);
                let rescanned = self.hooks.rescan_and_enqueue();
                self.enqueue_renames(rescanned, now);
            }
        }

        let mut state = self.state.lock().unwrap();
        if had_material_event {
            state.material_event_since_dispatch = true;
        }

        let merge_due = state
            .last_merge_request_at
            .map(|last| now - last >= self.config.merge_interval)
            .unwrap_or(true);

        if state.material_event_since_dispatch {
            drop(state);
            self.coalescer.request_scan("inotify-event", false);
            state = self.state.lock().unwrap();
        } else if merge_due {
            state.last_merge_request_at = Some(now);
            drop(state);
            self.coalescer.request_scan("timer", false);
            state = self.state.lock().unwrap();
        } else if state.is_first_tick && self.config.enqueue_startup_scan {
            drop(state);
            self.coalescer.request_scan("startup", false);
            state = self.state.lock().unwrap();
        }
        state.is_first_tick = false;

        let spacing_ok = state
            .last_dispatch_at
            .map(|last| now - last >= self.config.min_scan_spacing)
            .unwrap_or(true);
        let retry_ok = state.next_retry_at.map(|retry_at| now >= retry_at).unwrap_or(true);

        if !spacing_ok || !retry_ok {
            return DispatchOutcome::NoPendingRequest;
        }
        drop(state);

        let outcome = self.coalescer.dispatch_pending(|reason, force| dispatch(reason, force).into());

        let mut state = self.state.lock().unwrap();
        match outcome {
            DispatchOutcome::Busy => {
                state.next_retry_at = Some(now + self.config.lock_retry_interval);
            }
            DispatchOutcome::NoPendingRequest => {}
            _ => {
                state.last_dispatch_at = Some(now);
                state.material_event_since_dispatch = false;
                state.next_retry_at = None;
            }
        }
        outcome
    }

    fn enqueue_renames(&self, paths: Vec<PathBuf>, now: DateTime<Utc>) {
        if paths.is_empty() {
            return;
        }
        let mut queue = self.rename_queue.lock().unwrap();
        for path in paths {
            if !queue.iter().any(|entry| entry.path == path) {
                queue.push_back(ChapterRenameQueueEntry::new(path, now));
            }
        }
    }

    fn run_one_rename_pass(&self) {
        let drained: Vec<ChapterRenameQueueEntry> = {
            let mut queue = self.rename_queue.lock().unwrap();
            queue.drain(..).collect()
        };
        for entry in drained {
            self.hooks.process_rename(&entry);
        }
    }
}
