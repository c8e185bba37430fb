//! Daemon worker (spec §4.16): drives the trigger pipeline in a tight cooperative loop until
//! cancelled, with start/stop lifecycle hooks around it.

use crate::error::{CancellationToken, CoreError, ErrorKind, Result};
use crate::trigger::TriggerPipeline;
use chrono::{DateTime, Utc};
use ssm_model::MergePassOutcome;

/// Hooks invoked once at the edges of the worker's run loop. Startup failure aborts the run
/// before the loop starts; stop-hook failure is classified rather than always propagated.
pub trait DaemonLifecycleHooks: Send + Sync {
    fn on_start(&self) -> Result<()>;
    fn on_stop(&self, shutdown_token: &CancellationToken) -> Result<()>;
}

pub struct DaemonWorker {
    pipeline: TriggerPipeline,
    hooks: Box<dyn DaemonLifecycleHooks>,
}

impl DaemonWorker {
    pub fn new(pipeline: TriggerPipeline, hooks: Box<dyn DaemonLifecycleHooks>) -> Self {
        Self { pipeline, hooks }
    }

    /// Runs until `cancel` trips. `now` is re-sampled before every tick. `dispatch` performs one
    /// merge pass for the reason/force pair the coalescer hands back; it is threaded straight
    /// through to `TriggerPipeline::tick`.
    pub fn run<N, F>(&self, cancel: &CancellationToken, shutdown_token: Option<&CancellationToken>, mut now_fn: N, dispatch: F) -> Result<()>
    where
        N: FnMut() -> DateTime<Utc>,
        F: Fn(&str, bool) -> MergePassOutcome,
    {
        self.hooks.on_start()?;

        while !cancel.is_cancelled() {
            let now = now_fn();
            self.pipeline.tick(now, cancel, |reason, force| dispatch(reason, force));
        }

        let effective_shutdown = shutdown_token.unwrap_or(cancel);
        match self.hooks.on_stop(effective_shutdown) {
            Ok(()) => Ok(()),
            Err(e) if e.kind == ErrorKind::Fatal => Err(e),
            Err(e) if e.kind == ErrorKind::Cancellation && effective_shutdown.is_cancelled() => {
                tracing::debug!(event = "daemon.stop_hook.cancelled", message = %e.message);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(event = "daemon.stop_hook.failed", kind = %e.kind, message = %e.message);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{FilesystemMonitor, StartupMode};
    use crate::trigger::{PathClass, TriggerHooks, TriggerPipelineConfig};
    use ssm_contracts::{ProcessOutcome, ProcessRunner, ProcessSpec, ScopedProcess};
    use ssm_model::ChapterRenameQueueEntry;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct NoopRunner;
    impl ProcessRunner for NoopRunner {
        fn run(&self, _spec: &ProcessSpec) -> ProcessOutcome {
            ProcessOutcome::Exited { code: 0, stdout: String::new(), stderr: String::new() }
        }
        fn spawn_long_running(&self, _program: &str, _args: &[String]) -> Result<Box<dyn ScopedProcess>, ProcessOutcome> {
            Err(ProcessOutcome::ToolNotFound)
        }
    }

    struct NoopHooks;
    impl TriggerHooks for NoopHooks {
        fn classify_path(&self, _path: &Path) -> PathClass {
            PathClass::Irrelevant
        }
        fn enumerate_candidates(&self, _path: &Path) -> Vec<PathBuf> {
            Vec::new()
        }
        fn process_rename(&self, _entry: &ChapterRenameQueueEntry) {}
        fn rescan_and_enqueue(&self) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    fn make_pipeline() -> TriggerPipeline {
        TriggerPipeline::new(
            FilesystemMonitor::new(Arc::new(NoopRunner), StartupMode::Full),
            Box::new(NoopHooks),
            TriggerPipelineConfig {
                watch_roots: Vec::new(),
                poll_timeout: Duration::from_millis(1),
                rescan_interval: chrono::Duration::hours(1),
                merge_interval: chrono::Duration::hours(1),
                min_scan_spacing: chrono::Duration::zero(),
                lock_retry_interval: chrono::Duration::seconds(1),
                enqueue_startup_scan: false,
            },
        )
    }

    struct CountingHooks {
        started: AtomicUsize,
        stopped: AtomicUsize,
    }
    impl DaemonLifecycleHooks for CountingHooks {
        fn on_start(&self) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn on_stop(&self, _shutdown_token: &CancellationToken) -> Result<()> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn run_invokes_start_then_loop_then_stop_and_trips_on_precancelled_token() {
        let hooks = CountingHooks { started: AtomicUsize::new(0), stopped: AtomicUsize::new(0) };
        let worker = DaemonWorker::new(make_pipeline(), Box::new(hooks));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let ticks = Mutex::new(0u32);
        let result = worker.run(&cancel, None, || chrono::Utc::now(), |_reason, _force| {
            *ticks.lock().unwrap() += 1;
            MergePassOutcome::Success
        });

        assert!(result.is_ok());
        assert_eq!(*ticks.lock().unwrap(), 0);
    }

    struct FailingStartHooks;
    impl DaemonLifecycleHooks for FailingStartHooks {
        fn on_start(&self) -> Result<()> {
            Err(CoreError::new(ErrorKind::Configuration, "bad config"))
        }
        fn on_stop(&self, _shutdown_token: &CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn start_failure_propagates_before_any_tick() {
        let worker = DaemonWorker::new(make_pipeline(), Box::new(FailingStartHooks));
        let cancel = CancellationToken::new();
        let result = worker.run(&cancel, None, || chrono::Utc::now(), |_reason, _force| MergePassOutcome::Success);
        assert!(result.is_err());
    }

    struct FatalStopHooks;
    impl DaemonLifecycleHooks for FatalStopHooks {
        fn on_start(&self) -> Result<()> {
            Ok(())
        }
        fn on_stop(&self, _shutdown_token: &CancellationToken) -> Result<()> {
            Err(CoreError::new(ErrorKind::Fatal, "unrecoverable"))
        }
    }

    #[test]
    fn fatal_stop_hook_error_is_rethrown() {
        let worker = DaemonWorker::new(make_pipeline(), Box::new(FatalStopHooks));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = worker.run(&cancel, None, || chrono::Utc::now(), |_reason, _force| MergePassOutcome::Success);
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::Fatal));
    }
}
