//! Mount command executor (spec §4.5): wraps `mergerfs`/`fusermount` with deterministic
//! timeouts, mountpoint-directory bootstrapping, and a one-retry on "bad mount point".

use ssm_contracts::{FileSystem, ProcessOutcome, ProcessRunner, ProcessSpec};
use ssm_model::{ActionOutcome, MountAction, MountActionKind};
use std::sync::Arc;
use std::time::Duration;

const BAD_MOUNT_POINT_MARKER: &str = "bad mount point";

pub struct MountExecutorConfig {
    pub mergerfs_bin: String,
    pub fusermount_bin: String,
    pub action_timeout: Duration,
    pub base_options: String,
}

impl Default for MountExecutorConfig {
    fn default() -> Self {
        Self {
            mergerfs_bin: "mergerfs".to_string(),
            fusermount_bin: "fusermount3".to_string(),
            action_timeout: Duration::from_secs(30),
            base_options: String::new(),
        }
    }
}

pub struct MountExecutor {
    runner: Arc<dyn ProcessRunner>,
    config: MountExecutorConfig,
}

impl MountExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: MountExecutorConfig) -> Self {
        Self { runner, config }
    }

    pub fn apply_action(&self, fs: &dyn FileSystem, action: &MountAction) -> ActionOutcome {
        match action.kind {
            MountActionKind::Mount => self.mount(fs, action),
            MountActionKind::Remount => {
                let unmount_outcome = self.unmount(action);
                if unmount_outcome != ActionOutcome::Success {
                    return unmount_outcome;
                }
                self.mount(fs, action)
            }
            MountActionKind::Unmount => self.unmount(action),
        }
    }

    fn mount(&self, fs: &dyn FileSystem, action: &MountAction) -> ActionOutcome {
        let Some(identity) = &action.desired_identity else {
            return ActionOutcome::Failure;
        };
        let Some(branch_spec) = &action.branch_specification else {
            return ActionOutcome::Failure;
        };

        if !fs.exists(&action.mount_point) {
            if let Err(e) = fs.create_dir_all(&action.mount_point) {
                tracing::warn!(event = "merge.mount.mkdir_failed", mount_point = %action.mount_point.display(), error = %e);
                return ActionOutcome::Failure;
            }
        }

        let options = compose_options(&self.config.base_options, identity);
        let outcome = self.invoke_mergerfs(branch_spec, &action.mount_point.to_string_lossy(), &options);

        match outcome {
            ProcessOutcome::Exited { code: 0, .. } => ActionOutcome::Success,
            ProcessOutcome::Exited { stderr, .. } if stderr.to_lowercase().contains(BAD_MOUNT_POINT_MARKER) => {
                if fs.create_dir_all(&action.mount_point).is_err() {
                    return ActionOutcome::Failure;
                }
                match self.invoke_mergerfs(branch_spec, &action.mount_point.to_string_lossy(), &options) {
                    ProcessOutcome::Exited { code: 0, .. } => ActionOutcome::Success,
                    ProcessOutcome::Exited { stderr, .. } => {
                        tracing::warn!(event = "merge.mount.failed", mount_point = %action.mount_point.display(), stderr = %stderr);
                        ActionOutcome::Failure
                    }
                    _ => ActionOutcome::Failure,
                }
            }
            ProcessOutcome::Exited { stderr, .. } => {
                tracing::warn!(event = "merge.mount.failed", mount_point = %action.mount_point.display(), stderr = %stderr);
                ActionOutcome::Failure
            }
            ProcessOutcome::TimedOut | ProcessOutcome::ToolNotFound => ActionOutcome::Failure,
        }
    }

    fn invoke_mergerfs(&self, branch_spec: &str, mount_point: &str, options: &str) -> ProcessOutcome {
        let spec = ProcessSpec::new(
            self.config.mergerfs_bin.clone(),
            vec!["-o".to_string(), options.to_string(), branch_spec.to_string(), mount_point.to_string()],
            self.config.action_timeout,
        );
        self.runner.run(&spec)
    }

    fn unmount(&self, action: &MountAction) -> ActionOutcome {
        let spec = ProcessSpec::new(
            self.config.fusermount_bin.clone(),
            vec!["-u".to_string(), action.mount_point.to_string_lossy().into_owned()],
            self.config.action_timeout,
        );
        match self.runner.run(&spec) {
            ProcessOutcome::Exited { code: 0, .. } => ActionOutcome::Success,
            ProcessOutcome::Exited { stderr, .. } => {
                tracing::warn!(event = "merge.unmount.failed", mount_point = %action.mount_point.display(), stderr = %stderr);
                self.run_low_priority_cleanup(action)
            }
            ProcessOutcome::TimedOut | ProcessOutcome::ToolNotFound => ActionOutcome::Failure,
        }
    }

    /// Best-effort cleanup invocation with low-priority scheduling, so a stuck unmount retry
    /// does not contend for I/O with the worker thread's other duties.
    fn run_low_priority_cleanup(&self, action: &MountAction) -> ActionOutcome {
        let spec = ProcessSpec::new(
            "ionice".to_string(),
            vec![
                "-c3".to_string(),
                self.config.fusermount_bin.clone(),
                "-uz".to_string(),
                action.mount_point.to_string_lossy().into_owned(),
            ],
            self.config.action_timeout,
        );
        match self.runner.run(&spec) {
            ProcessOutcome::Exited { code: 0, .. } => ActionOutcome::Success,
            _ => ActionOutcome::Failure,
        }
    }
}

/// Normalizes the base options string (trim, strip trailing comma), ensures a `threads=` token is
/// present, then appends `fsname=<desiredIdentity>`. The composed string always contains exactly
/// one `threads=` token and exactly one `fsname=` token.
fn compose_options(base_options: &str, desired_identity: &str) -> String {
    let trimmed = base_options.trim().trim_end_matches(',');
    let mut tokens: Vec<String> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split(',').map(|t| t.to_string()).collect()
    };

    if !tokens.iter().any(|t| t.starts_with("threads=")) {
        tokens.push("threads=1".to_string());
    }
    tokens.retain(|t| !t.starts_with("fsname="));
    tokens.push(format!("fsname={desired_identity}"));
    tokens.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_options_adds_missing_threads_and_fsname() {
        let composed = compose_options("cache.files=partial", "abc123");
        assert_eq!(composed, "cache.files=partial,threads=1,fsname=abc123");
        assert_eq!(composed.matches("threads=").count(), 1);
        assert_eq!(composed.matches("fsname=").count(), 1);
    }

    #[test]
    fn compose_options_preserves_existing_threads() {
        let composed = compose_options("threads=4,", "xyz");
        assert_eq!(composed, "threads=4,fsname=xyz");
    }

    #[test]
    fn compose_options_replaces_stale_fsname() {
        let composed = compose_options("threads=2,fsname=stale", "fresh");
        assert_eq!(composed, "threads=2,fsname=fresh");
    }
}
