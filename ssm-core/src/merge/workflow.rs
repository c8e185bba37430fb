//! Merge-mount workflow (spec §4.15): discovers volumes, builds title groups, plans and
//! coordinates metadata per group, reconciles the live mount snapshot against the desired set,
//! and quarantines leftover merged-root residue once nothing remains mounted.

use super::lock::MergeLock;
use crate::catalog::EquivalenceCatalog;
use crate::error::CancellationToken;
use crate::metadata::coordinator::{EnsureMetadataRequest, MetadataCoordinator};
use crate::mount::executor::MountExecutor;
use crate::mount::snapshot::parse_findmnt_line;
use crate::normalize::{escape_reserved_segment, normalize_title_key, strip_scene_tags, TagSet};
use crate::planner::{plan_branches, PlanInput, SourcePriority};
use crate::volume_discovery::discover_volumes;
use ssm_contracts::{Clock, FileSystem, HttpClient, ProcessOutcome, ProcessRunner, ProcessSpec};
use ssm_model::{
    ActionOutcome, BranchLinkKind, DesiredMountDefinition, MergePassOutcome, MountAction, MountActionKind, MountSnapshotEntry, SourceBranch,
    TitleGroup,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct MergeConfig {
    pub sources_root: PathBuf,
    pub override_root: PathBuf,
    pub merged_root: PathBuf,
    pub branch_links_root: PathBuf,
    pub cleanup_root: PathBuf,
    pub excluded_source_names: Vec<String>,
    pub cover_base_uri: String,
    pub preferred_language: Option<String>,
    pub findmnt_bin: String,
    pub findmnt_timeout: Duration,
}

pub struct MergePassRequest<'a> {
    pub reason: &'a str,
    pub force: bool,
}

enum ForceScope {
    None,
    Titled(PathBuf),
    All,
}

pub struct MergeWorkflow<'a> {
    config: &'a MergeConfig,
    lock: &'a MergeLock,
    catalog: &'a EquivalenceCatalog,
    source_priority: &'a dyn SourcePriority,
    tags: &'a dyn TagSet,
    coordinator: MetadataCoordinator<'a>,
    mount_executor: &'a MountExecutor,
    runner: Arc<dyn ProcessRunner>,
}

impl<'a> MergeWorkflow<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &'a MergeConfig,
        lock: &'a MergeLock,
        catalog: &'a EquivalenceCatalog,
        source_priority: &'a dyn SourcePriority,
        tags: &'a dyn TagSet,
        coordinator: MetadataCoordinator<'a>,
        mount_executor: &'a MountExecutor,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self { config, lock, catalog, source_priority, tags, coordinator, mount_executor, runner }
    }

    pub fn run_merge_pass(
        &self,
        fs: &dyn FileSystem,
        clock: &dyn Clock,
        http: &dyn HttpClient,
        cancel: &CancellationToken,
        request: &MergePassRequest<'_>,
    ) -> MergePassOutcome {
        let Some(_guard) = self.lock.try_acquire() else {
            return MergePassOutcome::Busy;
        };

        tracing::debug!(event = "merge.dispatch.started", reason = request.reason, force = request.force);

        let source_volumes = discover_volumes(fs, &self.config.sources_root);
        let override_volumes = discover_volumes(fs, &self.config.override_root);
        for warning in source_volumes.warnings.iter().chain(override_volumes.warnings.iter()) {
            tracing::warn!(event = "merge.discovery.warning", warning = warning.as_str());
        }
        let discovery_had_warnings = !source_volumes.warnings.is_empty() || !override_volumes.warnings.is_empty();

        let force_scope = self.compute_force_scope(request);
        let groups = self.build_title_groups(fs, &source_volumes.volumes, &override_volumes.volumes);

        let mut desired_mounts = Vec::new();
        for group in &groups {
            if cancel.is_cancelled() {
                tracing::debug!(event = "merge.cancelled", stage = "planning");
                break;
            }
            if let Some(plan) = self.plan_and_coordinate(fs, clock, http, cancel, group, &override_volumes.volumes) {
                desired_mounts.push(plan);
            }
        }

        let actions = self.compute_actions(fs, &desired_mounts, &force_scope);

        let mut action_outcomes = Vec::new();
        for action in &actions {
            if cancel.is_cancelled() {
                tracing::debug!(event = "merge.cancelled", stage = "apply");
                break;
            }
            action_outcomes.push(self.mount_executor.apply_action(fs, action));
        }

        self.residual_cleanup(fs, clock);

        self.aggregate_outcome(&action_outcomes, discovery_had_warnings)
    }

    fn compute_force_scope(&self, request: &MergePassRequest<'_>) -> ForceScope {
        if !request.force {
            return ForceScope::None;
        }
        match request.reason.strip_prefix("override-force:") {
            Some(title) if title.is_empty() => {
                tracing::warn!(event = "merge.force.empty_token", reason = request.reason);
                ForceScope::None
            }
            Some(title) => {
                let canonical = self.catalog.resolve_canonical_or_input(title);
                ForceScope::Titled(self.config.merged_root.join(escape_reserved_segment(&canonical)))
            }
            None => ForceScope::All,
        }
    }

    fn build_title_groups(&self, fs: &dyn FileSystem, source_volumes: &[PathBuf], override_volumes: &[PathBuf]) -> Vec<TitleGroup> {
        let mut groups: BTreeMap<String, (String, Vec<SourceBranch>)> = BTreeMap::new();

        for volume in source_volumes {
            let Ok(source_dirs) = fs.read_dir(volume) else { continue };
            for source_dir in source_dirs {
                if !fs.is_dir(&source_dir) {
                    continue;
                }
                let Some(source_name) = source_dir.file_name().and_then(|n| n.to_str()) else { continue };
                if self.config.excluded_source_names.iter().any(|excluded| excluded == source_name) {
                    continue;
                }
                let source_name = source_name.to_string();

                let Ok(title_dirs) = fs.read_dir(&source_dir) else { continue };
                for title_dir in title_dirs {
                    if !fs.is_dir(&title_dir) {
                        continue;
                    }
                    let Some(raw_title) = title_dir.file_name().and_then(|n| n.to_str()) else { continue };
                    let (stripped, _) = strip_scene_tags(raw_title, self.tags);
                    let canonical = self.catalog.resolve_canonical_or_input(&stripped);
                    let group_key = normalize_title_key(&canonical);

                    let entry = groups.entry(group_key).or_insert_with(|| (canonical.clone(), Vec::new()));
                    entry.1.push(SourceBranch::new(source_name.clone(), title_dir.clone()));
                }
            }
        }

        for volume in override_volumes {
            let Ok(title_dirs) = fs.read_dir(volume) else { continue };
            for title_dir in title_dirs {
                if !fs.is_dir(&title_dir) {
                    continue;
                }
                let Some(raw_title) = title_dir.file_name().and_then(|n| n.to_str()) else { continue };
                let (_, would_strip) = strip_scene_tags(raw_title, self.tags);
                if would_strip {
                    tracing::warn!(event = "merge.group.tagged_only_title", title = raw_title);
                }
                let canonical = self.catalog.resolve_canonical_or_input(raw_title);
                let group_key = normalize_title_key(&canonical);
                groups.entry(group_key).or_insert_with(|| (canonical, Vec::new()));
            }
        }

        let mut built = Vec::with_capacity(groups.len());
        for (group_key, (canonical, source_branches)) in groups {
            match TitleGroup::new(canonical, group_key, source_branches) {
                Ok(group) => built.push(group),
                Err(e) => tracing::warn!(event = "merge.group.invalid", error = %e),
            }
        }
        built.sort_by(|a, b| a.canonical_title.cmp(&b.canonical_title).then(a.group_key().cmp(b.group_key())));
        built
    }

    fn plan_and_coordinate(
        &self,
        fs: &dyn FileSystem,
        clock: &dyn Clock,
        http: &dyn HttpClient,
        cancel: &CancellationToken,
        group: &TitleGroup,
        override_volumes: &[PathBuf],
    ) -> Option<DesiredMountDefinition> {
        let input = PlanInput {
            canonical_title: &group.canonical_title,
            group_key: group.group_key(),
            override_volumes,
            source_branches: &group.source_branches,
            branch_links_root: &self.config.branch_links_root,
            merged_root: &self.config.merged_root,
        };

        let plan = match plan_branches(fs, self.source_priority, &input) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(event = "merge.plan.failed", title = %group.canonical_title, error = %e);
                return None;
            }
        };

        match &plan.preferred_override_path {
            Some(preferred_override) => {
                let preferred_dir = preferred_override.join(&group.canonical_title);
                let all_override_dirs: Vec<PathBuf> = override_volumes.iter().map(|v| v.join(&group.canonical_title)).collect();
                let ordered_source_dirs: Vec<PathBuf> = plan
                    .branch_links
                    .iter()
                    .filter(|link| link.kind == BranchLinkKind::Source)
                    .map(|link| link.target_path.clone())
                    .collect();
                let equivalent_titles = self.catalog.equivalent_titles_for(&group.canonical_title);

                let metadata_request = EnsureMetadataRequest {
                    display_title: &group.canonical_title,
                    equivalent_titles: &equivalent_titles,
                    preferred_dir: &preferred_dir,
                    all_override_dirs: &all_override_dirs,
                    ordered_source_dirs: &ordered_source_dirs,
                    cover_base_uri: &self.config.cover_base_uri,
                    preferred_language: self.config.preferred_language.as_deref(),
                };
                let _ = self.coordinator.ensure_metadata(fs, clock, http, cancel, &metadata_request);
            }
            None => {
                tracing::debug!(event = "metadata.skipped", reason = "no_override_volume", title = %group.canonical_title);
            }
        }

        Some(plan)
    }

    fn compute_actions(&self, fs: &dyn FileSystem, desired: &[DesiredMountDefinition], force_scope: &ForceScope) -> Vec<MountAction> {
        let managed: HashMap<PathBuf, MountSnapshotEntry> = self
            .read_live_snapshot(fs)
            .into_iter()
            .filter(|entry| entry.target.starts_with(&self.config.merged_root))
            .map(|entry| (entry.target.clone(), entry))
            .collect();

        let desired_points: HashSet<&PathBuf> = desired.iter().map(|plan| &plan.mount_point).collect();

        let mut actions = Vec::new();
        for plan in desired {
            match managed.get(&plan.mount_point) {
                None => actions.push(MountAction {
                    kind: MountActionKind::Mount,
                    mount_point: plan.mount_point.clone(),
                    desired_identity: Some(plan.desired_identity.clone()),
                    branch_specification: Some(plan.branch_specification.clone()),
                    reason: "missing".to_string(),
                }),
                Some(entry) if entry.fsname() != Some(plan.desired_identity.as_str()) => actions.push(MountAction {
                    kind: MountActionKind::Remount,
                    mount_point: plan.mount_point.clone(),
                    desired_identity: Some(plan.desired_identity.clone()),
                    branch_specification: Some(plan.branch_specification.clone()),
                    reason: "drift".to_string(),
                }),
                Some(_) => {
                    let forced = match force_scope {
                        ForceScope::All => true,
                        ForceScope::Titled(mount_point) => mount_point == &plan.mount_point,
                        ForceScope::None => false,
                    };
                    if forced {
                        actions.push(MountAction {
                            kind: MountActionKind::Remount,
                            mount_point: plan.mount_point.clone(),
                            desired_identity: Some(plan.desired_identity.clone()),
                            branch_specification: Some(plan.branch_specification.clone()),
                            reason: "forced".to_string(),
                        });
                    }
                }
            }
        }

        for target in managed.keys() {
            if !desired_points.contains(target) {
                actions.push(MountAction {
                    kind: MountActionKind::Unmount,
                    mount_point: target.clone(),
                    desired_identity: None,
                    branch_specification: None,
                    reason: "not desired".to_string(),
                });
            }
        }

        actions.sort_by(|a, b| a.kind.cmp(&b.kind).then(a.mount_point.cmp(&b.mount_point)));
        actions
    }

    fn read_live_snapshot(&self, _fs: &dyn FileSystem) -> Vec<MountSnapshotEntry> {
        let spec = ProcessSpec::new(
            self.config.findmnt_bin.clone(),
            vec!["-P".to_string(), "-o".to_string(), "TARGET,FSTYPE,SOURCE,OPTIONS".to_string()],
            self.config.findmnt_timeout,
        );
        match self.runner.run(&spec) {
            ProcessOutcome::Exited { stdout, .. } => stdout.lines().filter_map(|line| parse_findmnt_line(line).ok()).collect(),
            ProcessOutcome::TimedOut | ProcessOutcome::ToolNotFound => {
                tracing::warn!(event = "merge.snapshot.unavailable");
                Vec::new()
            }
        }
    }

    fn any_managed_mount_remains(&self, fs: &dyn FileSystem) -> bool {
        self.read_live_snapshot(fs).iter().any(|entry| entry.target.starts_with(&self.config.merged_root))
    }

    /// Runs the residual-quarantine pass only if no managed mount remains live under
    /// `merged_root` (spec §4.15 step 8). Emits `merge.cleanup` at warning level with
    /// `relocation_mode="copy_delete"` whenever any entry needed the cross-filesystem
    /// copy+delete fallback, since that path is slower and leaves a larger failure window than a
    /// plain rename.
    fn residual_cleanup(&self, fs: &dyn FileSystem, clock: &dyn Clock) {
        if self.any_managed_mount_remains(fs) {
            tracing::debug!(event = "merge.cleanup", skipped_due_to_active_mounts = true);
            return;
        }

        clean_empty_subtree(fs, &self.config.merged_root);

        let Ok(remaining) = fs.read_dir(&self.config.merged_root) else { return };
        let remaining: Vec<PathBuf> = remaining.into_iter().filter(|entry| fs.is_dir(entry)).collect();
        if remaining.is_empty() {
            return;
        }

        let batch_dir = self.config.cleanup_root.join(format!(
            "{}_merge-residual_{}",
            clock.now().format("%Y%m%dT%H%M%SZ"),
            uuid::Uuid::new_v4()
        ));
        if let Err(e) = fs.create_dir_all(&batch_dir) {
            tracing::warn!(event = "merge.cleanup.quarantine_dir_failed", error = %e);
            return;
        }

        let mut moved_non_empty_directories = 0u32;
        let mut used_copy_delete = false;
        for entry in &remaining {
            match quarantine_one(fs, &batch_dir, entry) {
                Some(RelocationMode::Move) => moved_non_empty_directories += 1,
                Some(RelocationMode::CopyDelete) => {
                    moved_non_empty_directories += 1;
                    used_copy_delete = true;
                }
                None => {}
            }
        }

        let relocation_mode = if used_copy_delete { "copy_delete" } else { "move" };
        if used_copy_delete {
            tracing::warn!(
                event = "merge.cleanup",
                quarantine_dir = %batch_dir.display(),
                count = remaining.len(),
                moved_non_empty_directories,
                relocation_mode,
                skipped_due_to_active_mounts = false,
            );
        } else {
            tracing::info!(
                event = "merge.cleanup",
                quarantine_dir = %batch_dir.display(),
                count = remaining.len(),
                moved_non_empty_directories,
                relocation_mode,
                skipped_due_to_active_mounts = false,
            );
        }
    }

    fn aggregate_outcome(&self, action_outcomes: &[ActionOutcome], discovery_had_warnings: bool) -> MergePassOutcome {
        if action_outcomes.is_empty() {
            return if discovery_had_warnings { MergePassOutcome::Mixed } else { MergePassOutcome::Success };
        }

        let any_success = action_outcomes.iter().any(|o| *o == ActionOutcome::Success);
        let any_failure = action_outcomes.iter().any(|o| *o == ActionOutcome::Failure);

        let outcome = match (any_success, any_failure) {
            (true, false) => MergePassOutcome::Success,
            (false, true) => MergePassOutcome::Failure,
            _ => MergePassOutcome::Mixed,
        };

        if outcome == MergePassOutcome::Success && discovery_had_warnings {
            MergePassOutcome::Mixed
        } else {
            outcome
        }
    }
}

/// Recursively removes empty descendant directories bottom-up, returning whether `dir` itself is
/// now empty (so the caller can decide whether to remove `dir` too).
fn clean_empty_subtree(fs: &dyn FileSystem, dir: &Path) -> bool {
    let Ok(entries) = fs.read_dir(dir) else { return false };
    let mut empty = true;
    for entry in entries {
        if fs.is_dir(&entry) {
            if clean_empty_subtree(fs, &entry) {
                let _ = fs.remove_empty_dir(&entry);
            }
            if fs.exists(&entry) {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    empty
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelocationMode {
    Move,
    CopyDelete,
}

/// Relocates one top-level merged-root residual directory into the quarantine batch. Tries a
/// plain rename first; falls back to recursive copy + source removal when `rename` fails (e.g.
/// `cleanup_root` lives on a different filesystem than `merged_root`). Returns `None` when
/// neither path could place the entry in quarantine.
fn quarantine_one(fs: &dyn FileSystem, batch_dir: &Path, entry: &Path) -> Option<RelocationMode> {
    let name = entry.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    let mut destination = batch_dir.join(&name);
    let mut suffix = 1u32;
    while fs.exists(&destination) {
        destination = batch_dir.join(format!("{}_{suffix}", name.to_string_lossy()));
        suffix += 1;
    }

    if fs.rename(entry, &destination).is_ok() {
        return Some(RelocationMode::Move);
    }

    if let Err(e) = fs.copy_dir_recursive(entry, &destination) {
        tracing::warn!(event = "merge.cleanup.quarantine_failed", path = %entry.display(), error = %e);
        return None;
    }
    if let Err(e) = fs.remove_dir_all(entry) {
        tracing::warn!(event = "merge.cleanup.source_removal_failed", path = %entry.display(), error = %e);
    }
    Some(RelocationMode::CopyDelete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_impl::InMemoryFileSystem;
    use crate::metadata::comick::ComickClient;
    use crate::metadata::gateway::CloudflareGateway;
    use crate::metadata::state_store::MetadataStateStore;
    use ssm_contracts::{HttpError, HttpResponse, ScopedProcess};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;

    /// Wraps `InMemoryFileSystem`, forcing `rename` to fail like a cross-device move would on a
    /// real filesystem, so tests can exercise the `quarantine_one` copy+delete fallback without a
    /// real multi-filesystem setup.
    struct RenameFailsFileSystem(InMemoryFileSystem);

    impl FileSystem for RenameFailsFileSystem {
        fn exists(&self, path: &Path) -> bool {
            self.0.exists(path)
        }
        fn is_dir(&self, path: &Path) -> bool {
            self.0.is_dir(path)
        }
        fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            self.0.read_dir(path)
        }
        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            self.0.create_dir_all(path)
        }
        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.0.read(path)
        }
        fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
            self.0.write(path, data)
        }
        fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "cross-device link"))
        }
        fn rename_non_overwriting(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.0.rename_non_overwriting(from, to)
        }
        fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.0.remove_file(path)
        }
        fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
            self.0.remove_empty_dir(path)
        }
        fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
            self.0.symlink(target, link)
        }
        fn file_len(&self, path: &Path) -> io::Result<u64> {
            self.0.file_len(path)
        }
        fn copy_dir_recursive(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.0.copy_dir_recursive(from, to)
        }
        fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            self.0.remove_dir_all(path)
        }
    }

    struct FixedClock(chrono::DateTime<chrono::Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            self.0
        }
    }

    struct NoopHttp;
    impl HttpClient for NoopHttp {
        fn get(&self, _url: &str, _accept_json: bool, _timeout: Duration) -> Result<HttpResponse, HttpError> {
            Err(HttpError::Transport("no http expected in this test".to_string()))
        }
        fn post_json(&self, _url: &str, _body: Vec<u8>, _timeout: Duration) -> Result<HttpResponse, HttpError> {
            unimplemented!()
        }
    }

    struct AlwaysLastPriority;
    impl SourcePriority for AlwaysLastPriority {
        fn priority_of(&self, _source_name: &str) -> i64 {
            0
        }
    }

    struct NoTags;
    impl TagSet for NoTags {
        fn contains(&self, _tag: &str) -> bool {
            false
        }
    }

    struct StubRunner {
        findmnt_responses: RefCell<VecDeque<ProcessOutcome>>,
        mergerfs_outcome: ProcessOutcome,
    }

    impl ProcessRunner for StubRunner {
        fn run(&self, spec: &ProcessSpec) -> ProcessOutcome {
            if spec.program == "findmnt" {
                self.findmnt_responses
                    .borrow_mut()
                    .pop_front()
                    .unwrap_or(ProcessOutcome::Exited { code: 0, stdout: String::new(), stderr: String::new() })
            } else if spec.program == "mergerfs" {
                self.mergerfs_outcome.clone()
            } else {
                ProcessOutcome::Exited { code: 0, stdout: String::new(), stderr: String::new() }
            }
        }

        fn spawn_long_running(&self, _program: &str, _args: &[String]) -> Result<Box<dyn ScopedProcess>, ProcessOutcome> {
            unimplemented!()
        }
    }

    fn make_config(fs_root: &str) -> MergeConfig {
        MergeConfig {
            sources_root: PathBuf::from(format!("{fs_root}/sources")),
            override_root: PathBuf::from(format!("{fs_root}/override")),
            merged_root: PathBuf::from(format!("{fs_root}/merged")),
            branch_links_root: PathBuf::from(format!("{fs_root}/branch-links")),
            cleanup_root: PathBuf::from(format!("{fs_root}/config/cleanup/merged-residual")),
            excluded_source_names: Vec::new(),
            cover_base_uri: "https://example.invalid/".to_string(),
            preferred_language: Some("en".to_string()),
            findmnt_bin: "findmnt".to_string(),
            findmnt_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn held_lock_returns_busy_immediately() {
        let fs = InMemoryFileSystem::new();
        let config = make_config("");
        let lock = MergeLock::new();
        let _held = lock.try_acquire().unwrap();

        let catalog = EquivalenceCatalog::load(&fs, "/config/manga_equivalents.yml");
        let state_store = MetadataStateStore::new("/config/state/metadata_state.json");
        let gateway = CloudflareGateway::new(chrono::Duration::hours(1), None);
        let comick = ComickClient::new(&gateway);
        let coordinator = MetadataCoordinator::new(comick, &state_store, Some(&catalog), chrono::Duration::hours(6));
        let runner: Arc<dyn ProcessRunner> =
            Arc::new(StubRunner { findmnt_responses: RefCell::new(VecDeque::new()), mergerfs_outcome: ProcessOutcome::Exited { code: 0, stdout: String::new(), stderr: String::new() } });
        let mount_executor = MountExecutor::new(runner.clone(), crate::mount::executor::MountExecutorConfig::default());

        let workflow = MergeWorkflow::new(&config, &lock, &catalog, &AlwaysLastPriority, &NoTags, coordinator, &mount_executor, runner);

        let clock = FixedClock(chrono::Utc::now());
        let http = NoopHttp;
        let cancel = CancellationToken::new();
        let outcome = workflow.run_merge_pass(&fs, &clock, &http, &cancel, &MergePassRequest { reason: "timer", force: false });
        assert_eq!(outcome, MergePassOutcome::Busy);
    }

    #[test]
    fn missing_mount_is_created_and_pass_reports_success() {
        let fs = InMemoryFileSystem::new();
        fs.add_dir(Path::new("/sources/vol1/alpha/One Piece/ch1"));
        fs.add_dir(Path::new("/override/vol1/One Piece"));
        fs.add_file(Path::new("/override/vol1/One Piece/cover.jpg"), b"existing".to_vec());
        fs.add_file(Path::new("/override/vol1/One Piece/details.json"), b"{}".to_vec());

        let config = make_config("");
        let lock = MergeLock::new();
        let catalog = EquivalenceCatalog::load(&fs, "/config/manga_equivalents.yml");
        let state_store = MetadataStateStore::new("/config/state/metadata_state.json");
        let gateway = CloudflareGateway::new(chrono::Duration::hours(1), None);
        let comick = ComickClient::new(&gateway);
        let coordinator = MetadataCoordinator::new(comick, &state_store, Some(&catalog), chrono::Duration::hours(6));

        let mut findmnt_responses = VecDeque::new();
        findmnt_responses.push_back(ProcessOutcome::Exited { code: 0, stdout: String::new(), stderr: String::new() });
        let post_mount_line = r#"TARGET="/merged/One Piece" FSTYPE="fuse.mergerfs" SOURCE="branches" OPTIONS="threads=1,fsname=placeholder""#;
        findmnt_responses.push_back(ProcessOutcome::Exited { code: 0, stdout: post_mount_line.to_string(), stderr: String::new() });
        let runner: Arc<dyn ProcessRunner> = Arc::new(StubRunner {
            findmnt_responses: RefCell::new(findmnt_responses),
            mergerfs_outcome: ProcessOutcome::Exited { code: 0, stdout: String::new(), stderr: String::new() },
        });
        let mount_executor = MountExecutor::new(runner.clone(), crate::mount::executor::MountExecutorConfig::default());

        let workflow = MergeWorkflow::new(&config, &lock, &catalog, &AlwaysLastPriority, &NoTags, coordinator, &mount_executor, runner);

        let clock = FixedClock(chrono::Utc::now());
        let http = NoopHttp;
        let cancel = CancellationToken::new();
        let outcome = workflow.run_merge_pass(&fs, &clock, &http, &cancel, &MergePassRequest { reason: "inotify-event", force: false });
        assert_eq!(outcome, MergePassOutcome::Success);
        assert!(fs.exists(Path::new("/merged/One Piece")));
    }

    #[test]
    fn residual_directory_with_no_managed_mounts_is_quarantined() {
        let fs = InMemoryFileSystem::new();
        fs.add_dir(Path::new("/sources"));
        fs.add_dir(Path::new("/override"));
        fs.add_dir(Path::new("/merged/Orphaned Title/leftover-file-holder"));
        fs.add_file(Path::new("/merged/Orphaned Title/leftover-file-holder/page.txt"), b"data".to_vec());

        let config = make_config("");
        let lock = MergeLock::new();
        let catalog = EquivalenceCatalog::load(&fs, "/config/manga_equivalents.yml");
        let state_store = MetadataStateStore::new("/config/state/metadata_state.json");
        let gateway = CloudflareGateway::new(chrono::Duration::hours(1), None);
        let comick = ComickClient::new(&gateway);
        let coordinator = MetadataCoordinator::new(comick, &state_store, Some(&catalog), chrono::Duration::hours(6));

        let runner: Arc<dyn ProcessRunner> = Arc::new(StubRunner {
            findmnt_responses: RefCell::new(VecDeque::new()),
            mergerfs_outcome: ProcessOutcome::Exited { code: 0, stdout: String::new(), stderr: String::new() },
        });
        let mount_executor = MountExecutor::new(runner.clone(), crate::mount::executor::MountExecutorConfig::default());
        let workflow = MergeWorkflow::new(&config, &lock, &catalog, &AlwaysLastPriority, &NoTags, coordinator, &mount_executor, runner);

        let clock = FixedClock(chrono::Utc::now());
        let http = NoopHttp;
        let cancel = CancellationToken::new();
        let outcome = workflow.run_merge_pass(&fs, &clock, &http, &cancel, &MergePassRequest { reason: "timer", force: false });
        assert_eq!(outcome, MergePassOutcome::Success);
        assert!(!fs.exists(Path::new("/merged/Orphaned Title")));
    }

    #[test]
    fn quarantine_one_falls_back_to_copy_delete_across_filesystems() {
        let inner = InMemoryFileSystem::new();
        inner.add_dir(Path::new("/merged/Title/leftover"));
        inner.add_file(Path::new("/merged/Title/leftover/page.txt"), b"data".to_vec());
        inner.add_dir(Path::new("/cleanup/batch"));
        let fs = RenameFailsFileSystem(inner);

        let mode = quarantine_one(&fs, Path::new("/cleanup/batch"), Path::new("/merged/Title"));

        assert_eq!(mode, Some(RelocationMode::CopyDelete));
        assert!(fs.exists(Path::new("/cleanup/batch/Title/leftover/page.txt")));
        assert!(!fs.exists(Path::new("/merged/Title")));
    }
}
