//! `ssm-daemon`: long-running entrypoint that wires config, system seams, and the merge-mount
//! workflow into the trigger pipeline's daemon worker loop. No required arguments (spec §6);
//! `--once` is the one operator convenience flag beyond what spec.md's CLI section names.

mod trigger_hooks;

use clap::Parser;
use ssm_config::ResolvedPaths;
use ssm_contracts::{FileSystem, ProcessRunner, SystemClock};
use ssm_core::catalog::EquivalenceCatalog;
use ssm_core::daemon::{DaemonLifecycleHooks, DaemonWorker};
use ssm_core::fs_impl::RealFileSystem;
use ssm_core::http_impl::ReqwestHttpClient;
use ssm_core::merge::{MergeConfig, MergeLock, MergePassRequest, MergeWorkflow};
use ssm_core::metadata::{CloudflareGateway, ComickClient, FlareSolverrClient, MetadataCoordinator, MetadataStateStore};
use ssm_core::monitor::{FilesystemMonitor, StartupMode};
use ssm_core::mount::{MountExecutor, MountExecutorConfig};
use ssm_core::process_impl::RealProcessRunner;
use ssm_core::trigger::{TriggerPipeline, TriggerPipelineConfig};
use ssm_core::{CancellationToken, CoreError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use trigger_hooks::DirectoryAwareTriggerHooks;

#[derive(Parser, Debug)]
#[command(name = "ssm-daemon")]
#[command(about = "Merges per-source manga directory trees into one mergerfs view, with Cloudflare-aware metadata enrichment")]
struct Args {
    /// Directory holding settings.yml, scene_tags.yml, manga_equivalents.yml, source_priority.yml.
    #[arg(long, env = "SSM_CONFIG_ROOT", default_value = "/ssm/config")]
    config_root: PathBuf,

    /// Root under which each volume's per-source manga trees live.
    #[arg(long, env = "SSM_SOURCES_ROOT", default_value = "/ssm/sources")]
    sources_root: PathBuf,

    /// Root holding per-volume override titles (cover.jpg / details.json).
    #[arg(long, env = "SSM_OVERRIDE_ROOT", default_value = "/ssm/override")]
    override_root: PathBuf,

    /// Root under which union-mount points are created.
    #[arg(long, env = "SSM_MERGED_ROOT", default_value = "/ssm/merged")]
    merged_root: PathBuf,

    /// `tracing_subscriber::EnvFilter` directive, e.g. "debug" or "ssm_core=debug,ssm_daemon=info".
    #[arg(long, env = "SSM_LOG", default_value = "info")]
    log_level: String,

    /// Run a single merge pass and exit, instead of starting the long-running worker loop.
    #[arg(long)]
    once: bool,
}

struct LoggingLifecycleHooks;

impl DaemonLifecycleHooks for LoggingLifecycleHooks {
    fn on_start(&self) -> ssm_core::Result<()> {
        tracing::info!(event = "daemon.start");
        Ok(())
    }

    fn on_stop(&self, shutdown_token: &CancellationToken) -> ssm_core::Result<()> {
        tracing::info!(event = "daemon.stop", cooperative = shutdown_token.is_cancelled());
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ids = ssm_config::read_effective_ids();
    tracing::info!(event = "daemon.startup.ids", puid = ?ids.puid, pgid = ?ids.pgid);

    let paths = ResolvedPaths::new(
        args.config_root.clone(),
        args.sources_root.clone(),
        args.override_root.clone(),
        args.merged_root.clone(),
    );
    let bundle = ssm_config::load(paths).map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    tracing::info!(
        event = "daemon.startup.config",
        config_root = %bundle.paths.config_root.display(),
        sources_root = %bundle.paths.sources_root.display(),
        override_root = %bundle.paths.override_root.display(),
        merged_root = %bundle.paths.merged_root.display(),
        rescan_interval_minutes = bundle.settings.rescan_interval_minutes,
        merge_interval_minutes = bundle.settings.merge_interval_minutes,
        excluded_source_count = bundle.settings.excluded_source_names.len(),
        source_priority_count = bundle.source_priority.len(),
        scene_tag_count = bundle.scene_tags.len(),
        flaresolverr_configured = bundle.settings.flaresolverr_base_url.is_some(),
    );

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());
    let runner: Arc<dyn ProcessRunner> = Arc::new(RealProcessRunner::new());
    let http = ReqwestHttpClient::new();
    let clock = SystemClock;

    let catalog = EquivalenceCatalog::load(fs.as_ref(), bundle.paths.manga_equivalents_path.clone());
    let state_store = MetadataStateStore::new(bundle.paths.metadata_state_path.clone());

    let flaresolverr = bundle.settings.flaresolverr_base_url.clone().map(FlareSolverrClient::new);
    let gateway = CloudflareGateway::new(chrono::Duration::minutes(bundle.settings.direct_retry_interval_minutes), flaresolverr);
    let comick = ComickClient::new(&gateway);
    let cooldown_window = chrono::Duration::hours(bundle.settings.metadata_cooldown_hours);
    let coordinator = MetadataCoordinator::new(comick, &state_store, Some(&catalog), cooldown_window);

    let mount_executor_config = MountExecutorConfig {
        mergerfs_bin: bundle.settings.mergerfs_bin.clone(),
        fusermount_bin: bundle.settings.fusermount_bin.clone(),
        action_timeout: Duration::from_secs(bundle.settings.mount_action_timeout_seconds),
        base_options: bundle.settings.mergerfs_base_options.clone(),
    };
    let mount_executor = MountExecutor::new(Arc::clone(&runner), mount_executor_config);

    let merge_lock = MergeLock::new();
    let merge_config = MergeConfig {
        sources_root: bundle.paths.sources_root.clone(),
        override_root: bundle.paths.override_root.clone(),
        merged_root: bundle.paths.merged_root.clone(),
        branch_links_root: bundle.paths.branch_links_root.clone(),
        cleanup_root: bundle.paths.cleanup_root.clone(),
        excluded_source_names: bundle.settings.excluded_source_names.clone(),
        cover_base_uri: bundle.settings.cover_base_uri.clone(),
        preferred_language: bundle.settings.preferred_language.clone(),
        findmnt_bin: bundle.settings.findmnt_bin.clone(),
        findmnt_timeout: Duration::from_secs(bundle.settings.findmnt_timeout_seconds),
    };

    let merge_workflow = MergeWorkflow::new(
        &merge_config,
        &merge_lock,
        &catalog,
        &bundle.source_priority,
        &bundle.scene_tags,
        coordinator,
        &mount_executor,
        Arc::clone(&runner),
    );

    let cancel = CancellationToken::new();

    let run_pass = |reason: &str, force: bool| {
        merge_workflow.run_merge_pass(fs.as_ref(), &clock, &http, &cancel, &MergePassRequest { reason, force })
    };

    if args.once {
        let outcome = run_pass("cli-once", true);
        tracing::info!(event = "daemon.once.completed", outcome = ?outcome);
        return Ok(());
    }

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown_flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown_flag))?;

    let monitor = FilesystemMonitor::new(Arc::clone(&runner), StartupMode::Progressive);
    let hooks = DirectoryAwareTriggerHooks::new(Arc::clone(&fs), bundle.paths.sources_root.clone(), bundle.paths.override_root.clone());
    let pipeline_config = TriggerPipelineConfig {
        watch_roots: vec![bundle.paths.sources_root.clone(), bundle.paths.override_root.clone()],
        poll_timeout: Duration::from_secs(bundle.settings.poll_timeout_seconds),
        rescan_interval: chrono::Duration::minutes(bundle.settings.rescan_interval_minutes),
        merge_interval: chrono::Duration::minutes(bundle.settings.merge_interval_minutes),
        min_scan_spacing: chrono::Duration::seconds(bundle.settings.min_scan_spacing_seconds),
        lock_retry_interval: chrono::Duration::seconds(bundle.settings.lock_retry_interval_seconds),
        enqueue_startup_scan: bundle.settings.enqueue_startup_scan,
    };
    let pipeline = TriggerPipeline::new(monitor, Box::new(hooks), pipeline_config);
    let worker = DaemonWorker::new(pipeline, Box::new(LoggingLifecycleHooks));

    let now_cancel = cancel.clone();
    let now_shutdown_flag = Arc::clone(&shutdown_flag);
    let now_fn = move || {
        if now_shutdown_flag.load(Ordering::SeqCst) {
            now_cancel.cancel();
        }
        chrono::Utc::now()
    };

    worker
        .run(&cancel, None, now_fn, run_pass)
        .map_err(|e: CoreError| anyhow::anyhow!("daemon worker failed: {e}"))?;

    tracing::info!(event = "daemon.shutdown.complete");
    Ok(())
}
