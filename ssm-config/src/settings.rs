use crate::error::{ConfigError, Result};
use crate::paths::ResolvedPaths;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `<configRoot>/settings.yml`. Every field has a sensible default so an absent file (a fresh
/// install) behaves identically to one spelling out the defaults explicitly.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Source names excluded from branch planning entirely (spec §4.4's source enumeration).
    pub excluded_source_names: Vec<String>,
    /// Preferred language for equivalence-catalog canonical selection and Comick candidate
    /// ranking (exact match, then 2-char prefix, then English, then main title).
    pub preferred_language: Option<String>,
    /// Base URI prefix the cover service joins with a candidate's `b2Key`.
    pub cover_base_uri: String,

    /// How long a title's metadata lookup stays on cooldown after a successful or
    /// service-interrupted attempt.
    pub metadata_cooldown_hours: i64,
    /// How long direct Comick requests stay sticky-routed through FlareSolverr after a
    /// Cloudflare block is detected, anchored on block-detected time.
    pub direct_retry_interval_minutes: i64,
    /// Base URL of a FlareSolverr instance, e.g. `http://flaresolverr:8191`. `None` disables the
    /// Cloudflare fallback path entirely — direct blocks are then reported as service
    /// interruptions with no retry routing.
    pub flaresolverr_base_url: Option<String>,
    pub flaresolverr_timeout_seconds: u64,
    pub http_request_timeout_seconds: u64,

    /// Full rescan cadence, independent of filesystem events.
    pub rescan_interval_minutes: i64,
    /// Timer-driven merge-pass cadence when no filesystem event has fired one sooner.
    pub merge_interval_minutes: i64,
    /// Minimum spacing enforced between two dispatched merge passes.
    pub min_scan_spacing_seconds: i64,
    /// Backoff before retrying a merge-pass dispatch that found the process-wide lock busy.
    pub lock_retry_interval_seconds: i64,
    /// Per-tick bound on how long the trigger pipeline blocks draining the filesystem monitor.
    pub poll_timeout_seconds: u64,
    /// Whether the very first tick after startup enqueues an unconditional full rescan.
    pub enqueue_startup_scan: bool,

    pub mergerfs_bin: String,
    pub fusermount_bin: String,
    pub findmnt_bin: String,
    /// Extra mergerfs options appended ahead of the per-mount `threads=`/`fsname=` tokens.
    pub mergerfs_base_options: String,
    pub mount_action_timeout_seconds: u64,
    pub findmnt_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            excluded_source_names: Vec::new(),
            preferred_language: None,
            cover_base_uri: "https://meo.comick.pictures".to_string(),
            metadata_cooldown_hours: 24,
            direct_retry_interval_minutes: 30,
            flaresolverr_base_url: None,
            flaresolverr_timeout_seconds: 60,
            http_request_timeout_seconds: 30,
            rescan_interval_minutes: 60,
            merge_interval_minutes: 15,
            min_scan_spacing_seconds: 5,
            lock_retry_interval_seconds: 10,
            poll_timeout_seconds: 2,
            enqueue_startup_scan: true,
            mergerfs_bin: "mergerfs".to_string(),
            fusermount_bin: "fusermount3".to_string(),
            findmnt_bin: "findmnt".to_string(),
            mergerfs_base_options: String::new(),
            mount_action_timeout_seconds: 30,
            findmnt_timeout_seconds: 10,
        }
    }
}

/// Loads `settings.yml`, falling back to `Settings::default()` when the file does not exist. A
/// present-but-malformed file is a configuration error, not a silent default — unlike the
/// enrichment lists (`scene_tags.yml`, `source_priority.yml`), a broken `settings.yml` usually
/// means the operator meant to change something and should find out immediately.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    serde_yaml::from_slice(&bytes).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

/// Creates every directory the daemon needs before it can run. Idempotent; safe to call on every
/// startup.
pub fn ensure_directories(paths: &ResolvedPaths) -> Result<()> {
    for dir in paths.directories_to_bootstrap() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io { path: dir.to_path_buf(), source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings(Path::new("/nonexistent/settings.yml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        std::fs::write(&path, b"not: [valid: yaml").unwrap();
        assert!(matches!(load_settings(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn partial_override_fills_remaining_fields_from_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        std::fs::write(&path, b"metadata_cooldown_hours: 6\n").unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.metadata_cooldown_hours, 6);
        assert_eq!(settings.mergerfs_bin, "mergerfs");
    }
}
