//! Configuration loading, validation, and environment resolution for the ssm merge daemon.
//!
//! Four on-disk YAML documents (`settings.yml`, `scene_tags.yml`, `manga_equivalents.yml`,
//! `source_priority.yml`) live under one config root. This crate owns the first, third, and
//! fourth only by path resolution — `manga_equivalents.yml` is read and written directly by
//! `ssm_core::catalog::EquivalenceCatalog`, which already carries its own load/reload/validate
//! cycle; duplicating that here would just be a second source of truth for the same file.

pub mod env;
pub mod error;
pub mod paths;
pub mod scene_tags;
pub mod settings;
pub mod source_priority;
pub mod validation;

pub use env::{read_effective_ids, EffectiveIds};
pub use error::{ConfigError, Result};
pub use paths::ResolvedPaths;
pub use settings::Settings;

/// Everything the daemon needs out of the config root except the equivalence catalog, which the
/// caller loads separately against `paths.manga_equivalents_path` so it can hand the result
/// straight into `ssm_core::catalog::EquivalenceCatalog::load`.
#[derive(Debug, Clone)]
pub struct ConfigBundle {
    pub paths: ResolvedPaths,
    pub settings: Settings,
    pub scene_tags: Vec<String>,
    pub source_priority: Vec<String>,
}

/// Bootstraps every required directory, then loads and validates `settings.yml` and the two
/// enrichment lists. `settings.yml` being malformed fails this call; `scene_tags.yml` and
/// `source_priority.yml` degrade to empty lists on their own (see their loaders) and never fail
/// it.
pub fn load(paths: ResolvedPaths) -> Result<ConfigBundle> {
    settings::ensure_directories(&paths)?;

    let settings = settings::load_settings(&paths.settings_path)?;
    validation::validate(&settings)?;

    let scene_tags = scene_tags::load_scene_tags(&paths.scene_tags_path);
    let source_priority = source_priority::load_source_priority(&paths.source_priority_path);

    Ok(ConfigBundle { paths, settings, scene_tags, source_priority })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_from_empty_config_root() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResolvedPaths::new(
            dir.path().join("config"),
            dir.path().join("sources"),
            dir.path().join("override"),
            dir.path().join("merged"),
        );
        let bundle = load(paths).unwrap();
        assert_eq!(bundle.settings, Settings::default());
        assert!(bundle.scene_tags.is_empty());
        assert!(bundle.source_priority.is_empty());
        assert!(bundle.paths.config_root.is_dir());
        assert!(bundle.paths.sources_root.is_dir());
    }

    #[test]
    fn invalid_settings_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        std::fs::create_dir_all(&config_root).unwrap();
        std::fs::write(config_root.join("settings.yml"), b"poll_timeout_seconds: 0\n").unwrap();
        let paths = ResolvedPaths::new(config_root, dir.path().join("sources"), dir.path().join("override"), dir.path().join("merged"));
        assert!(load(paths).is_err());
    }
}
