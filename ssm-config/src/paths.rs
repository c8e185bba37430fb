use std::path::{Path, PathBuf};

/// The four conventional mount roots (spec's `/ssm/config`, `/ssm/sources`, `/ssm/override`,
/// `/ssm/merged`) plus every path derived from them. Constructed once at startup from CLI/env
/// overrides and threaded everywhere a path is needed, so no component re-derives a layout rule.
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub config_root: PathBuf,
    pub sources_root: PathBuf,
    pub override_root: PathBuf,
    pub merged_root: PathBuf,

    pub settings_path: PathBuf,
    pub scene_tags_path: PathBuf,
    pub manga_equivalents_path: PathBuf,
    pub source_priority_path: PathBuf,

    pub state_dir: PathBuf,
    pub metadata_state_path: PathBuf,

    pub branch_links_root: PathBuf,
    pub cleanup_root: PathBuf,
}

impl ResolvedPaths {
    pub fn new(config_root: impl Into<PathBuf>, sources_root: impl Into<PathBuf>, override_root: impl Into<PathBuf>, merged_root: impl Into<PathBuf>) -> Self {
        let config_root = config_root.into();
        let state_dir = config_root.join("state");
        Self {
            settings_path: config_root.join("settings.yml"),
            scene_tags_path: config_root.join("scene_tags.yml"),
            manga_equivalents_path: config_root.join("manga_equivalents.yml"),
            source_priority_path: config_root.join("source_priority.yml"),
            metadata_state_path: state_dir.join("metadata_state.json"),
            state_dir,
            branch_links_root: config_root.join("branch-links"),
            cleanup_root: config_root.join("cleanup").join("merged-residual"),
            sources_root: sources_root.into(),
            override_root: override_root.into(),
            merged_root: merged_root.into(),
            config_root,
        }
    }

    /// Every directory that must exist before the daemon can load config or run a merge pass.
    /// Leaf config files (`settings.yml`, etc.) are intentionally not created here — a missing
    /// file means "use defaults", not "broken install".
    pub fn directories_to_bootstrap(&self) -> [&Path; 6] {
        [
            &self.config_root,
            &self.sources_root,
            &self.override_root,
            &self.merged_root,
            &self.state_dir,
            &self.branch_links_root,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_expected_file_layout() {
        let paths = ResolvedPaths::new("/ssm/config", "/ssm/sources", "/ssm/override", "/ssm/merged");
        assert_eq!(paths.settings_path, PathBuf::from("/ssm/config/settings.yml"));
        assert_eq!(paths.metadata_state_path, PathBuf::from("/ssm/config/state/metadata_state.json"));
        assert_eq!(paths.cleanup_root, PathBuf::from("/ssm/config/cleanup/merged-residual"));
    }
}
