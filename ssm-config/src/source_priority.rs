use std::path::Path;

/// `<configRoot>/source_priority.yml`: source names in preferred-mount order. A source's index
/// in the list is its priority (`ssm_core::planner::SourcePriority` is implemented directly on
/// `Vec<String>`); names absent from the list sort after every named source. Same enrichment
/// semantics as `scene_tags.yml` — a missing or malformed file just means "no preference".
pub fn load_source_priority(path: &Path) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(event = "config.source_priority.read_failed", path = %path.display(), error = %e);
            return Vec::new();
        }
    };
    match serde_yaml::from_slice::<Vec<String>>(&bytes) {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(event = "config.source_priority.parse_failed", path = %path.display(), error = %e);
            Vec::new()
        }
    }
}
