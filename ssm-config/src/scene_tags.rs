use std::path::Path;

/// `<configRoot>/scene_tags.yml`: a flat list of release-group/scanlation tags stripped from raw
/// titles before normalization (spec §4.2). Treated as enrichment, same as the equivalence
/// catalog — a missing or malformed file degrades to "strip nothing" rather than failing
/// startup, since an empty tag list never changes correctness, only match quality.
pub fn load_scene_tags(path: &Path) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(event = "config.scene_tags.read_failed", path = %path.display(), error = %e);
            return Vec::new();
        }
    };
    match serde_yaml::from_slice::<Vec<String>>(&bytes) {
        Ok(tags) => tags,
        Err(e) => {
            tracing::warn!(event = "config.scene_tags.parse_failed", path = %path.display(), error = %e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_list() {
        assert!(load_scene_tags(Path::new("/nonexistent/scene_tags.yml")).is_empty());
    }

    #[test]
    fn loads_flat_tag_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene_tags.yml");
        std::fs::write(&path, b"- LuciferDevil\n- Kanjozoku\n").unwrap();
        assert_eq!(load_scene_tags(&path), vec!["LuciferDevil".to_string(), "Kanjozoku".to_string()]);
    }

    #[test]
    fn malformed_file_degrades_to_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene_tags.yml");
        std::fs::write(&path, b"{not a list").unwrap();
        assert!(load_scene_tags(&path).is_empty());
    }
}
