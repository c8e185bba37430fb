//! Mergerfs branch planner (spec §4.4): given a title group, choose the preferred override
//! branch, order source branches by priority, and build a stable branch specification plus
//! desired identity.

use crate::error::{CoreError, ErrorKind, Result};
use crate::normalize::{escape_reserved_segment, hash_hex_prefix, sanitize_label};
use ssm_contracts::FileSystem;
use ssm_model::{BranchLink, BranchLinkKind, DesiredMountDefinition, SourceBranch};
use std::path::{Path, PathBuf};

/// Orders source branches by external priority configuration (`source_priority.yml`). Lower
/// returned value sorts earlier (higher priority).
pub trait SourcePriority {
    fn priority_of(&self, source_name: &str) -> i64;
}

/// `source_priority.yml` loads naturally into an ordered name list; a source's index in that
/// list is its priority, so `ssm-config` can hand the planner a plain `Vec<String>` without this
/// crate depending on `ssm-config`'s concrete config types. Sources absent from the list sort
/// after every named one, in original-order ties.
impl SourcePriority for Vec<String> {
    fn priority_of(&self, source_name: &str) -> i64 {
        self.iter()
            .position(|name| name == source_name)
            .map(|idx| idx as i64)
            .unwrap_or(i64::MAX)
    }
}

pub struct PlanInput<'a> {
    pub canonical_title: &'a str,
    pub group_key: &'a str,
    pub override_volumes: &'a [PathBuf],
    pub source_branches: &'a [SourceBranch],
    pub branch_links_root: &'a Path,
    pub merged_root: &'a Path,
}

pub fn plan_branches(
    fs: &dyn FileSystem,
    priority: &dyn SourcePriority,
    input: &PlanInput<'_>,
) -> Result<DesiredMountDefinition> {
    let preferred_override = select_preferred_override(fs, input.canonical_title, input.override_volumes);

    let mut ordered_sources: Vec<&SourceBranch> = input.source_branches.iter().collect();
    ordered_sources.sort_by(|a, b| {
        priority
            .priority_of(&a.source_name)
            .cmp(&priority.priority_of(&b.source_name))
            .then_with(|| a.source_name.cmp(&b.source_name))
            .then_with(|| a.source_path.cmp(&b.source_path))
    });

    let group_id = format!(
        "{}-{}",
        escape_reserved_segment(input.canonical_title),
        hash_hex_prefix(input.group_key, 12)
    );
    let link_dir = input.branch_links_root.join(&group_id);

    let mut branch_links = Vec::new();
    let mut spec_tokens = Vec::new();

    if let Some(preferred) = &preferred_override {
        let link_path = link_dir.join("00_override_primary");
        spec_tokens.push(format!("{}=RW", link_path.display()));
        branch_links.push(BranchLink::new(&link_dir, link_path, preferred.clone(), BranchLinkKind::OverridePrimary)
            .map_err(|e| CoreError::new(ErrorKind::Configuration, e.to_string()))?);
    }

    let mut secondary_index = 0u32;
    for volume in input.override_volumes {
        if preferred_override.as_deref() == Some(volume.as_path()) {
            continue;
        }
        let label = sanitize_label(&volume.to_string_lossy(), secondary_index);
        let link_path = link_dir.join(format!("01_override_{label}"));
        spec_tokens.push(format!("{}=RW", link_path.display()));
        branch_links.push(
            BranchLink::new(&link_dir, link_path, volume.clone(), BranchLinkKind::OverrideSecondary)
                .map_err(|e| CoreError::new(ErrorKind::Configuration, e.to_string()))?,
        );
        secondary_index += 1;
    }

    for (index, source) in ordered_sources.iter().enumerate() {
        let label = sanitize_label(&source.source_name, index as u32);
        let link_path = link_dir.join(format!("10_source_{label}"));
        spec_tokens.push(format!("{}=RO", link_path.display()));
        branch_links.push(
            BranchLink::new(&link_dir, link_path, source.source_path.clone(), BranchLinkKind::Source)
                .map_err(|e| CoreError::new(ErrorKind::Configuration, e.to_string()))?,
        );
    }

    if spec_tokens.is_empty() {
        return Err(CoreError::new(
            ErrorKind::Configuration,
            format!("title group '{}' has no override or source branches to mount", input.canonical_title),
        ));
    }

    let branch_specification = spec_tokens.join(":");
    let desired_identity = hash_hex_prefix(&format!("{}|{}", input.group_key, branch_specification), 16);
    let mount_point = input.merged_root.join(escape_reserved_segment(input.canonical_title));

    Ok(DesiredMountDefinition {
        mount_point,
        desired_identity,
        branch_specification,
        group_id,
        preferred_override_path: preferred_override,
        branch_links,
    })
}

fn select_preferred_override(fs: &dyn FileSystem, canonical_title: &str, volumes: &[PathBuf]) -> Option<PathBuf> {
    for volume in volumes {
        let candidate = volume.join(canonical_title);
        if fs.exists(&candidate) {
            return Some(volume.clone());
        }
    }
    volumes.first().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_impl::InMemoryFileSystem;

    struct FixedPriority;
    impl SourcePriority for FixedPriority {
        fn priority_of(&self, source_name: &str) -> i64 {
            match source_name {
                "alpha" => 0,
                "beta" => 1,
                _ => 100,
            }
        }
    }

    #[test]
    fn branch_links_stay_strict_children_of_link_dir() {
        let fs = InMemoryFileSystem::new();
        fs.add_dir("/override/vol1/One Piece");

        let sources = vec![
            SourceBranch::new("beta", "/sources/vol1/beta/One Piece"),
            SourceBranch::new("alpha", "/sources/vol1/alpha/One Piece"),
        ];
        let input = PlanInput {
            canonical_title: "One Piece",
            group_key: "one piece",
            override_volumes: &[PathBuf::from("/override/vol1")],
            source_branches: &sources,
            branch_links_root: Path::new("/branch-links"),
            merged_root: Path::new("/merged"),
        };

        let plan = plan_branches(&fs, &FixedPriority, &input).unwrap();
        assert_eq!(plan.mount_point, PathBuf::from("/merged/One Piece"));
        assert!(plan.branch_specification.contains("=RW"));
        assert!(plan.branch_specification.contains("=RO"));
        assert_eq!(plan.branch_links.len(), 3);
        for link in &plan.branch_links {
            assert_eq!(link.link_path.parent(), Some(Path::new(&format!("/branch-links/{}", plan.group_id))));
        }
    }

    #[test]
    fn source_branches_ordered_by_priority_then_name() {
        let fs = InMemoryFileSystem::new();
        let sources = vec![
            SourceBranch::new("beta", "/sources/vol1/beta/Title"),
            SourceBranch::new("alpha", "/sources/vol1/alpha/Title"),
        ];
        let input = PlanInput {
            canonical_title: "Title",
            group_key: "title",
            override_volumes: &[],
            source_branches: &sources,
            branch_links_root: Path::new("/branch-links"),
            merged_root: Path::new("/merged"),
        };
        let plan = plan_branches(&fs, &FixedPriority, &input).unwrap();
        assert!(plan.branch_links[0].target_path.to_string_lossy().contains("alpha"));
        assert!(plan.branch_links[1].target_path.to_string_lossy().contains("beta"));
    }
}
