use crate::error::{ModelError, Result};
use std::path::{Path, PathBuf};

/// Which slot in the branch specification a link occupies. Ordering here is load-bearing: the
/// planner always emits `OverridePrimary` first, then `OverrideSecondary` in volume order, then
/// `Source` in priority order — mirrored by the numeric link-name prefixes (`00_`, `01_`, `10_`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchLinkKind {
    OverridePrimary,
    OverrideSecondary,
    Source,
}

/// A single symlink under `<branchLinksRoot>/<groupId>/` that mergerfs will treat as one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchLink {
    pub link_path: PathBuf,
    pub target_path: PathBuf,
    pub kind: BranchLinkKind,
}

impl BranchLink {
    /// Fails if `link_path` is not a strict child of `link_dir_root` — the invariant that keeps
    /// mergerfs branch links from ever escaping their per-group directory.
    pub fn new(
        link_dir_root: &Path,
        link_path: PathBuf,
        target_path: PathBuf,
        kind: BranchLinkKind,
    ) -> Result<Self> {
        let parent = link_path.parent().ok_or_else(|| {
            ModelError::InvalidBranchLink(format!("{} has no parent", link_path.display()))
        })?;
        if parent != link_dir_root {
            return Err(ModelError::InvalidBranchLink(format!(
                "{} escapes link directory root {}",
                link_path.display(),
                link_dir_root.display()
            )));
        }
        Ok(Self {
            link_path,
            target_path,
            kind,
        })
    }
}

/// The mount state the reconciler wants to exist after converging this group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredMountDefinition {
    pub mount_point: PathBuf,
    pub desired_identity: String,
    pub branch_specification: String,
    pub group_id: String,
    pub preferred_override_path: Option<PathBuf>,
    pub branch_links: Vec<BranchLink>,
}

/// One mergerfs/fuse mount as observed via `findmnt -P`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSnapshotEntry {
    pub target: PathBuf,
    pub fs_type: String,
    pub source: Option<String>,
    pub options: Option<String>,
    pub is_healthy: Option<bool>,
}

impl MountSnapshotEntry {
    /// Extracts the `fsname=` token from `options`, if present — this is where the planner's
    /// `desired_identity` is round-tripped through the mount so drift can be detected.
    pub fn fsname(&self) -> Option<&str> {
        let options = self.options.as_deref()?;
        options.split(',').find_map(|tok| tok.strip_prefix("fsname="))
    }
}

/// What the reconciler decided to do with one mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MountActionKind {
    Mount,
    Remount,
    Unmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountAction {
    pub kind: MountActionKind,
    pub mount_point: PathBuf,
    pub desired_identity: Option<String>,
    pub branch_specification: Option<String>,
    pub reason: String,
}
