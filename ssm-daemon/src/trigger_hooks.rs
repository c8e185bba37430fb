//! Directory-depth-aware `TriggerHooks` (spec §4.3 step 2): the trigger pipeline deliberately
//! knows nothing about where a chapter directory sits relative to a watch root — that layout is
//! config-owned, so it lives here instead of in `ssm-core`.
//!
//! Source layout: `<sourcesRoot>/<volume>/<sourceName>/<title>/<chapter>`. Override layout:
//! `<overrideRoot>/<volume>/<title>` (no chapter nesting — `cover.jpg`/`details.json` sit
//! directly under the title directory per spec §6).

use ssm_contracts::FileSystem;
use ssm_core::trigger::{PathClass, TriggerHooks};
use ssm_model::ChapterRenameQueueEntry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SOURCE_CHAPTER_DEPTH: usize = 4;
const OVERRIDE_TITLE_DEPTH: usize = 2;

/// Upper bound on directories visited per bounded enumeration pass, so one burst of
/// ancestor-level events (an entire volume appearing) cannot stall a tick indefinitely.
const MAX_ENUMERATED_ENTRIES: usize = 4096;

pub struct DirectoryAwareTriggerHooks {
    fs: Arc<dyn FileSystem>,
    sources_root: PathBuf,
    override_root: PathBuf,
}

impl DirectoryAwareTriggerHooks {
    pub fn new(fs: Arc<dyn FileSystem>, sources_root: PathBuf, override_root: PathBuf) -> Self {
        Self { fs, sources_root, override_root }
    }

    fn ancestor_at(&self, root: &Path, relative: &Path, depth: usize) -> PathBuf {
        root.join(relative.components().take(depth).collect::<PathBuf>())
    }
}

impl TriggerHooks for DirectoryAwareTriggerHooks {
    fn classify_path(&self, path: &Path) -> PathClass {
        if let Ok(relative) = path.strip_prefix(&self.sources_root) {
            return match relative.components().count() {
                0 => PathClass::Irrelevant,
                SOURCE_CHAPTER_DEPTH => PathClass::ChapterDirectory,
                _ => PathClass::RootAncestor,
            };
        }
        if let Ok(relative) = path.strip_prefix(&self.override_root) {
            return if relative.components().count() == 0 { PathClass::Irrelevant } else { PathClass::RootAncestor };
        }
        PathClass::Irrelevant
    }

    fn enumerate_candidates(&self, path: &Path) -> Vec<PathBuf> {
        if let Ok(relative) = path.strip_prefix(&self.sources_root) {
            let depth = relative.components().count();
            return match depth {
                0 | SOURCE_CHAPTER_DEPTH => Vec::new(),
                d if d > SOURCE_CHAPTER_DEPTH => vec![self.ancestor_at(&self.sources_root, relative, SOURCE_CHAPTER_DEPTH)],
                d => {
                    let mut out = Vec::new();
                    dirs_at_depth(self.fs.as_ref(), path, SOURCE_CHAPTER_DEPTH - d, MAX_ENUMERATED_ENTRIES, &mut out);
                    out
                }
            };
        }
        if let Ok(relative) = path.strip_prefix(&self.override_root) {
            let depth = relative.components().count();
            return match depth {
                0 => Vec::new(),
                d if d >= OVERRIDE_TITLE_DEPTH => vec![self.ancestor_at(&self.override_root, relative, OVERRIDE_TITLE_DEPTH)],
                d => {
                    let mut out = Vec::new();
                    dirs_at_depth(self.fs.as_ref(), path, OVERRIDE_TITLE_DEPTH - d, MAX_ENUMERATED_ENTRIES, &mut out);
                    out
                }
            };
        }
        Vec::new()
    }

    fn process_rename(&self, entry: &ChapterRenameQueueEntry) {
        // `ChapterRenameQueueEntry` carries a path and an enqueue time only — there is no
        // destination name to move to, and the system is explicitly not a general-purpose file
        // mover. The merge pass re-derives title groups straight from the filesystem on its next
        // run regardless, so this hook's entire job is surfacing the observation.
        tracing::debug!(event = "trigger.rename.observed", path = %entry.path.display(), enqueued_at = %entry.enqueued_at);
    }

    fn rescan_and_enqueue(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        dirs_at_depth(self.fs.as_ref(), &self.sources_root, SOURCE_CHAPTER_DEPTH, MAX_ENUMERATED_ENTRIES, &mut candidates);
        dirs_at_depth(self.fs.as_ref(), &self.override_root, OVERRIDE_TITLE_DEPTH, MAX_ENUMERATED_ENTRIES, &mut candidates);
        candidates
    }
}

fn list_dirs(fs: &dyn FileSystem, path: &Path) -> Vec<PathBuf> {
    fs.read_dir(path).unwrap_or_default().into_iter().filter(|p| fs.is_dir(p)).collect()
}

/// Collects every directory exactly `depth` levels below `root` into `out`, stopping once `out`
/// reaches `limit`.
fn dirs_at_depth(fs: &dyn FileSystem, root: &Path, depth: usize, limit: usize, out: &mut Vec<PathBuf>) {
    if out.len() >= limit {
        return;
    }
    if depth == 0 {
        out.push(root.to_path_buf());
        return;
    }
    for child in list_dirs(fs, root) {
        dirs_at_depth(fs, &child, depth - 1, limit, out);
        if out.len() >= limit {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssm_core::fs_impl::InMemoryFileSystem;

    fn hooks(fs: Arc<dyn FileSystem>) -> DirectoryAwareTriggerHooks {
        DirectoryAwareTriggerHooks::new(fs, PathBuf::from("/sources"), PathBuf::from("/override"))
    }

    #[test]
    fn classifies_chapter_directory_at_exact_depth() {
        let fs: Arc<dyn FileSystem> = Arc::new(InMemoryFileSystem::new());
        let hooks = hooks(fs);
        assert_eq!(
            hooks.classify_path(Path::new("/sources/vol1/mangadex/One Piece/Chapter 1")),
            PathClass::ChapterDirectory
        );
    }

    #[test]
    fn classifies_shallower_source_paths_as_ancestors() {
        let fs: Arc<dyn FileSystem> = Arc::new(InMemoryFileSystem::new());
        let hooks = hooks(fs);
        assert_eq!(hooks.classify_path(Path::new("/sources/vol1")), PathClass::RootAncestor);
        assert_eq!(hooks.classify_path(Path::new("/sources/vol1/mangadex")), PathClass::RootAncestor);
        assert_eq!(hooks.classify_path(Path::new("/sources/vol1/mangadex/One Piece")), PathClass::RootAncestor);
    }

    #[test]
    fn deep_file_event_resolves_to_its_chapter_ancestor() {
        let fs: Arc<dyn FileSystem> = Arc::new(InMemoryFileSystem::new());
        let hooks = hooks(fs);
        let deep = Path::new("/sources/vol1/mangadex/One Piece/Chapter 1/001.jpg");
        assert_eq!(hooks.classify_path(deep), PathClass::RootAncestor);
        assert_eq!(hooks.enumerate_candidates(deep), vec![PathBuf::from("/sources/vol1/mangadex/One Piece/Chapter 1")]);
    }

    #[test]
    fn override_paths_always_resolve_to_their_title_ancestor() {
        let fs: Arc<dyn FileSystem> = Arc::new(InMemoryFileSystem::new());
        let hooks = hooks(fs);
        let cover = Path::new("/override/vol1/One Piece/cover.jpg");
        assert_eq!(hooks.classify_path(cover), PathClass::RootAncestor);
        assert_eq!(hooks.enumerate_candidates(cover), vec![PathBuf::from("/override/vol1/One Piece")]);
    }

    #[test]
    fn enumerate_source_root_ancestor_walks_down_to_chapters() {
        let fs = InMemoryFileSystem::new();
        fs.add_dir("/sources/vol1/mangadex/One Piece/Chapter 1");
        fs.add_dir("/sources/vol1/mangadex/One Piece/Chapter 2");
        let fs: Arc<dyn FileSystem> = Arc::new(fs);
        let hooks = hooks(fs);
        let mut found = hooks.enumerate_candidates(Path::new("/sources/vol1/mangadex/One Piece"));
        found.sort();
        assert_eq!(
            found,
            vec![
                PathBuf::from("/sources/vol1/mangadex/One Piece/Chapter 1"),
                PathBuf::from("/sources/vol1/mangadex/One Piece/Chapter 2"),
            ]
        );
    }

    #[test]
    fn rescan_collects_chapters_and_override_titles() {
        let fs = InMemoryFileSystem::new();
        fs.add_dir("/sources/vol1/mangadex/One Piece/Chapter 1");
        fs.add_dir("/override/vol1/One Piece");
        let fs: Arc<dyn FileSystem> = Arc::new(fs);
        let hooks = hooks(fs);
        let mut found = hooks.rescan_and_enqueue();
        found.sort();
        assert_eq!(
            found,
            vec![
                PathBuf::from("/override/vol1/One Piece"),
                PathBuf::from("/sources/vol1/mangadex/One Piece/Chapter 1"),
            ]
        );
    }

    #[test]
    fn paths_outside_configured_roots_are_irrelevant() {
        let fs: Arc<dyn FileSystem> = Arc::new(InMemoryFileSystem::new());
        let hooks = hooks(fs);
        assert_eq!(hooks.classify_path(Path::new("/etc/passwd")), PathClass::Irrelevant);
    }
}
