//! Equivalence catalog: mutable runtime alias→canonical resolver backed by `manga_equivalents.yml`,
//! with atomic snapshot swap after a validated reload (spec §4.14).
//!
//! Readers load the current `CatalogSnapshot` through `ArcSwap` without taking a lock —
//! `arc-swap` is a closer fit than `Arc<RwLock<..>>` here since writers are rare (a config
//! reload) and readers are on the hot merge-pass path.

use crate::normalize::normalize_title_key;
use arc_swap::ArcSwap;
use ssm_contracts::FileSystem;
use ssm_model::EquivalentTitleGroup;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct TitleCandidate {
    pub language: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct CatalogUpdateRequest {
    pub candidates: Vec<TitleCandidate>,
    pub preferred_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogUpdateOutcome {
    Updated,
    NoChanges,
    ReloadFailed(String),
    UpdateFailed(String),
    ValidationFailed(String),
    WriteFailed(String),
    Conflict(String),
}

#[derive(Debug, Clone, Default)]
struct CatalogSnapshot {
    groups: Vec<EquivalentTitleGroup>,
    alias_to_canonical: HashMap<String, String>,
}

impl CatalogSnapshot {
    fn build(groups: Vec<EquivalentTitleGroup>) -> Self {
        let mut alias_to_canonical = HashMap::new();
        for group in &groups {
            alias_to_canonical.insert(normalize_title_key(&group.canonical_title), group.canonical_title.clone());
            for alias in &group.aliases {
                alias_to_canonical
                    .entry(normalize_title_key(alias))
                    .or_insert_with(|| group.canonical_title.clone());
            }
        }
        Self { groups, alias_to_canonical }
    }
}

pub struct EquivalenceCatalog {
    path: PathBuf,
    snapshot: ArcSwap<CatalogSnapshot>,
    update_lock: Mutex<()>,
    pending_reload: Mutex<Option<PathBuf>>,
}

impl EquivalenceCatalog {
    /// Loads the initial snapshot from `path`. A missing or unreadable file starts the catalog
    /// empty rather than failing daemon startup — the catalog is an enrichment, not a hard
    /// dependency of the merge pass.
    pub fn load(fs: &dyn FileSystem, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let groups = read_groups(fs, &path).unwrap_or_default();
        Self {
            path,
            snapshot: ArcSwap::from_pointee(CatalogSnapshot::build(groups)),
            update_lock: Mutex::new(()),
            pending_reload: Mutex::new(None),
        }
    }

    pub fn try_resolve_canonical_title(&self, raw: &str) -> Option<String> {
        let key = normalize_title_key(raw);
        self.snapshot.load().alias_to_canonical.get(&key).cloned()
    }

    pub fn resolve_canonical_or_input(&self, raw: &str) -> String {
        self.try_resolve_canonical_title(raw).unwrap_or_else(|| raw.to_string())
    }

    /// All titles (canonical + aliases) in the group `raw` resolves into, or empty if `raw`
    /// matches no group. Used to widen the candidate matcher's expected-title set.
    pub fn equivalent_titles_for(&self, raw: &str) -> Vec<String> {
        let Some(canonical) = self.try_resolve_canonical_title(raw) else {
            return Vec::new();
        };
        let snapshot = self.snapshot.load();
        match snapshot.groups.iter().find(|g| g.canonical_title == canonical) {
            Some(group) => std::iter::once(group.canonical_title.clone()).chain(group.aliases.iter().cloned()).collect(),
            None => Vec::new(),
        }
    }

    /// Applies an update: inserts a new alias into an existing group, or creates a new canonical
    /// group, then persists + re-reads + re-validates + swaps. Concurrent callers serialize on
    /// `update_lock`; readers never block.
    pub fn update(&self, fs: &dyn FileSystem, request: &CatalogUpdateRequest) -> CatalogUpdateOutcome {
        let _guard = self.update_lock.lock().unwrap();

        if request.candidates.is_empty() {
            return CatalogUpdateOutcome::UpdateFailed("no candidate titles supplied".to_string());
        }

        let mut groups = match read_groups(fs, &self.path) {
            Ok(groups) => groups,
            Err(e) => return CatalogUpdateOutcome::ReloadFailed(e),
        };

        let changed = apply_candidates(&mut groups, request);

        if !changed {
            if let Some(pending) = self.pending_reload.lock().unwrap().take() {
                return match self.reload_from(fs, &pending) {
                    Ok(()) => CatalogUpdateOutcome::Updated,
                    Err(e) => CatalogUpdateOutcome::ReloadFailed(e),
                };
            }
            return CatalogUpdateOutcome::NoChanges;
        }

        if let Err(e) = validate_groups(&groups) {
            return CatalogUpdateOutcome::ValidationFailed(e);
        }

        if let Err(e) = write_groups(fs, &self.path, &groups) {
            return CatalogUpdateOutcome::WriteFailed(e);
        }

        match self.reload_from(fs, &self.path.clone()) {
            Ok(()) => CatalogUpdateOutcome::Updated,
            Err(e) => {
                *self.pending_reload.lock().unwrap() = Some(self.path.clone());
                CatalogUpdateOutcome::ReloadFailed(e)
            }
        }
    }

    fn reload_from(&self, fs: &dyn FileSystem, path: &Path) -> Result<(), String> {
        let groups = read_groups(fs, path)?;
        validate_groups(&groups)?;
        self.snapshot.store(Arc::new(CatalogSnapshot::build(groups)));
        Ok(())
    }
}

/// Selects the canonical title for a fresh group: preferred-language exact match, then
/// 2-char-prefix match, then English, then the first candidate (the "main" title).
fn select_canonical(candidates: &[TitleCandidate], preferred_language: Option<&str>) -> String {
    if let Some(pref) = preferred_language {
        if let Some(c) = candidates.iter().find(|c| c.language.as_deref() == Some(pref)) {
            return c.title.clone();
        }
        let prefix: String = pref.chars().take(2).collect();
        if let Some(c) = candidates
            .iter()
            .find(|c| c.language.as_deref().is_some_and(|l| l.starts_with(&prefix)))
        {
            return c.title.clone();
        }
    }
    if let Some(c) = candidates.iter().find(|c| c.language.as_deref() == Some("en")) {
        return c.title.clone();
    }
    candidates[0].title.clone()
}

/// Inserts `request`'s titles into `groups`, idempotently. Returns whether anything changed.
fn apply_candidates(groups: &mut Vec<EquivalentTitleGroup>, request: &CatalogUpdateRequest) -> bool {
    let existing_index = groups.iter().position(|g| {
        request.candidates.iter().any(|c| g.contains_alias(&c.title))
    });

    match existing_index {
        Some(idx) => {
            let group = &mut groups[idx];
            let mut changed = false;
            for candidate in &request.candidates {
                if !group.contains_alias(&candidate.title) {
                    group.aliases.push(candidate.title.clone());
                    changed = true;
                }
            }
            changed
        }
        None => {
            let canonical = select_canonical(&request.candidates, request.preferred_language.as_deref());
            let aliases = request
                .candidates
                .iter()
                .map(|c| c.title.clone())
                .filter(|t| t != &canonical)
                .collect();
            groups.push(EquivalentTitleGroup::new(canonical, aliases));
            true
        }
    }
}

fn validate_groups(groups: &[EquivalentTitleGroup]) -> Result<(), String> {
    for group in groups {
        if group.canonical_title.trim().is_empty() {
            return Err("equivalence group has an empty canonical title".to_string());
        }
    }
    Ok(())
}

fn read_groups(fs: &dyn FileSystem, path: &Path) -> Result<Vec<EquivalentTitleGroup>, String> {
    if !fs.exists(path) {
        return Ok(Vec::new());
    }
    let bytes = fs.read(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let groups: Vec<EquivalentTitleGroup> =
        serde_yaml::from_slice(&bytes).map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
    Ok(groups)
}

fn write_groups(fs: &dyn FileSystem, path: &Path, groups: &[EquivalentTitleGroup]) -> Result<(), String> {
    let yaml = serde_yaml::to_string(groups).map_err(|e| format!("failed to serialize equivalence catalog: {e}"))?;
    if let Some(parent) = path.parent() {
        let _ = fs.create_dir_all(parent);
    }
    fs.write(path, yaml.as_bytes())
        .map_err(|e| format!("failed to write {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_impl::InMemoryFileSystem;

    fn candidate(language: Option<&str>, title: &str) -> TitleCandidate {
        TitleCandidate { language: language.map(str::to_string), title: title.to_string() }
    }

    #[test]
    fn resolves_existing_alias() {
        let fs = InMemoryFileSystem::new();
        fs.write(
            Path::new("/config/manga_equivalents.yml"),
            b"- canonical_title: One Piece\n  aliases:\n  - Wan Pisu\n",
        )
        .unwrap();
        let catalog = EquivalenceCatalog::load(&fs, "/config/manga_equivalents.yml");
        assert_eq!(
            catalog.try_resolve_canonical_title("wan pisu"),
            Some("One Piece".to_string())
        );
    }

    #[test]
    fn unresolved_input_falls_back_to_itself() {
        let fs = InMemoryFileSystem::new();
        let catalog = EquivalenceCatalog::load(&fs, "/config/manga_equivalents.yml");
        assert_eq!(catalog.resolve_canonical_or_input("Unknown Title"), "Unknown Title");
    }

    #[test]
    fn update_creates_new_group_and_persists() {
        let fs = InMemoryFileSystem::new();
        let catalog = EquivalenceCatalog::load(&fs, "/config/manga_equivalents.yml");
        let outcome = catalog.update(
            &fs,
            &CatalogUpdateRequest {
                candidates: vec![candidate(Some("en"), "Chainsaw Man"), candidate(Some("ja"), "Chensoman")],
                preferred_language: Some("en".to_string()),
            },
        );
        assert_eq!(outcome, CatalogUpdateOutcome::Updated);
        assert_eq!(
            catalog.try_resolve_canonical_title("chensoman"),
            Some("Chainsaw Man".to_string())
        );
    }

    #[test]
    fn update_with_no_new_aliases_is_no_changes() {
        let fs = InMemoryFileSystem::new();
        let catalog = EquivalenceCatalog::load(&fs, "/config/manga_equivalents.yml");
        let request = CatalogUpdateRequest {
            candidates: vec![candidate(Some("en"), "Chainsaw Man")],
            preferred_language: Some("en".to_string()),
        };
        assert_eq!(catalog.update(&fs, &request), CatalogUpdateOutcome::Updated);
        assert_eq!(catalog.update(&fs, &request), CatalogUpdateOutcome::NoChanges);
    }
}
