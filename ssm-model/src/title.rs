use crate::error::{ModelError, Result};
use std::path::PathBuf;

/// One source-root contribution to a title group: `<sourcesRoot>/<volume>/<sourceName>/<title>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceBranch {
    pub source_name: String,
    pub source_path: PathBuf,
}

impl SourceBranch {
    pub fn new(source_name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_name: source_name.into(),
            source_path: source_path.into(),
        }
    }
}

/// A canonical title merged from one or more source volumes, plus optional override-only
/// presence. Built fresh every merge pass; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleGroup {
    pub canonical_title: String,
    group_key: String,
    pub source_branches: Vec<SourceBranch>,
}

impl TitleGroup {
    /// `group_key` must already be normalized and non-empty — callers are expected to have run
    /// it through `ssm_core::normalize::normalize_title_key` (falling back to the deterministic
    /// `canonical|raw` hash) before constructing a group. This constructor only enforces the
    /// invariant, it does not perform normalization itself, so the model crate stays free of a
    /// hashing dependency.
    pub fn new(
        canonical_title: impl Into<String>,
        group_key: impl Into<String>,
        source_branches: Vec<SourceBranch>,
    ) -> Result<Self> {
        let group_key = group_key.into();
        if group_key.trim().is_empty() {
            return Err(ModelError::InvalidTitleGroup(
                "group key must not be empty".into(),
            ));
        }
        Ok(Self {
            canonical_title: canonical_title.into(),
            group_key,
            source_branches,
        })
    }

    pub fn group_key(&self) -> &str {
        &self.group_key
    }

    /// An override-only title is a group with no source-volume contributions at all.
    pub fn is_override_only(&self) -> bool {
        self.source_branches.is_empty()
    }
}
