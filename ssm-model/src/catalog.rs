/// One canonical title plus its known aliases, as stored in `manga_equivalents.yml`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EquivalentTitleGroup {
    pub canonical_title: String,
    pub aliases: Vec<String>,
}

impl EquivalentTitleGroup {
    pub fn new(canonical_title: impl Into<String>, aliases: Vec<String>) -> Self {
        Self {
            canonical_title: canonical_title.into(),
            aliases,
        }
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.aliases.iter().any(|a| a.eq_ignore_ascii_case(alias))
            || self.canonical_title.eq_ignore_ascii_case(alias)
    }
}
