use serde::{Deserialize, Serialize};

/// `{title, language?}` alias pair as returned by both search candidates and comic detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComickAltTitle {
    pub title: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComickCover {
    #[serde(rename = "b2key")]
    pub b2_key: String,
}

/// One hit from `GET /v1.0/search/?q=...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComickSearchCandidate {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub titles: Vec<ComickAltTitle>,
    #[serde(default)]
    pub cover: Vec<ComickCover>,
}

impl ComickSearchCandidate {
    /// All titles this candidate could plausibly be matched against: the main title plus every
    /// alias, in order. Used by both the ranking hint and the post-detail match check.
    pub fn all_titles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str()).chain(self.titles.iter().map(|t| t.title.as_str()))
    }

    pub fn first_cover_b2_key(&self) -> Option<&str> {
        self.cover
            .iter()
            .map(|c| c.b2_key.as_str())
            .find(|k| !k.is_empty())
    }
}

/// MangaUpdates category crosswalk vote, tolerant of null vote fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuCategoryVote {
    pub name: String,
    #[serde(default)]
    pub positive_vote: Option<i64>,
    #[serde(default)]
    pub negative_vote: Option<i64>,
}

impl MuCategoryVote {
    /// A category counts as a genre only when both vote fields are present and positive wins.
    pub fn is_positive(&self) -> bool {
        matches!((self.positive_vote, self.negative_vote), (Some(p), Some(n)) if p > n)
    }
}

/// Publication status as returned by the API. `Unknown` covers any value outside 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComickStatus {
    Ongoing,
    Completed,
    Licensed,
    Unknown,
}

impl ComickStatus {
    pub fn from_api_int(value: i32) -> Self {
        match value {
            1 => ComickStatus::Ongoing,
            2 => ComickStatus::Completed,
            3 => ComickStatus::Licensed,
            _ => ComickStatus::Unknown,
        }
    }

    /// The decimal-string encoding used in `details.json`'s `status` field.
    pub fn as_details_code(&self) -> &'static str {
        match self {
            ComickStatus::Unknown => "0",
            ComickStatus::Ongoing => "1",
            ComickStatus::Completed => "2",
            ComickStatus::Licensed => "3",
        }
    }
}

/// `GET /comic/<slug>` response, trimmed to the fields the details pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComickComicResponse {
    pub title: String,
    #[serde(default)]
    pub titles: Vec<ComickAltTitle>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub description_html: Option<String>,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub iso639_1: Option<String>,
    #[serde(default)]
    pub genres: Vec<Option<String>>,
    #[serde(default)]
    pub mu_categories: Vec<MuCategoryVote>,
    #[serde(default)]
    pub authors: Vec<Option<String>>,
    #[serde(default)]
    pub artists: Vec<Option<String>>,
    #[serde(default)]
    pub cover: Vec<ComickCover>,
}

impl ComickComicResponse {
    pub fn status(&self) -> ComickStatus {
        ComickStatus::from_api_int(self.status)
    }

    pub fn distinct_authors(&self) -> Vec<String> {
        distinct_non_empty(&self.authors)
    }

    pub fn distinct_artists(&self) -> Vec<String> {
        distinct_non_empty(&self.artists)
    }

    pub fn first_cover_b2_key(&self) -> Option<&str> {
        self.cover
            .iter()
            .map(|c| c.b2_key.as_str())
            .find(|k| !k.is_empty())
    }

    pub fn genre_names(&self) -> Vec<String> {
        self.genres.iter().flatten().cloned().collect()
    }
}

fn distinct_non_empty(values: &[Option<String>]) -> Vec<String> {
    let mut out = Vec::new();
    for value in values.iter().flatten() {
        if !value.is_empty() && !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}
