//! Override details service (spec §4.11): produces `details.json` either by copying a source
//! copy, mapping a matched Comick payload (with lazy ComicInfo.xml per-field fallback), or
//! mapping a discovered ComicInfo.xml directly when no Comick match exists.

use super::comicinfo::{parse_comicinfo_xml, ComicInfoDocument};
use ssm_contracts::FileSystem;
use ssm_model::ComickComicResponse;
use std::path::{Path, PathBuf};

const DETAILS_FILE_NAME: &str = "details.json";
const COMICINFO_FILE_NAME: &str = "ComicInfo.xml";
const FAST_PATH_DEPTH: usize = 2;
const SLOW_PATH_MAX_DEPTH: usize = 6;
const SLOW_PATH_MAX_CANDIDATES_PER_SOURCE: usize = 30;

const STATUS_VALUES: [&str; 4] = ["0 = Unknown", "1 = Ongoing", "2 = Completed", "3 = Licensed"];

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DetailsDocument {
    pub title: String,
    pub author: String,
    pub artist: String,
    pub description: String,
    pub genre: Vec<String>,
    pub status: String,
    #[serde(rename = "_status values")]
    pub status_values: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum DetailsOutcome {
    AlreadyExists(PathBuf),
    CopiedFromSource(PathBuf),
    GeneratedFromComick { path: PathBuf, comic_info_xml_path: Option<PathBuf> },
    GeneratedFromComicInfo { path: PathBuf, comic_info_xml_path: PathBuf },
    SkippedParseFailure,
    SkippedNoComicInfo,
    WriteFailed(String),
}

pub struct EnsureDetailsJsonRequest<'a> {
    pub preferred_dir: &'a Path,
    pub all_override_dirs: &'a [PathBuf],
    pub ordered_source_dirs: &'a [PathBuf],
    pub matched_comick: Option<&'a ComickComicResponse>,
}

pub fn ensure_details_json(fs: &dyn FileSystem, request: &EnsureDetailsJsonRequest<'_>) -> DetailsOutcome {
    for dir in std::iter::once(request.preferred_dir).chain(request.all_override_dirs.iter().map(PathBuf::as_path)) {
        let candidate = dir.join(DETAILS_FILE_NAME);
        if fs.exists(&candidate) {
            return DetailsOutcome::AlreadyExists(candidate);
        }
    }

    if let Err(e) = fs.create_dir_all(request.preferred_dir) {
        return DetailsOutcome::WriteFailed(format!("I/O: failed creating {}: {e}", request.preferred_dir.display()));
    }

    for source_dir in request.ordered_source_dirs {
        let source_candidate = source_dir.join(DETAILS_FILE_NAME);
        if !fs.exists(&source_candidate) {
            continue;
        }
        return match fs.read(&source_candidate) {
            Ok(bytes) => copy_to_preferred(fs, request.preferred_dir, &bytes),
            Err(e) => DetailsOutcome::WriteFailed(format!("I/O: failed reading {}: {e}", source_candidate.display())),
        };
    }

    if let Some(comick) = request.matched_comick {
        return generate_from_comick(fs, request.preferred_dir, comick, request.ordered_source_dirs);
    }

    generate_from_discovered_comicinfo(fs, request.preferred_dir, request.ordered_source_dirs)
}

fn copy_to_preferred(fs: &dyn FileSystem, preferred_dir: &Path, bytes: &[u8]) -> DetailsOutcome {
    match write_atomically(fs, preferred_dir, bytes) {
        Ok(path) => DetailsOutcome::CopiedFromSource(path),
        Err(AtomicWriteError::AlreadyExists) => DetailsOutcome::AlreadyExists(preferred_dir.join(DETAILS_FILE_NAME)),
        Err(AtomicWriteError::Io(e)) => DetailsOutcome::WriteFailed(e),
    }
}

fn generate_from_comick(
    fs: &dyn FileSystem,
    preferred_dir: &Path,
    comick: &ComickComicResponse,
    ordered_source_dirs: &[PathBuf],
) -> DetailsOutcome {
    let mut fallback_resolution: Option<Option<ComicInfoDocument>> = None;
    let mut fallback_path: Option<PathBuf> = None;
    let mut used_fallback = false;

    let mut resolve_fallback = |fs: &dyn FileSystem| -> Option<ComicInfoDocument> {
        if fallback_resolution.is_none() {
            let (doc, path) = resolve_first_comicinfo(fs, ordered_source_dirs);
            fallback_path = path;
            fallback_resolution = Some(doc);
        }
        fallback_resolution.clone().unwrap()
    };

    let distinct_authors = comick.distinct_authors();
    let author = if !distinct_authors.is_empty() {
        distinct_authors.join(", ")
    } else if let Some(writer) = resolve_fallback(fs).and_then(|d| d.writer) {
        used_fallback = true;
        writer
    } else {
        String::new()
    };

    let distinct_artists = comick.distinct_artists();
    let artist = if !distinct_artists.is_empty() {
        distinct_artists.join(", ")
    } else if let Some(penciller) = resolve_fallback(fs).and_then(|d| d.penciller) {
        used_fallback = true;
        penciller
    } else {
        String::new()
    };

    let description_body = if let Some(desc) = comick.description.as_ref().filter(|d| !d.is_empty()) {
        desc.clone()
    } else if let Some(html) = comick.description_html.as_ref().filter(|d| !d.is_empty()) {
        normalize_description_html(html)
    } else if let Some(summary) = resolve_fallback(fs).and_then(|d| d.summary) {
        used_fallback = true;
        summary
    } else {
        String::new()
    };
    let description = append_titles_block(&description_body, comick);

    let genre = union_genres(comick);

    let status = match comick.status() {
        ssm_model::ComickStatus::Unknown => {
            if let Some(status) = resolve_fallback(fs).and_then(|d| d.status) {
                used_fallback = true;
                status_from_keyword(&status)
            } else {
                "0".to_string()
            }
        }
        other => other.as_details_code().to_string(),
    };

    let document = DetailsDocument {
        title: comick.title.clone(),
        author,
        artist,
        description,
        genre,
        status,
        status_values: STATUS_VALUES.iter().map(|s| s.to_string()).collect(),
    };

    match write_document(fs, preferred_dir, &document) {
        Ok(path) => DetailsOutcome::GeneratedFromComick {
            path,
            comic_info_xml_path: if used_fallback { fallback_path } else { None },
        },
        Err(AtomicWriteError::AlreadyExists) => DetailsOutcome::AlreadyExists(preferred_dir.join(DETAILS_FILE_NAME)),
        Err(AtomicWriteError::Io(e)) => DetailsOutcome::WriteFailed(e),
    }
}

fn status_from_keyword(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    if ["ongoing", "publishing", "serialization"].iter().any(|k| lower.contains(k)) {
        "1".to_string()
    } else if ["completed", "complete", "finished", "ended"].iter().any(|k| lower.contains(k)) {
        "2".to_string()
    } else if lower.contains("licensed") {
        "3".to_string()
    } else {
        "0".to_string()
    }
}

fn union_genres(comick: &ComickComicResponse) -> Vec<String> {
    let mut out = comick.genre_names();
    for vote in &comick.mu_categories {
        if vote.is_positive() && !out.contains(&vote.name) {
            out.push(vote.name.clone());
        }
    }
    out
}

fn append_titles_block(description: &str, comick: &ComickComicResponse) -> String {
    let mut lines: Vec<String> = Vec::new();
    let main_language = comick.iso639_1.clone().unwrap_or_else(|| "unknown".to_string());
    lines.push(format!("[{main_language}] {}", comick.title));
    for alt in &comick.titles {
        let language = alt.language.clone().unwrap_or_else(|| "unknown".to_string());
        lines.push(format!("[{language}] {}", alt.title));
    }

    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();
    for line in lines {
        if seen.insert(line.clone()) {
            deduped.push(line);
        }
    }

    let mut out = description.to_string();
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str("Titles:\n");
    for line in deduped {
        out.push_str("- ");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Converts Comick's stored HTML description to plain text: `<br>` → newline, `</p>` → blank
/// line, remaining tags stripped, entities decoded.
fn normalize_description_html(html: &str) -> String {
    use htmlentity::entity::ICodedDataTrait;

    let with_breaks = html
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n\n");

    let mut out = String::with_capacity(with_breaks.len());
    let mut in_tag = false;
    for ch in with_breaks.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    htmlentity::entity::decode(out.as_bytes()).to_string()
}

fn resolve_first_comicinfo(fs: &dyn FileSystem, ordered_source_dirs: &[PathBuf]) -> (Option<ComicInfoDocument>, Option<PathBuf>) {
    let candidates = discover_candidates(fs, ordered_source_dirs);
    for candidate in candidates {
        if let Ok(bytes) = fs.read(&candidate) {
            let text = String::from_utf8_lossy(&bytes);
            if let Some(doc) = parse_comicinfo_xml(&text) {
                return (Some(doc), Some(candidate));
            }
        }
    }
    (None, None)
}

fn generate_from_discovered_comicinfo(fs: &dyn FileSystem, preferred_dir: &Path, ordered_source_dirs: &[PathBuf]) -> DetailsOutcome {
    let candidates = discover_candidates(fs, ordered_source_dirs);
    if candidates.is_empty() {
        return DetailsOutcome::SkippedNoComicInfo;
    }

    for candidate in &candidates {
        let Ok(bytes) = fs.read(candidate) else { continue };
        let text = String::from_utf8_lossy(&bytes);
        let Some(doc) = parse_comicinfo_xml(&text) else { continue };

        let document = DetailsDocument {
            title: doc.series.clone().unwrap_or_default(),
            author: doc.writer.clone().unwrap_or_default(),
            artist: doc.penciller.clone().unwrap_or_default(),
            description: doc.summary.clone().unwrap_or_default(),
            genre: doc.genre.clone().map(|g| vec![g]).unwrap_or_default(),
            status: doc.status.clone().map(|s| status_from_keyword(&s)).unwrap_or_else(|| "0".to_string()),
            status_values: STATUS_VALUES.iter().map(|s| s.to_string()).collect(),
        };

        return match write_document(fs, preferred_dir, &document) {
            Ok(path) => DetailsOutcome::GeneratedFromComicInfo { path, comic_info_xml_path: candidate.clone() },
            Err(AtomicWriteError::AlreadyExists) => DetailsOutcome::AlreadyExists(preferred_dir.join(DETAILS_FILE_NAME)),
            Err(AtomicWriteError::Io(e)) => DetailsOutcome::WriteFailed(e),
        };
    }

    DetailsOutcome::SkippedParseFailure
}

/// Fast path: one candidate per source at chapter depth (2), lexicographically smallest. Slow
/// path: full depth-range discovery up to depth 6, up to 30 candidates per source, deduped
/// against the fast-path set.
fn discover_candidates(fs: &dyn FileSystem, ordered_source_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut ordered = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for source_dir in ordered_source_dirs {
        if let Some(fast) = find_smallest_at_depth(fs, source_dir, FAST_PATH_DEPTH) {
            if seen.insert(fast.clone()) {
                ordered.push(fast);
            }
        }
    }

    for source_dir in ordered_source_dirs {
        let mut found = Vec::new();
        walk_depth_range(fs, source_dir, 1, SLOW_PATH_MAX_DEPTH, &mut found);
        found.sort();
        for candidate in found.into_iter().take(SLOW_PATH_MAX_CANDIDATES_PER_SOURCE) {
            if seen.insert(candidate.clone()) {
                ordered.push(candidate);
            }
        }
    }

    ordered
}

fn find_smallest_at_depth(fs: &dyn FileSystem, root: &Path, depth: usize) -> Option<PathBuf> {
    let mut frontier = vec![root.to_path_buf()];
    for _ in 0..depth.saturating_sub(1) {
        let mut next = Vec::new();
        for dir in &frontier {
            if let Ok(children) = fs.read_dir(dir) {
                next.extend(children.into_iter().filter(|c| fs.is_dir(c)));
            }
        }
        next.sort();
        frontier = next;
    }

    let mut smallest: Option<PathBuf> = None;
    for dir in &frontier {
        let candidate = dir.join(COMICINFO_FILE_NAME);
        if fs.exists(&candidate) && smallest.as_ref().is_none_or(|s| candidate < *s) {
            smallest = Some(candidate);
        }
    }
    smallest
}

fn walk_depth_range(fs: &dyn FileSystem, dir: &Path, remaining_min: usize, remaining_max: usize, out: &mut Vec<PathBuf>) {
    if remaining_max == 0 {
        return;
    }
    if remaining_min == 0 {
        let candidate = dir.join(COMICINFO_FILE_NAME);
        if fs.exists(&candidate) {
            out.push(candidate);
        }
    }
    if let Ok(children) = fs.read_dir(dir) {
        let mut dirs: Vec<PathBuf> = children.into_iter().filter(|c| fs.is_dir(c)).collect();
        dirs.sort();
        for child in dirs {
            walk_depth_range(fs, &child, remaining_min.saturating_sub(1), remaining_max - 1, out);
        }
    }
}

enum AtomicWriteError {
    AlreadyExists,
    Io(String),
}

fn write_atomically(fs: &dyn FileSystem, preferred_dir: &Path, bytes: &[u8]) -> Result<PathBuf, AtomicWriteError> {
    let tmp_path = preferred_dir.join(format!(".{DETAILS_FILE_NAME}.tmp"));
    let final_path = preferred_dir.join(DETAILS_FILE_NAME);

    fs.write(&tmp_path, bytes).map_err(|e| AtomicWriteError::Io(e.to_string()))?;
    match fs.rename_non_overwriting(&tmp_path, &final_path) {
        Ok(()) => Ok(final_path),
        Err(_) if fs.exists(&final_path) => {
            let _ = fs.remove_file(&tmp_path);
            Err(AtomicWriteError::AlreadyExists)
        }
        Err(e) => {
            let _ = fs.remove_file(&tmp_path);
            Err(AtomicWriteError::Io(e.to_string()))
        }
    }
}

fn write_document(fs: &dyn FileSystem, preferred_dir: &Path, document: &DetailsDocument) -> Result<PathBuf, AtomicWriteError> {
    let json = serde_json::to_vec_pretty(document).map_err(|e| AtomicWriteError::Io(e.to_string()))?;
    write_atomically(fs, preferred_dir, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_impl::InMemoryFileSystem;
    use ssm_model::{ComickAltTitle, MuCategoryVote};

    fn comick(title: &str) -> ComickComicResponse {
        ComickComicResponse {
            title: title.to_string(),
            titles: vec![ComickAltTitle { title: "Alt".to_string(), language: Some("ja".to_string()) }],
            description: Some("A pirate story.".to_string()),
            description_html: None,
            status: 1,
            iso639_1: Some("en".to_string()),
            genres: vec![Some("Action".to_string())],
            mu_categories: vec![MuCategoryVote { name: "Adventure".to_string(), positive_vote: Some(5), negative_vote: Some(1) }],
            authors: vec![Some("Author".to_string())],
            artists: Vec::new(),
            cover: Vec::new(),
        }
    }

    #[test]
    fn already_exists_short_circuits() {
        let fs = InMemoryFileSystem::new();
        fs.add_dir(Path::new("/merged/One Piece"));
        fs.add_file(Path::new("/merged/One Piece/details.json"), b"{}".to_vec());
        let request = EnsureDetailsJsonRequest {
            preferred_dir: Path::new("/merged/One Piece"),
            all_override_dirs: &[],
            ordered_source_dirs: &[],
            matched_comick: None,
        };
        assert!(matches!(ensure_details_json(&fs, &request), DetailsOutcome::AlreadyExists(_)));
    }

    #[test]
    fn generates_from_comick_with_fallback_penciller() {
        let fs = InMemoryFileSystem::new();
        fs.add_dir(Path::new("/merged/One Piece"));
        fs.add_dir(Path::new("/sources/vol1/One Piece/Chapter 1"));
        fs.add_file(
            Path::new("/sources/vol1/One Piece/Chapter 1/ComicInfo.xml"),
            br#"<ComicInfo><Penciller>Fallback Artist</Penciller></ComicInfo>"#.to_vec(),
        );
        let mut comic = comick("One Piece");
        comic.artists = Vec::new();
        let request = EnsureDetailsJsonRequest {
            preferred_dir: Path::new("/merged/One Piece"),
            all_override_dirs: &[],
            ordered_source_dirs: &[PathBuf::from("/sources/vol1/One Piece")],
            matched_comick: Some(&comic),
        };
        match ensure_details_json(&fs, &request) {
            DetailsOutcome::GeneratedFromComick { comic_info_xml_path, .. } => assert!(comic_info_xml_path.is_some()),
            other => panic!("unexpected: {other:?}"),
        }
        let bytes = fs.read(Path::new("/merged/One Piece/details.json")).unwrap();
        let doc: DetailsDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc.artist, "Fallback Artist");
        assert_eq!(doc.author, "Author");
        assert_eq!(doc.status, "1");
    }

    #[test]
    fn no_comicinfo_discovered_is_skipped() {
        let fs = InMemoryFileSystem::new();
        fs.add_dir(Path::new("/merged/One Piece"));
        let request = EnsureDetailsJsonRequest {
            preferred_dir: Path::new("/merged/One Piece"),
            all_override_dirs: &[],
            ordered_source_dirs: &[PathBuf::from("/sources/vol1/One Piece")],
            matched_comick: None,
        };
        assert!(matches!(ensure_details_json(&fs, &request), DetailsOutcome::SkippedNoComicInfo));
    }
}
