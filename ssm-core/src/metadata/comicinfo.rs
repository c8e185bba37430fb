//! ComicInfo.xml parser (spec §4.12): strict XML first, tolerant line-scanner fallback second.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComicInfoDocument {
    pub series: Option<String>,
    pub writer: Option<String>,
    pub penciller: Option<String>,
    pub summary: Option<String>,
    pub genre: Option<String>,
    pub status: Option<String>,
    /// Raw `<PublishingStatusTachiyomi>` text, folded into `status` when `Status` is absent or
    /// empty; never read by callers directly.
    publishing_status_tachiyomi: Option<String>,
}

impl ComicInfoDocument {
    fn is_empty(&self) -> bool {
        self.series.is_none()
            && self.writer.is_none()
            && self.penciller.is_none()
            && self.summary.is_none()
            && self.genre.is_none()
            && self.status.is_empty_or_none()
    }
}

trait EmptyOrNone {
    fn is_empty_or_none(&self) -> bool;
}

impl EmptyOrNone for Option<String> {
    fn is_empty_or_none(&self) -> bool {
        self.as_deref().is_none_or(str::is_empty)
    }
}

const TRACKED_TAGS: &[&str] =
    &["series", "writer", "penciller", "summary", "genre", "status", "publishingstatustachiyomi"];

pub fn parse_comicinfo_xml(raw: &str) -> Option<ComicInfoDocument> {
    match parse_strict(raw) {
        Some(doc) => Some(doc),
        None => parse_tolerant(raw),
    }
}

fn parse_strict(raw: &str) -> Option<ComicInfoDocument> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(false);

    let mut doc = ComicInfoDocument::default();
    let mut current_tag: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = local_name_lower(e.name().as_ref());
                current_tag = TRACKED_TAGS.iter().find(|t| **t == local).copied();
            }
            Ok(Event::Text(e)) => {
                if let Some(tag) = current_tag {
                    let text = e.unescape().ok()?.into_owned();
                    assign_if_absent(&mut doc, tag, text);
                }
            }
            Ok(Event::End(_)) => current_tag = None,
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }

    if doc.status.is_empty_or_none() {
        doc.status = doc.status_from_publishing_status_tachiyomi();
    }

    if doc.is_empty() { None } else { Some(doc) }
}

impl ComicInfoDocument {
    /// `PublishingStatusTachiyomi` is an alternate status field some scrapers populate instead of
    /// the canonical `Status` element; only consulted when `Status` itself is absent or empty.
    fn status_from_publishing_status_tachiyomi(&self) -> Option<String> {
        self.publishing_status_tachiyomi.clone().filter(|s| !s.is_empty())
    }
}

fn assign_if_absent(doc: &mut ComicInfoDocument, tag: &str, text: String) {
    let slot = match tag {
        "series" => &mut doc.series,
        "writer" => &mut doc.writer,
        "penciller" => &mut doc.penciller,
        "summary" => {
            let existing = doc.summary.get_or_insert_with(String::new);
            existing.push_str(&text);
            return;
        }
        "genre" => &mut doc.genre,
        "status" => &mut doc.status,
        "publishingstatustachiyomi" => &mut doc.publishing_status_tachiyomi,
        _ => return,
    };
    if slot.is_none() {
        *slot = Some(text);
    }
}

fn local_name_lower(qname: &[u8]) -> String {
    let name = std::str::from_utf8(qname).unwrap_or("");
    let local = name.rsplit(':').next().unwrap_or(name);
    local.to_ascii_lowercase()
}

/// Line-by-line scan tolerant of malformed XML: skips CR, reads first occurrence of each scalar
/// tag (even with a missing closing tag, taking content to end of line), accumulates `Summary`
/// across lines until its closing tag or EOF.
fn parse_tolerant(raw: &str) -> Option<ComicInfoDocument> {
    let mut doc = ComicInfoDocument::default();
    let mut in_summary = false;
    let mut found_any = false;

    for raw_line in raw.split('\n') {
        let line = raw_line.trim_end_matches('\r');

        if in_summary {
            if let Some(end) = find_closing_tag(line, "summary") {
                let existing = doc.summary.get_or_insert_with(String::new);
                existing.push_str(&decode_entities(&line[..end]));
                in_summary = false;
            } else {
                let existing = doc.summary.get_or_insert_with(String::new);
                existing.push_str(&decode_entities(line));
                existing.push('\n');
            }
            continue;
        }

        for tag in TRACKED_TAGS {
            if let Some(content) = extract_tag_content(line, tag) {
                found_any = true;
                if *tag == "summary" {
                    let existing = doc.summary.get_or_insert_with(String::new);
                    existing.push_str(&decode_entities(&content));
                    if find_closing_tag(line, "summary").is_none() {
                        in_summary = true;
                        existing.push('\n');
                    }
                } else {
                    assign_if_absent(&mut doc, tag, decode_entities(&content));
                }
                break;
            }
        }
    }

    if doc.status.is_empty_or_none() {
        doc.status = doc.status_from_publishing_status_tachiyomi();
    }

    if !found_any {
        return None;
    }
    Some(doc)
}

fn extract_tag_content(line: &str, tag: &str) -> Option<String> {
    let open_lower = line.to_ascii_lowercase();
    let open_tag_start = open_lower.find(&format!("<{tag}"))?;
    let after_open = open_lower[open_tag_start..].find('>')? + open_tag_start + 1;

    if let Some(close_offset) = find_closing_tag(&line[after_open..], tag) {
        Some(line[after_open..after_open + close_offset].to_string())
    } else {
        Some(line[after_open..].to_string())
    }
}

fn find_closing_tag(line: &str, tag: &str) -> Option<usize> {
    let lower = line.to_ascii_lowercase();
    lower.find(&format!("</{tag}>"))
}

fn decode_entities(raw: &str) -> String {
    use htmlentity::entity::ICodedDataTrait;
    htmlentity::entity::decode(raw.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_parse_reads_tracked_fields_case_insensitively() {
        let xml = r#"<ComicInfo><Series>One Piece</Series><WRITER>Eiichiro Oda</WRITER><Status>1</Status></ComicInfo>"#;
        let doc = parse_comicinfo_xml(xml).unwrap();
        assert_eq!(doc.series.as_deref(), Some("One Piece"));
        assert_eq!(doc.writer.as_deref(), Some("Eiichiro Oda"));
        assert_eq!(doc.status.as_deref(), Some("1"));
    }

    #[test]
    fn tolerant_fallback_handles_unclosed_tag_to_end_of_line() {
        let raw = "<Series>One Piece\n<Genre>Action</Genre>";
        let doc = parse_comicinfo_xml(raw).unwrap();
        assert_eq!(doc.series.as_deref(), Some("One Piece"));
        assert_eq!(doc.genre.as_deref(), Some("Action"));
    }

    #[test]
    fn tolerant_fallback_accumulates_multiline_summary() {
        let raw = "<Summary>Line one\nLine two</Summary>";
        let doc = parse_comicinfo_xml(raw).unwrap();
        assert_eq!(doc.summary.as_deref(), Some("Line one\nLine two"));
    }

    #[test]
    fn no_supported_tags_returns_none() {
        assert!(parse_comicinfo_xml("<Unrelated>value</Unrelated>").is_none());
    }

    #[test]
    fn strict_parse_falls_back_to_tachiyomi_status_when_status_empty() {
        let xml = r#"<ComicInfo><Series>One Piece</Series><Status></Status><PublishingStatusTachiyomi>Ongoing</PublishingStatusTachiyomi></ComicInfo>"#;
        let doc = parse_comicinfo_xml(xml).unwrap();
        assert_eq!(doc.status.as_deref(), Some("Ongoing"));
    }

    #[test]
    fn strict_parse_prefers_status_over_tachiyomi_when_both_present() {
        let xml = r#"<ComicInfo><Status>Completed</Status><PublishingStatusTachiyomi>Ongoing</PublishingStatusTachiyomi></ComicInfo>"#;
        let doc = parse_comicinfo_xml(xml).unwrap();
        assert_eq!(doc.status.as_deref(), Some("Completed"));
    }

    #[test]
    fn tolerant_fallback_reads_tachiyomi_status() {
        let raw = "<Series>One Piece\n<PublishingStatusTachiyomi>Ongoing</PublishingStatusTachiyomi>";
        let doc = parse_comicinfo_xml(raw).unwrap();
        assert_eq!(doc.status.as_deref(), Some("Ongoing"));
    }
}
