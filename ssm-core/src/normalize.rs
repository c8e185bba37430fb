//! Path and title normalization primitives. Pure, dependency-light functions with no I/O.
//!
//! Grounded in the tokenizing/case-folding shape of `filename_parser.rs`'s title cleaners,
//! adapted from video-release semantics to manga-title semantics.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// A configured set of trailing scene/release tags to strip from raw titles, loaded from
/// `scene_tags.yml` by `ssm-config`. Kept here as a thin borrow-only view so `ssm-core` does not
/// need to depend on the config crate's concrete struct.
pub trait TagSet {
    fn contains(&self, tag: &str) -> bool;
}

impl TagSet for [String] {
    fn contains(&self, tag: &str) -> bool {
        self.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

impl<T: AsRef<str>> TagSet for Vec<T> {
    fn contains(&self, tag: &str) -> bool {
        self.iter().any(|t| t.as_ref().eq_ignore_ascii_case(tag))
    }
}

/// Normalizes a raw title into a group/comparison key: NFKD-decompose, strip combining marks,
/// lowercase, collapse whitespace/punctuation runs to single spaces, trim. Never returns an
/// empty string for non-empty input that contains at least one alphanumeric grapheme; when
/// normalization collapses to nothing, falls back to a deterministic hash so group keys are
/// never empty.
pub fn normalize_title_key(raw: &str) -> String {
    let decomposed: String = raw.nfkd().filter(|c| !is_combining_mark(*c)).collect();

    let mut out = String::with_capacity(decomposed.len());
    let mut last_was_space = false;
    for ch in decomposed.chars() {
        if ch.is_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    let key = out.trim().to_string();

    if key.is_empty() {
        fallback_key(raw)
    } else {
        key
    }
}

/// Deterministic fallback for a title that normalizes to nothing (e.g. all-symbol names).
/// `canonical|raw` hashed with SHA-256, first 16 hex chars, so repeated calls with the same
/// input are stable across process restarts.
pub fn fallback_key(raw: &str) -> String {
    hash_hex_prefix(&format!("|{raw}"), 16)
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Strips a trailing bracketed/parenthesized scene-tag suffix (`"Title [Scanlator]"`,
/// `"Title (Digital)"`) when the bracketed token matches a configured tag. Returns the
/// stripped title plus whether a tag was actually removed, so callers can surface the
/// "tagged-only title" operator warning when stripping leaves nothing behind.
pub fn strip_scene_tags(raw: &str, tags: &dyn TagSet) -> (String, bool) {
    let trimmed = raw.trim_end();
    let (open, close) = match (trimmed.rfind(['[', '(']), trimmed.rfind([']', ')'])) {
        (Some(o), Some(c)) if c > o && c == trimmed.len() - 1 => (o, c),
        _ => return (trimmed.to_string(), false),
    };

    let inner = &trimmed[open + 1..close];
    if inner.trim().is_empty() || !tags.contains(inner.trim()) {
        return (trimmed.to_string(), false);
    }

    let stripped = trimmed[..open].trim_end().to_string();
    (stripped, true)
}

/// Escapes filesystem-reserved characters (`/`, NUL, and the other POSIX path separator) so a
/// canonical title is always safe as a single path component. Uses percent-style escapes rather
/// than silent substitution so the mapping is reversible and collision-free across inputs.
pub fn escape_reserved_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '/' => out.push_str("%2F"),
            '\0' => out.push_str("%00"),
            '%' => out.push_str("%25"),
            _ => out.push(ch),
        }
    }
    out
}

const MAX_COMPONENT_BYTES: usize = 255;

/// Branch-link directory-entry sanitizer. Non-`[A-Za-z0-9_]` bytes become `_`; an empty result
/// becomes `x`; the sanitized label plus a 4-digit zero-padded index must fit in 255 bytes, or
/// the label is truncated and suffixed with a deterministic SHA-256-derived disambiguator so two
/// labels sharing a long common prefix still produce distinct, stable names.
pub fn sanitize_label(label: &str, index: u32) -> String {
    let mut sanitized = String::with_capacity(label.len());
    for byte in label.bytes() {
        let ch = byte as char;
        if ch.is_ascii_alphanumeric() || ch == '_' {
            sanitized.push(ch);
        } else {
            sanitized.push('_');
        }
    }
    if sanitized.is_empty() {
        sanitized.push('x');
    }

    let suffix = format!("_{index:04}");
    if sanitized.len() + suffix.len() <= MAX_COMPONENT_BYTES {
        return format!("{sanitized}{suffix}");
    }

    let disambiguator = hash_hex_prefix(label, 12);
    let budget = MAX_COMPONENT_BYTES
        .saturating_sub(suffix.len())
        .saturating_sub(1 + disambiguator.len());
    let prefix = truncate_at_char_boundary(&sanitized, budget);
    format!("{prefix}_{disambiguator}{suffix}")
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// First `len` hex chars of SHA-256(`input`); used for group-id suffixes, desired-identity
/// tokens, and sanitizer collision guards.
pub fn hash_hex_prefix(input: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    hex[..len.min(hex.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_diacritics() {
        assert_eq!(normalize_title_key("Café  Story!!"), "cafe story");
    }

    #[test]
    fn empty_normalization_falls_back_to_hash() {
        let key = normalize_title_key("???");
        assert_eq!(key.len(), 16);
        assert_eq!(key, normalize_title_key("???"));
    }

    #[test]
    fn strips_configured_scene_tag() {
        let tags = vec!["Digital".to_string()];
        let (title, stripped) = strip_scene_tags("One Piece (Digital)", &tags);
        assert_eq!(title, "One Piece");
        assert!(stripped);
    }

    #[test]
    fn leaves_unconfigured_bracket_alone() {
        let tags: Vec<String> = vec![];
        let (title, stripped) = strip_scene_tags("One Piece (2023)", &tags);
        assert_eq!(title, "One Piece (2023)");
        assert!(!stripped);
    }

    #[test]
    fn escapes_reserved_segment() {
        assert_eq!(escape_reserved_segment("A/B"), "A%2FB");
    }

    #[test]
    fn sanitize_label_handles_empty() {
        assert_eq!(sanitize_label("", 0), "x_0000");
    }

    #[test]
    fn sanitize_label_is_deterministic_and_disambiguates_long_shared_prefixes() {
        let shared = "a".repeat(4096);
        let label_a = format!("{shared}tail-one");
        let label_b = format!("{shared}tail-two");

        let a1 = sanitize_label(&label_a, 5);
        let a2 = sanitize_label(&label_a, 5);
        let b = sanitize_label(&label_b, 5);

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert!(a1.len() <= MAX_COMPONENT_BYTES);
    }

    #[test]
    fn sanitize_label_huge_input_fits_budget() {
        let label = "x".repeat(16_384);
        let name = sanitize_label(&label, 5);
        assert!(name.len() <= MAX_COMPONENT_BYTES);
    }
}
