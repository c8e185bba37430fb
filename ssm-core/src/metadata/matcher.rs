//! Candidate matcher (spec §4.9): ranks Comick search candidates by title similarity against the
//! expected titles for a group, then probes details in ranked order until one actually matches.

use crate::error::CancellationToken;
use crate::normalize::normalize_title_key;
use ssm_model::{CandidateMatchResult, ComickComicResponse, ComickSearchCandidate};

#[derive(Debug)]
pub enum DetailProbeOutcome {
    Success(ComickComicResponse),
    NotFound,
    CloudflareBlocked,
    TransportFailure(String),
    HttpFailure(u16),
    MalformedPayload(String),
    Cancelled,
}

#[derive(Debug)]
pub enum MatchOutcome {
    Result(CandidateMatchResult),
    Cancelled,
}

pub fn match_candidates<F>(
    candidates: &[ComickSearchCandidate],
    expected_titles: &[String],
    cancel: &CancellationToken,
    mut detail_probe: F,
) -> MatchOutcome
where
    F: FnMut(&str) -> DetailProbeOutcome,
{
    let expected_keys: Vec<String> = {
        let mut keys: Vec<String> = expected_titles.iter().map(|t| normalize_title_key(t)).collect();
        keys.sort();
        keys.dedup();
        keys
    };
    if expected_keys.is_empty() {
        return MatchOutcome::Result(CandidateMatchResult::NoHighConfidenceMatch { service_interrupted: false });
    }

    let mut ranked: Vec<(usize, &ComickSearchCandidate, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| (index, candidate, ranking_hint(candidate, &expected_keys)))
        .collect();
    ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut service_interrupted = false;

    for (index, candidate, hint) in &ranked {
        if candidate.slug.is_empty() {
            continue;
        }

        let outcome = detail_probe(&candidate.slug);
        match outcome {
            DetailProbeOutcome::Success(detail) => {
                let score = matching_key_count(&detail, &expected_keys);
                if score > 0 {
                    let tied_candidate_count =
                        ranked.iter().filter(|(_, _, other_hint)| (*other_hint - *hint).abs() < f64::EPSILON).count();
                    let had_top_tie = *hint > 0.0 && tied_candidate_count >= 2;
                    if had_top_tie {
                        tracing::warn!(
                            event = "metadata.candidate.ambiguity",
                            slug = %candidate.slug,
                            similarity = *hint,
                            tied_candidate_count = tied_candidate_count,
                        );
                    }
                    return MatchOutcome::Result(CandidateMatchResult::Matched {
                        candidate: (*candidate).clone(),
                        index: *index as i32,
                        score,
                        had_top_tie,
                    });
                }
            }
            DetailProbeOutcome::Cancelled => {
                if cancel.is_cancelled() {
                    return MatchOutcome::Cancelled;
                }
                service_interrupted = true;
            }
            DetailProbeOutcome::CloudflareBlocked
            | DetailProbeOutcome::TransportFailure(_)
            | DetailProbeOutcome::HttpFailure(_)
            | DetailProbeOutcome::MalformedPayload(_) => {
                service_interrupted = true;
            }
            DetailProbeOutcome::NotFound => {}
        }
    }

    MatchOutcome::Result(CandidateMatchResult::NoHighConfidenceMatch { service_interrupted })
}

fn ranking_hint(candidate: &ComickSearchCandidate, expected_keys: &[String]) -> f64 {
    candidate
        .all_titles()
        .map(normalize_title_key)
        .flat_map(|candidate_key| expected_keys.iter().map(move |expected| strsim::normalized_levenshtein(&candidate_key, expected)))
        .fold(0.0_f64, f64::max)
}

fn matching_key_count(detail: &ComickComicResponse, expected_keys: &[String]) -> u32 {
    let detail_keys: Vec<String> = std::iter::once(detail.title.as_str())
        .chain(detail.titles.iter().map(|t| t.title.as_str()))
        .map(normalize_title_key)
        .collect();

    expected_keys.iter().filter(|expected| detail_keys.iter().any(|detail_key| detail_key == *expected)).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssm_model::ComickAltTitle;

    fn candidate(slug: &str, title: &str) -> ComickSearchCandidate {
        ComickSearchCandidate { slug: slug.to_string(), title: title.to_string(), titles: Vec::new(), cover: Vec::new() }
    }

    fn detail(title: &str) -> ComickComicResponse {
        ComickComicResponse {
            title: title.to_string(),
            titles: vec![ComickAltTitle { title: "Alt Name".to_string(), language: None }],
            description: None,
            description_html: None,
            status: 1,
            iso639_1: None,
            genres: Vec::new(),
            mu_categories: Vec::new(),
            authors: Vec::new(),
            artists: Vec::new(),
            cover: Vec::new(),
        }
    }

    #[test]
    fn no_expected_titles_short_circuits_without_probing() {
        let cancel = CancellationToken::new();
        let result = match_candidates(&[candidate("a", "A")], &[], &cancel, |_| panic!("should not probe"));
        match result {
            MatchOutcome::Result(CandidateMatchResult::NoHighConfidenceMatch { service_interrupted }) => {
                assert!(!service_interrupted);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn matches_on_first_successful_probe() {
        let cancel = CancellationToken::new();
        let candidates = vec![candidate("one-piece", "One Piece")];
        let result = match_candidates(&candidates, &["One Piece".to_string()], &cancel, |slug| {
            assert_eq!(slug, "one-piece");
            DetailProbeOutcome::Success(detail("One Piece"))
        });
        match result {
            MatchOutcome::Result(CandidateMatchResult::Matched { score, .. }) => assert_eq!(score, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn service_interruption_is_recorded_when_no_match_found() {
        let cancel = CancellationToken::new();
        let candidates = vec![candidate("a", "Something Else")];
        let result = match_candidates(&candidates, &["One Piece".to_string()], &cancel, |_| DetailProbeOutcome::TransportFailure("boom".into()));
        match result {
            MatchOutcome::Result(CandidateMatchResult::NoHighConfidenceMatch { service_interrupted }) => assert!(service_interrupted),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tied_top_candidates_report_ambiguity() {
        let cancel = CancellationToken::new();
        let candidates = vec![candidate("slug-1", "Target Title"), candidate("slug-2", "Target Title")];
        let result = match_candidates(&candidates, &["Target Title".to_string()], &cancel, |slug| match slug {
            "slug-1" => DetailProbeOutcome::Success(detail("Target Title")),
            "slug-2" => DetailProbeOutcome::Success(detail("Target Title")),
            _ => panic!("unexpected slug {slug}"),
        });
        match result {
            MatchOutcome::Result(CandidateMatchResult::Matched { index, had_top_tie, .. }) => {
                assert_eq!(index, 0, "first candidate in ranked order should win the tie");
                assert!(had_top_tie);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn cooperative_cancellation_propagates() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let candidates = vec![candidate("a", "A")];
        let result = match_candidates(&candidates, &["A".to_string()], &cancel, |_| DetailProbeOutcome::Cancelled);
        assert!(matches!(result, MatchOutcome::Cancelled));
    }
}
