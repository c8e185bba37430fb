use crate::comick::ComickSearchCandidate;

/// Sentinel used in place of an index when no candidate matched.
pub const NO_INDEX: i32 = -1;

/// Outcome of matching search candidates against a set of expected titles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateMatchResult {
    Matched {
        candidate: ComickSearchCandidate,
        index: i32,
        score: u32,
        had_top_tie: bool,
    },
    NoHighConfidenceMatch {
        service_interrupted: bool,
    },
}

impl CandidateMatchResult {
    pub fn no_match() -> Self {
        CandidateMatchResult::NoHighConfidenceMatch {
            service_interrupted: false,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, CandidateMatchResult::Matched { .. })
    }
}
