//! Metadata coordinator (spec §4.13): per-title driver wiring the cooldown check, the Cloudflare
//! gateway search, the candidate matcher, the cover/details services, and an equivalence-catalog
//! update behind one best-effort entry point.

use super::comick::{ComickClient, ComickOutcome};
use super::cover::{ensure_cover_jpg, CoverOutcome, EnsureCoverJpgRequest};
use super::details::{ensure_details_json, DetailsOutcome, EnsureDetailsJsonRequest};
use super::matcher::{match_candidates, DetailProbeOutcome, MatchOutcome};
use super::state_store::MetadataStateStore;
use crate::catalog::{CatalogUpdateRequest, EquivalenceCatalog, TitleCandidate};
use crate::error::CancellationToken;
use crate::normalize::normalize_title_key;
use ssm_contracts::{Clock, FileSystem, HttpClient};
use ssm_model::{CandidateMatchResult, ComickComicResponse};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

const COVER_FILE_NAME: &str = "cover.jpg";
const DETAILS_FILE_NAME: &str = "details.json";

pub struct EnsureMetadataRequest<'a> {
    pub display_title: &'a str,
    pub equivalent_titles: &'a [String],
    pub preferred_dir: &'a Path,
    pub all_override_dirs: &'a [PathBuf],
    pub ordered_source_dirs: &'a [PathBuf],
    pub cover_base_uri: &'a str,
    pub preferred_language: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureMetadataResult {
    pub api_called: bool,
    pub had_service_interruption: bool,
    pub cover_exists: bool,
    pub details_exists: bool,
}

pub struct MetadataCoordinator<'a> {
    comick: ComickClient<'a>,
    state_store: &'a MetadataStateStore,
    catalog: Option<&'a EquivalenceCatalog>,
    cooldown_window: chrono::Duration,
}

impl<'a> MetadataCoordinator<'a> {
    pub fn new(
        comick: ComickClient<'a>,
        state_store: &'a MetadataStateStore,
        catalog: Option<&'a EquivalenceCatalog>,
        cooldown_window: chrono::Duration,
    ) -> Self {
        Self { comick, state_store, catalog, cooldown_window }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ensure_metadata(
        &self,
        fs: &dyn FileSystem,
        clock: &dyn Clock,
        http: &dyn HttpClient,
        cancel: &CancellationToken,
        request: &EnsureMetadataRequest<'_>,
    ) -> EnsureMetadataResult {
        let title_key = normalize_title_key(request.display_title);
        let cover_already = artifact_exists_anywhere(fs, request.preferred_dir, request.all_override_dirs, COVER_FILE_NAME);
        let details_already = artifact_exists_anywhere(fs, request.preferred_dir, request.all_override_dirs, DETAILS_FILE_NAME);

        if cover_already && details_already {
            return EnsureMetadataResult { api_called: false, had_service_interruption: false, cover_exists: true, details_exists: true };
        }

        let now = clock.now();
        if self.state_store.read(fs).is_cooldown_active(&title_key, now) {
            tracing::debug!(event = "metadata.cooldown.skipped", title = request.display_title);
            return self.finalize(fs, http, request, None, false, false, cover_already, details_already);
        }

        match self.comick.search(fs, self.state_store, clock, http, request.display_title) {
            ComickOutcome::Success(candidates) => {
                let expected_titles = build_expected_titles(request.display_title, request.equivalent_titles);
                let matched_detail: RefCell<Option<ComickComicResponse>> = RefCell::new(None);
                let match_result = match_candidates(&candidates, &expected_titles, cancel, |slug| {
                    self.probe_detail(fs, clock, http, cancel, slug, &matched_detail)
                });

                match match_result {
                    MatchOutcome::Cancelled => EnsureMetadataResult {
                        api_called: true,
                        had_service_interruption: true,
                        cover_exists: cover_already,
                        details_exists: details_already,
                    },
                    MatchOutcome::Result(CandidateMatchResult::Matched { .. }) => {
                        self.persist_cooldown(fs, &title_key, now);
                        let detail = matched_detail.into_inner();
                        self.finalize(fs, http, request, detail, true, false, cover_already, details_already)
                    }
                    MatchOutcome::Result(CandidateMatchResult::NoHighConfidenceMatch { service_interrupted }) => {
                        self.persist_cooldown(fs, &title_key, now);
                        self.finalize(fs, http, request, None, true, service_interrupted, cover_already, details_already)
                    }
                }
            }
            ComickOutcome::CloudflareBlocked | ComickOutcome::TransportFailure(_) | ComickOutcome::HttpFailure(_) | ComickOutcome::MalformedPayload(_) => {
                self.persist_cooldown(fs, &title_key, now);
                self.finalize(fs, http, request, None, true, true, cover_already, details_already)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn probe_detail(
        &self,
        fs: &dyn FileSystem,
        clock: &dyn Clock,
        http: &dyn HttpClient,
        cancel: &CancellationToken,
        slug: &str,
        matched_detail: &RefCell<Option<ComickComicResponse>>,
    ) -> DetailProbeOutcome {
        if cancel.is_cancelled() {
            return DetailProbeOutcome::Cancelled;
        }
        match self.comick.comic_detail(fs, self.state_store, clock, http, slug) {
            ComickOutcome::Success(detail) => {
                *matched_detail.borrow_mut() = Some(detail.clone());
                DetailProbeOutcome::Success(detail)
            }
            ComickOutcome::CloudflareBlocked => DetailProbeOutcome::CloudflareBlocked,
            ComickOutcome::TransportFailure(e) => DetailProbeOutcome::TransportFailure(e),
            ComickOutcome::HttpFailure(404) => DetailProbeOutcome::NotFound,
            ComickOutcome::HttpFailure(status) => DetailProbeOutcome::HttpFailure(status),
            ComickOutcome::MalformedPayload(e) => DetailProbeOutcome::MalformedPayload(e),
        }
    }

    fn persist_cooldown(&self, fs: &dyn FileSystem, title_key: &str, now: chrono::DateTime<chrono::Utc>) {
        let until = now + self.cooldown_window;
        let key = title_key.to_string();
        self.state_store.transform(fs, move |mut snapshot| {
            let _ = snapshot.title_cooldowns_utc.insert(key.clone(), until);
            snapshot
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        fs: &dyn FileSystem,
        http: &dyn HttpClient,
        request: &EnsureMetadataRequest<'_>,
        matched: Option<ComickComicResponse>,
        api_called: bool,
        had_service_interruption: bool,
        cover_already: bool,
        details_already: bool,
    ) -> EnsureMetadataResult {
        let cover_exists = if cover_already {
            true
        } else {
            self.ensure_cover(fs, http, request, matched.as_ref())
        };

        let details_request = EnsureDetailsJsonRequest {
            preferred_dir: request.preferred_dir,
            all_override_dirs: request.all_override_dirs,
            ordered_source_dirs: request.ordered_source_dirs,
            matched_comick: matched.as_ref(),
        };
        let details_exists = if details_already {
            true
        } else {
            match ensure_details_json(fs, &details_request) {
                DetailsOutcome::AlreadyExists(_)
                | DetailsOutcome::CopiedFromSource(_)
                | DetailsOutcome::GeneratedFromComick { .. }
                | DetailsOutcome::GeneratedFromComicInfo { .. } => true,
                DetailsOutcome::SkippedParseFailure | DetailsOutcome::SkippedNoComicInfo => false,
                DetailsOutcome::WriteFailed(e) => {
                    tracing::warn!(event = "metadata.artifact.details.failed", title = request.display_title, error = %e);
                    false
                }
            }
        };

        if let Some(detail) = &matched {
            if let Some(catalog) = self.catalog {
                self.update_catalog(fs, catalog, request, detail);
            }
        }

        EnsureMetadataResult { api_called, had_service_interruption, cover_exists, details_exists }
    }

    fn ensure_cover(
        &self,
        fs: &dyn FileSystem,
        http: &dyn HttpClient,
        request: &EnsureMetadataRequest<'_>,
        matched: Option<&ComickComicResponse>,
    ) -> bool {
        let Some(detail) = matched else {
            tracing::debug!(event = "metadata.artifact.cover.skipped", reason = "no_match", title = request.display_title);
            return false;
        };
        let Some(cover_key) = detail.first_cover_b2_key() else {
            tracing::debug!(event = "metadata.artifact.cover.skipped", reason = "no_cover_key", title = request.display_title);
            return false;
        };

        let cover_request = EnsureCoverJpgRequest {
            preferred_dir: request.preferred_dir,
            all_override_dirs: request.all_override_dirs,
            cover_key,
            cover_base_uri: request.cover_base_uri,
        };
        match ensure_cover_jpg(fs, http, &cover_request) {
            CoverOutcome::AlreadyExists(_) | CoverOutcome::WrittenDownloadedJpeg(_) | CoverOutcome::WrittenConvertedJpeg(_) => true,
            CoverOutcome::DownloadFailed(e) | CoverOutcome::UnsupportedImage(e) | CoverOutcome::WriteFailed(e) => {
                tracing::warn!(event = "metadata.artifact.cover.failed", title = request.display_title, error = %e);
                false
            }
        }
    }

    fn update_catalog(&self, fs: &dyn FileSystem, catalog: &EquivalenceCatalog, request: &EnsureMetadataRequest<'_>, detail: &ComickComicResponse) {
        let mut candidates = vec![TitleCandidate { language: None, title: request.display_title.to_string() }];
        candidates.push(TitleCandidate { language: None, title: detail.title.clone() });
        for alt in &detail.titles {
            candidates.push(TitleCandidate { language: alt.language.clone(), title: alt.title.clone() });
        }

        let update_request = CatalogUpdateRequest { candidates, preferred_language: request.preferred_language.map(str::to_string) };
        match catalog.update(fs, &update_request) {
            crate::catalog::CatalogUpdateOutcome::Updated | crate::catalog::CatalogUpdateOutcome::NoChanges => {}
            other => tracing::warn!(event = "metadata.catalog.update_failed", title = request.display_title, outcome = ?other),
        }
    }
}

fn build_expected_titles(display_title: &str, equivalent_titles: &[String]) -> Vec<String> {
    std::iter::once(display_title.to_string()).chain(equivalent_titles.iter().cloned()).collect()
}

fn artifact_exists_anywhere(fs: &dyn FileSystem, preferred_dir: &Path, all_override_dirs: &[PathBuf], file_name: &str) -> bool {
    std::iter::once(preferred_dir)
        .chain(all_override_dirs.iter().map(PathBuf::as_path))
        .any(|dir| fs.exists(&dir.join(file_name)))
}
