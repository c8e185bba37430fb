//! Cloudflare-aware gateway (spec §4.8): routes a call through the direct HTTP client or through
//! FlareSolverr, tracking sticky-fallback state anchored on block-detection time rather than
//! request-start time, persisted through the metadata state store so it survives restarts.

use super::flaresolverr::{FlareSolverrClient, FlareSolverrOutcome};
use super::state_store::MetadataStateStore;
use ssm_contracts::{Clock, FileSystem, HttpClient, HttpResponse};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum GatewayOutcome {
    Success(HttpResponse),
    CloudflareBlocked,
    TransportFailure(String),
    HttpFailure(u16),
}

const CLOUDFLARE_BODY_MARKERS: &[&str] = &["Just a moment...", "_cf_chl_opt"];
const CLOUDFLARE_CHALLENGE_STATUSES: &[u16] = &[403, 503];

pub fn detect_cloudflare_block(response: &HttpResponse) -> bool {
    if CLOUDFLARE_BODY_MARKERS.iter().any(|marker| response.body_str().contains(marker)) {
        return true;
    }
    if response.header("cf-mitigated").is_some() {
        return true;
    }
    if CLOUDFLARE_CHALLENGE_STATUSES.contains(&response.status) {
        let is_html = response
            .header("content-type")
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
        let has_challenge_marker = response.body_str().to_ascii_lowercase().contains("challenge");
        if is_html && has_challenge_marker {
            return true;
        }
    }
    false
}

pub struct CloudflareGateway {
    direct_retry_interval: chrono::Duration,
    flaresolverr: Option<FlareSolverrClient>,
}

impl CloudflareGateway {
    pub fn new(direct_retry_interval: chrono::Duration, flaresolverr: Option<FlareSolverrClient>) -> Self {
        Self { direct_retry_interval, flaresolverr }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn fetch(
        &self,
        fs: &dyn FileSystem,
        state_store: &MetadataStateStore,
        clock: &dyn Clock,
        http: &dyn HttpClient,
        url: &str,
        accept_json: bool,
        timeout: Duration,
    ) -> GatewayOutcome {
        let now = clock.now();
        let snapshot = state_store.read(fs);

        if snapshot.is_sticky_fallback_active(now) {
            tracing::debug!(event = "metadata.cloudflare.fallback.sticky_route", url);
            return match &self.flaresolverr {
                Some(flaresolverr) => to_gateway_outcome(flaresolverr.fetch(http, url, timeout)),
                None => GatewayOutcome::TransportFailure("sticky fallback active but no FlareSolverr configured".into()),
            };
        }

        let direct = http.get(url, accept_json, timeout);
        let direct_outcome = classify_direct(direct);

        match direct_outcome {
            GatewayOutcome::CloudflareBlocked => {
                let block_detected_at = clock.now();
                match &self.flaresolverr {
                    Some(flaresolverr) => {
                        let fallback = flaresolverr.fetch(http, url, timeout);
                        let outcome = to_gateway_outcome(fallback);
                        if let GatewayOutcome::Success(_) = &outcome {
                            let until = block_detected_at + self.direct_retry_interval;
                            state_store.transform(fs, |mut s| {
                                s.sticky_flaresolverr_until_utc = Some(until);
                                s
                            });
                            tracing::warn!(event = "metadata.cloudflare.fallback.activated", until = %until);
                        }
                        outcome
                    }
                    None => {
                        tracing::warn!(event = "metadata.cloudflare.fallback.unavailable", url);
                        GatewayOutcome::CloudflareBlocked
                    }
                }
            }
            other => {
                self.maybe_clear_race_sticky(fs, state_store, clock);
                other
            }
        }
    }

    /// Clears a sticky timestamp that was set by a racing caller while this direct request was
    /// in flight, if that timestamp is already expired relative to now.
    fn maybe_clear_race_sticky(&self, fs: &dyn FileSystem, state_store: &MetadataStateStore, clock: &dyn Clock) {
        let post_direct = clock.now();
        let current = state_store.read(fs);
        if let Some(until) = current.sticky_flaresolverr_until_utc {
            if until <= post_direct {
                state_store.transform(fs, |mut s| {
                    s.sticky_flaresolverr_until_utc = None;
                    s
                });
                tracing::debug!(event = "metadata.cloudflare.fallback.sticky_cleared");
            }
        }
    }
}

fn classify_direct(result: Result<HttpResponse, ssm_contracts::HttpError>) -> GatewayOutcome {
    match result {
        Ok(response) if detect_cloudflare_block(&response) => GatewayOutcome::CloudflareBlocked,
        Ok(response) if response.status >= 200 && response.status < 300 => GatewayOutcome::Success(response),
        Ok(response) => GatewayOutcome::HttpFailure(response.status),
        Err(e) => GatewayOutcome::TransportFailure(e.to_string()),
    }
}

fn to_gateway_outcome(outcome: FlareSolverrOutcome) -> GatewayOutcome {
    match outcome {
        FlareSolverrOutcome::Success { status, body } if (200..300).contains(&status) => {
            GatewayOutcome::Success(HttpResponse { status, headers: Vec::new(), body: body.into_bytes() })
        }
        FlareSolverrOutcome::Success { status, .. } => GatewayOutcome::HttpFailure(status),
        FlareSolverrOutcome::UpstreamError(e) => GatewayOutcome::TransportFailure(e),
        FlareSolverrOutcome::TransportFailure(e) => GatewayOutcome::TransportFailure(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str, headers: Vec<(String, String)>) -> HttpResponse {
        HttpResponse { status, headers, body: body.as_bytes().to_vec() }
    }

    #[test]
    fn detects_cloudflare_via_body_marker() {
        let resp = response(503, "Just a moment... while we verify", vec![]);
        assert!(detect_cloudflare_block(&resp));
    }

    #[test]
    fn detects_cloudflare_via_header() {
        let resp = response(200, "ok", vec![("cf-mitigated".to_string(), "challenge".to_string())]);
        assert!(detect_cloudflare_block(&resp));
    }

    #[test]
    fn plain_success_is_not_cloudflare() {
        let resp = response(200, "{\"ok\":true}", vec![]);
        assert!(!detect_cloudflare_block(&resp));
    }
}
