//! FlareSolverr client (spec §6): proxies a single GET through a FlareSolverr `/v1` endpoint,
//! which drives a real browser past a Cloudflare challenge and hands back the rendered response.

use serde::Deserialize;
use ssm_contracts::HttpClient;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum FlareSolverrOutcome {
    Success { status: u16, body: String },
    UpstreamError(String),
    TransportFailure(String),
}

#[derive(Deserialize)]
struct FlareSolverrEnvelope {
    status: String,
    message: Option<String>,
    solution: Option<FlareSolverrSolution>,
}

#[derive(Deserialize)]
struct FlareSolverrSolution {
    status: u16,
    response: String,
}

pub struct FlareSolverrClient {
    base_url: String,
}

impl FlareSolverrClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn fetch(&self, http: &dyn HttpClient, target_url: &str, timeout: Duration) -> FlareSolverrOutcome {
        let max_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        let body = serde_json::json!({
            "cmd": "request.get",
            "url": target_url,
            "maxTimeout": max_timeout_ms,
        });
        let bytes = match serde_json::to_vec(&body) {
            Ok(b) => b,
            Err(e) => return FlareSolverrOutcome::TransportFailure(e.to_string()),
        };

        let endpoint = format!("{}/v1", self.base_url);
        match http.post_json(&endpoint, bytes, timeout) {
            Ok(response) => Self::parse_envelope(&response.body_str()),
            Err(e) => FlareSolverrOutcome::TransportFailure(e.to_string()),
        }
    }

    fn parse_envelope(body: &str) -> FlareSolverrOutcome {
        let envelope: FlareSolverrEnvelope = match serde_json::from_str(body) {
            Ok(e) => e,
            Err(e) => return FlareSolverrOutcome::TransportFailure(format!("malformed FlareSolverr envelope: {e}")),
        };

        if !envelope.status.eq_ignore_ascii_case("ok") {
            let message = envelope.message.unwrap_or_else(|| "FlareSolverr reported a non-ok status".to_string());
            return FlareSolverrOutcome::UpstreamError(message);
        }

        let Some(solution) = envelope.solution else {
            return FlareSolverrOutcome::UpstreamError("FlareSolverr response had no solution".to_string());
        };

        FlareSolverrOutcome::Success { status: solution.status, body: strip_browser_pre_wrapper(solution.response) }
    }
}

/// Chrome's built-in JSON viewer wraps API responses in `<html><body><pre>...</pre></body></html>`
/// when FlareSolverr renders them through a real browser; unwrap it so downstream JSON parsing
/// sees the raw payload.
fn strip_browser_pre_wrapper(body: String) -> String {
    let trimmed = body.trim();
    if let Some(start) = trimmed.find("<pre") {
        if let Some(tag_end) = trimmed[start..].find('>') {
            let content_start = start + tag_end + 1;
            if let Some(end) = trimmed[content_start..].find("</pre>") {
                return html_unescape_basic(&trimmed[content_start..content_start + end]);
            }
        }
    }
    body
}

fn html_unescape_basic(s: &str) -> String {
    s.replace("&amp;", "&").replace("&lt;", "<").replace("&gt;", ">").replace("&quot;", "\"").replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_envelope_with_plain_json_response() {
        let body = r#"{"status":"ok","solution":{"status":200,"response":"{\"slug\":\"one-piece\"}"}}"#;
        match FlareSolverrClient::parse_envelope(body) {
            FlareSolverrOutcome::Success { status, body } => {
                assert_eq!(status, 200);
                assert_eq!(body, r#"{"slug":"one-piece"}"#);
            }
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[test]
    fn unwraps_browser_rendered_pre_tag() {
        let body = r#"{"status":"ok","solution":{"status":200,"response":"<html><head></head><body><pre>{\"a\":1}</pre></body></html>"}}"#;
        match FlareSolverrClient::parse_envelope(body) {
            FlareSolverrOutcome::Success { body, .. } => assert_eq!(body, r#"{"a":1}"#),
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[test]
    fn non_ok_status_is_upstream_error() {
        let body = r#"{"status":"error","message":"browser timeout"}"#;
        match FlareSolverrClient::parse_envelope(body) {
            FlareSolverrOutcome::UpstreamError(msg) => assert_eq!(msg, "browser timeout"),
            other => panic!("expected UpstreamError, got {other:?}"),
        }
    }
}
