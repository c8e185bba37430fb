use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking HTTP client seam. The real implementation wraps `reqwest::blocking::Client`; tests
/// substitute a scripted fake so Cloudflare-detection and FlareSolverr routing can be exercised
/// without a network.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str, accept_json: bool, timeout: Duration) -> Result<HttpResponse, HttpError>;
    fn post_json(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<HttpResponse, HttpError>;
}
