//! Blocking HTTP client seam backed by `reqwest::blocking::Client`. The daemon's worker loop is
//! single-threaded cooperative, so the blocking client — not an async runtime — is the correct
//! fit here; `reqwest` itself is unchanged, only the `blocking` feature is selected instead of an
//! async one.

use ssm_contracts::{HttpClient, HttpError, HttpResponse};
use std::time::Duration;

pub struct ReqwestHttpClient {
    client: reqwest::blocking::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::builder()
                .build()
                .expect("reqwest client builds with default TLS config"),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn get(&self, url: &str, accept_json: bool, timeout: Duration) -> Result<HttpResponse, HttpError> {
        let mut request = self.client.get(url).timeout(timeout);
        if accept_json {
            request = request.header(reqwest::header::ACCEPT, "application/json");
        }
        send(request)
    }

    fn post_json(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<HttpResponse, HttpError> {
        let request = self
            .client
            .post(url)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        send(request)
    }
}

fn send(request: reqwest::blocking::RequestBuilder) -> Result<HttpResponse, HttpError> {
    let response = request.send().map_err(classify)?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    let body = response.bytes().map_err(classify)?.to_vec();
    Ok(HttpResponse { status, headers, body })
}

fn classify(err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout
    } else {
        HttpError::Transport(err.to_string())
    }
}
