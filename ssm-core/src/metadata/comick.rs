//! Comick API client (spec §6): search and comic-detail lookups, routed through the Cloudflare
//! gateway so a challenge response transparently falls back to FlareSolverr.

use super::gateway::{CloudflareGateway, GatewayOutcome};
use super::state_store::MetadataStateStore;
use ssm_contracts::{Clock, FileSystem, HttpClient};
use ssm_model::{ComickComicResponse, ComickSearchCandidate};
use std::time::Duration;

const API_BASE: &str = "https://api.comick.dev";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum ComickOutcome<T> {
    Success(T),
    CloudflareBlocked,
    TransportFailure(String),
    HttpFailure(u16),
    MalformedPayload(String),
}

pub struct ComickClient<'a> {
    gateway: &'a CloudflareGateway,
}

impl<'a> ComickClient<'a> {
    pub fn new(gateway: &'a CloudflareGateway) -> Self {
        Self { gateway }
    }

    pub fn search(
        &self,
        fs: &dyn FileSystem,
        state_store: &MetadataStateStore,
        clock: &dyn Clock,
        http: &dyn HttpClient,
        query: &str,
    ) -> ComickOutcome<Vec<ComickSearchCandidate>> {
        let url = format!("{API_BASE}/v1.0/search/?q={}", url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>());
        self.fetch_json(fs, state_store, clock, http, &url)
    }

    pub fn comic_detail(
        &self,
        fs: &dyn FileSystem,
        state_store: &MetadataStateStore,
        clock: &dyn Clock,
        http: &dyn HttpClient,
        slug: &str,
    ) -> ComickOutcome<ComickComicResponse> {
        let url = format!("{API_BASE}/comic/{}", url::form_urlencoded::byte_serialize(slug.as_bytes()).collect::<String>());
        self.fetch_json(fs, state_store, clock, http, &url)
    }

    fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        fs: &dyn FileSystem,
        state_store: &MetadataStateStore,
        clock: &dyn Clock,
        http: &dyn HttpClient,
        url: &str,
    ) -> ComickOutcome<T> {
        match self.gateway.fetch(fs, state_store, clock, http, url, true, DEFAULT_TIMEOUT) {
            GatewayOutcome::Success(response) => match serde_json::from_slice(&response.body) {
                Ok(value) => ComickOutcome::Success(value),
                Err(e) => ComickOutcome::MalformedPayload(e.to_string()),
            },
            GatewayOutcome::CloudflareBlocked => ComickOutcome::CloudflareBlocked,
            GatewayOutcome::TransportFailure(e) => ComickOutcome::TransportFailure(e),
            GatewayOutcome::HttpFailure(status) => ComickOutcome::HttpFailure(status),
        }
    }
}
