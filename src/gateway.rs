use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::domain::{DateRange, PageWindow, Patent};
use crate::error::FetcherError;

pub const HEALTH_PATH: &str = "health";
pub const PATENTS_PATH: &str = "patents";
pub const HEALTHY: &str = "healthy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HEALTHY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

/// One page of `POST /patents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatentsPage {
    pub patents: Vec<Patent>,
    pub pagination: Pagination,
}

/// Body of `POST /patents`.
#[derive(Debug, Serialize)]
pub struct PatentsQuery<'a> {
    #[serde(flatten)]
    pub range: &'a DateRange,
    pub pagination: PageWindow,
}

pub trait PatentGateway: Send + Sync {
    fn probe_health(&self) -> Result<HealthStatus, FetcherError>;
    fn fetch_page(&self, range: &DateRange, window: PageWindow)
    -> Result<PatentsPage, FetcherError>;
}

#[derive(Clone)]
pub struct PatentHttpGateway {
    client: Client,
    health_url: Url,
    patents_url: Url,
}

impl PatentHttpGateway {
    pub fn new(settings: &Settings) -> Result<Self, FetcherError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("patent-fetcher/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetcherError::InvalidConfig(err.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut bearer =
            HeaderValue::from_str(&format!("Bearer {}", settings.api_token.expose()))
                .map_err(|_| {
                    FetcherError::InvalidConfig("api_token contains invalid characters".to_string())
                })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| FetcherError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            health_url: endpoint_url(&settings.api_url, HEALTH_PATH)?,
            patents_url: endpoint_url(&settings.api_url, PATENTS_PATH)?,
        })
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &Url,
    ) -> Result<T, FetcherError> {
        let response = request.send().map_err(|err| {
            error!(%url, error = %err, "patent API request failed");
            FetcherError::Transport(format!("{url}: {err}"))
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "patent API request failed".to_string());
            error!(%url, status, %message, "patent API returned an error status");
            return Err(FetcherError::Transport(format!(
                "{url} returned status {status}: {message}"
            )));
        }

        response.json::<T>().map_err(|err| {
            error!(%url, error = %err, "failed to decode patent API response");
            FetcherError::Transport(format!("{url}: invalid response body: {err}"))
        })
    }
}

impl PatentGateway for PatentHttpGateway {
    fn probe_health(&self) -> Result<HealthStatus, FetcherError> {
        debug!(url = %self.health_url, "probing patent API health");
        let health: HealthStatus =
            self.send_json(self.client.get(self.health_url.clone()), &self.health_url)?;
        info!(
            service = %health.service,
            status = %health.status,
            "health check completed"
        );
        Ok(health)
    }

    fn fetch_page(
        &self,
        range: &DateRange,
        window: PageWindow,
    ) -> Result<PatentsPage, FetcherError> {
        let query = PatentsQuery {
            range,
            pagination: window,
        };
        debug!(
            url = %self.patents_url,
            %range,
            page = window.page(),
            page_size = window.page_size(),
            "requesting patents page"
        );
        self.send_json(
            self.client.post(self.patents_url.clone()).json(&query),
            &self.patents_url,
        )
    }
}

/// Resolves `path` under `base`, keeping any path prefix the base URL carries.
pub fn endpoint_url(base: &Url, path: &str) -> Result<Url, FetcherError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|err| FetcherError::InvalidConfig(format!("api_url {base}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let base = Url::parse("https://patents.example.com/v1").unwrap();
        assert_eq!(
            endpoint_url(&base, PATENTS_PATH).unwrap().as_str(),
            "https://patents.example.com/v1/patents"
        );

        let root = Url::parse("https://patents.example.com").unwrap();
        assert_eq!(
            endpoint_url(&root, HEALTH_PATH).unwrap().as_str(),
            "https://patents.example.com/health"
        );
    }
}
