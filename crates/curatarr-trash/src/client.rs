// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{Result, TrashError};
use crate::models::{CatalogEntry, CustomFormatDefinition};
use crate::rate_limiter::RateLimiter;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const CATALOG_API_BASE: &str =
    "https://api.github.com/repos/TRaSH-Guides/Guides/contents/docs/json";
const USER_AGENT: &str = concat!(
    "Curatarr/",
    env!("CARGO_PKG_VERSION"),
    " ( rule catalog sync )"
);

/// Rate-limited client for a custom format catalog.
#[derive(Debug, Clone)]
pub struct TrashClient {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl TrashClient {
    /// Create a new catalog client with default settings.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a client builder for custom configuration.
    pub fn builder() -> TrashClientBuilder {
        TrashClientBuilder::default()
    }

    /// List the custom format definition files published for an application.
    ///
    /// # Arguments
    /// * `app` - Catalog application directory, `sonarr` or `radarr`.
    ///
    /// # Example
    /// ```no_run
    /// # use curatarr_trash::TrashClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = TrashClient::new()?;
    /// let entries = client.list_custom_formats("sonarr").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list_custom_formats(&self, app: &str) -> Result<Vec<CatalogEntry>> {
        let url = Url::parse(&format!("{}/{}/cf", self.base_url.trim_end_matches('/'), app))
            .map_err(|e| TrashError::InvalidResponse(e.to_string()))?;

        let entries: Vec<CatalogEntry> = self.get(url.as_str()).await?;
        let files: Vec<CatalogEntry> = entries
            .into_iter()
            .filter(CatalogEntry::is_definition_file)
            .collect();

        debug!(target: "trash", app, count = files.len(), "listed custom format definitions");
        Ok(files)
    }

    /// Download one custom format definition.
    pub async fn fetch_custom_format(&self, entry: &CatalogEntry) -> Result<CustomFormatDefinition> {
        let url = entry.download_url.as_deref().ok_or_else(|| {
            TrashError::InvalidResponse(format!("entry '{}' has no download url", entry.name))
        })?;
        self.get(url).await
    }

    /// Internal method to perform rate-limited GET requests.
    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.rate_limiter.acquire().await;

        trace!(target: "trash", "GET {}", url);

        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        debug!(target: "trash", "response status: {}", status);

        if status == 404 {
            return Err(TrashError::NotFound(url.to_string()));
        }

        if status == 403 || status == 429 {
            if let Some(delay) = retry_after(&response) {
                self.rate_limiter.defer(delay).await;
            }
            return Err(TrashError::RateLimitExceeded);
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TrashError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        trace!(target: "trash", "response body: {}", body);

        serde_json::from_str(&body)
            .map_err(|e| TrashError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

/// Delay-seconds form of `Retry-After`; HTTP dates are ignored.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Builder for configuring a catalog client.
#[derive(Debug)]
pub struct TrashClientBuilder {
    base_url: String,
    timeout: Duration,
    rate_limit_interval: Duration,
}

impl Default for TrashClientBuilder {
    fn default() -> Self {
        Self {
            base_url: CATALOG_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            rate_limit_interval: Duration::from_millis(250),
        }
    }
}

impl TrashClientBuilder {
    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set rate limit interval between requests.
    pub fn rate_limit_interval(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = interval;
        self
    }

    /// Build the catalog client.
    pub fn build(self) -> Result<TrashClient> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(TrashClient {
            client,
            base_url: self.base_url,
            rate_limiter: RateLimiter::new(self.rate_limit_interval),
        })
    }
}
