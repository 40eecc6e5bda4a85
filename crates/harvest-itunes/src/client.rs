// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{ItunesError, Result};
use crate::lookup::{AttemptOutcome, SearchBackend};
use crate::models::{SearchQuery, SearchResponse};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const ITUNES_API_BASE: &str = "https://itunes.apple.com";
const USER_AGENT: &str = concat!("preview-harvest/", env!("CARGO_PKG_VERSION"));

/// Statuses the search service uses for throttling or transient denial.
const THROTTLE_STATUSES: [u16; 3] = [403, 429, 503];

/// Longest slice of an error body kept in [`ItunesError::ApiError`].
const ERROR_BODY_PREFIX: usize = 200;

/// iTunes Search API client.
///
/// Each call is exactly one HTTP request; retrying is the job of
/// [`crate::MatchClient`]. The underlying connection pool lives as long as
/// the client value.
#[derive(Debug, Clone)]
pub struct ItunesClient {
    client: Client,
    base_url: String,
    country: String,
    entity: String,
    limit: u32,
}

impl ItunesClient {
    /// Create a new iTunes client with default settings.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a client builder for custom configuration.
    pub fn builder() -> ItunesClientBuilder {
        ItunesClientBuilder::default()
    }

    /// Build the search parameters this client sends for a free-text term.
    pub fn query_for(&self, term: impl Into<String>) -> SearchQuery {
        SearchQuery::new(term)
            .entity(self.entity.clone())
            .limit(self.limit)
            .country(self.country.clone())
    }

    /// Run a single search request.
    ///
    /// # Example
    /// ```no_run
    /// # use harvest_itunes::ItunesClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = ItunesClient::new()?;
    /// let response = client.search_tracks(&client.query_for("hello adele")).await?;
    /// println!("{} results", response.result_count);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn search_tracks(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let mut url = Url::parse(&format!("{}/search", self.base_url))
            .map_err(|e| ItunesError::InvalidResponse(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("term", &query.term)
            .append_pair("entity", &query.entity)
            .append_pair("limit", &query.limit.to_string())
            .append_pair("country", &query.country);

        trace!(target: "itunes", "GET {}", url);

        let response = self.client.get(url.as_str()).send().await?;

        let status = response.status();
        debug!(target: "itunes", "response status: {}", status);

        if THROTTLE_STATUSES.contains(&status.as_u16()) {
            return Err(ItunesError::Throttled {
                status: status.as_u16(),
            });
        }

        if status != reqwest::StatusCode::OK {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ItunesError::ApiError {
                status: status.as_u16(),
                message: message.chars().take(ERROR_BODY_PREFIX).collect(),
            });
        }

        let body = response.text().await?;
        trace!(target: "itunes", "response body: {}", body);

        serde_json::from_str(&body)
            .map_err(|e| ItunesError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait::async_trait]
impl SearchBackend for ItunesClient {
    async fn search(&self, term: &str) -> AttemptOutcome {
        match self.search_tracks(&self.query_for(term)).await {
            Ok(response) => match response.best() {
                Some(track) => AttemptOutcome::Success(track.into()),
                None => AttemptOutcome::NoMatch,
            },
            Err(e) if e.is_retryable() => AttemptOutcome::RetryableFailure(e),
            Err(e) => AttemptOutcome::TerminalFailure(e),
        }
    }
}

/// Builder for configuring an iTunes client.
#[derive(Debug)]
pub struct ItunesClientBuilder {
    base_url: String,
    country: String,
    entity: String,
    limit: u32,
    timeout: Duration,
}

impl Default for ItunesClientBuilder {
    fn default() -> Self {
        Self {
            base_url: ITUNES_API_BASE.to_string(),
            country: "US".to_string(),
            entity: "song".to_string(),
            limit: 5,
            timeout: Duration::from_secs(10),
        }
    }
}

impl ItunesClientBuilder {
    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Restrict results to one store country.
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Cap on results per request.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Set request timeout duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the iTunes client.
    pub fn build(self) -> Result<ItunesClient> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(ItunesClient {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            country: self.country,
            entity: self.entity,
            limit: self.limit,
        })
    }
}
