//! Catalog client for the BGG XML API v2
//!
//! Two read endpoints: the owned collection of one user and the statistics
//! of a single thing. Both may answer 202 while BGG prepares the result.

use std::time::Duration;

use crate::bgg::retry::{Attempt, RetryPolicy};
use crate::bgg::stats::parse_thing_stats;
use crate::bgg::xml::{parse_collection, parse_thing, CollectionItem};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::models::StatsRecord;

const USER_AGENT: &str = "boardgame_sync/1.0";

/// HTTP client for the collection and thing endpoints
pub struct BggClient {
    client: reqwest::Client,
    pub(crate) base_url: String,
    username: String,
    api_token: Option<String>,
    exclude_expansions: bool,
    collection_retry: RetryPolicy,
    details_retry: RetryPolicy,
    request_throttle: Duration,
    collection_timeout: Duration,
    details_timeout: Duration,
}

impl BggClient {
    pub fn new(config: &SyncConfig) -> Self {
        log::info!("Creating BGG client for user {}", config.username);
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            api_token: config.api_token.clone(),
            exclude_expansions: config.exclude_expansions,
            collection_retry: RetryPolicy::new(config.collection_max_attempts, config.retry_delay),
            details_retry: RetryPolicy::new(config.details_max_attempts, config.retry_delay),
            request_throttle: config.request_throttle,
            collection_timeout: config.collection_timeout,
            details_timeout: config.details_timeout,
        }
    }

    fn collection_url(&self) -> String {
        let mut url = format!(
            "{}/collection?username={}&own=1&stats=1",
            self.base_url,
            urlencoding::encode(&self.username)
        );
        if self.exclude_expansions {
            url.push_str("&excludesubtype=boardgameexpansion");
        }
        url
    }

    fn thing_url(&self, bgg_id: i64) -> String {
        format!("{}/thing?id={}&stats=1", self.base_url, bgg_id)
    }

    /// One request; 202 maps to `Processing`, other non-2xx to `Upstream`
    async fn get_xml(&self, url: &str, timeout: Duration) -> Result<Attempt<String>> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .timeout(timeout);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(Attempt::Processing);
        }
        if !status.is_success() {
            return Err(SyncError::Upstream(status));
        }

        Ok(Attempt::Ready(response.text().await?))
    }

    /// Fetch every owned item of the configured user.
    ///
    /// Fails with `TransientUnavailable` when BGG never finishes processing
    /// and `Upstream` on error statuses. An empty or malformed document is
    /// an empty collection.
    pub async fn fetch_collection(&self) -> Result<Vec<CollectionItem>> {
        let url = self.collection_url();
        log::info!("Fetching BGG collection for user: {}", self.username);

        let body = self
            .collection_retry
            .run("BGG /collection", |attempt| {
                log::debug!("Collection request attempt {}", attempt);
                self.get_xml(&url, self.collection_timeout)
            })
            .await?;

        match parse_collection(&body) {
            Ok(items) => {
                log::info!("Fetched {} collection items", items.len());
                Ok(items)
            }
            Err(e) => {
                log::warn!("BGG collection response empty or malformed: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Fetch and parse the statistics of one item.
    ///
    /// Always waits the request throttle first. Every failure is logged and
    /// becomes `None` so a batch refresh can carry on with the next item.
    pub async fn fetch_item_details(&self, bgg_id: i64) -> Option<StatsRecord> {
        if !self.request_throttle.is_zero() {
            tokio::time::sleep(self.request_throttle).await;
        }

        log::debug!("Fetching details for game ID: {}", bgg_id);
        let url = self.thing_url(bgg_id);
        let label = format!("BGG /thing {}", bgg_id);

        let body = match self
            .details_retry
            .run(&label, |_| self.get_xml(&url, self.details_timeout))
            .await
        {
            Ok(body) => body,
            Err(e) => {
                log::error!("Fetching details for {} failed: {}", bgg_id, e);
                return None;
            }
        };

        match parse_thing(&body) {
            Ok(Some(item)) => Some(parse_thing_stats(&item)),
            Ok(None) => {
                log::warn!("BGG returned no item for {}", bgg_id);
                None
            }
            Err(e) => {
                log::warn!("Malformed details response for {}: {}", bgg_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
