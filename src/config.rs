//! Runtime configuration for the sync engine

use chrono::Duration as ChronoDuration;
use chrono_tz::Tz;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Public BGG XML API v2 endpoint
pub const DEFAULT_BASE_URL: &str = "https://boardgamegeek.com/xmlapi2";

/// Tunables shared by the catalog client, orchestrator and scheduler
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the catalog API (overridden in tests)
    pub base_url: String,
    /// BGG user whose owned collection is mirrored
    pub username: String,
    /// Optional bearer token sent with every request
    pub api_token: Option<String>,
    /// Ask BGG to leave expansions out of the collection response
    pub exclude_expansions: bool,
    /// Attempts for the collection request before giving up
    pub collection_max_attempts: u32,
    /// Attempts for a single detail request before giving up
    pub details_max_attempts: u32,
    /// Pause after a "still processing" answer
    pub retry_delay: Duration,
    /// Mandatory pause before every detail request
    pub request_throttle: Duration,
    /// Pause between items during scheduled refreshes
    pub scheduled_item_throttle: Duration,
    /// Pause between items during manual refreshes
    pub manual_item_throttle: Duration,
    /// Age after which the collection is fetched again
    pub collection_stale_after: ChronoDuration,
    /// Age after which a game's statistics are fetched again
    pub games_stale_after: ChronoDuration,
    /// Per-request timeout for the collection endpoint
    pub collection_timeout: Duration,
    /// Per-request timeout for the thing endpoint
    pub details_timeout: Duration,
    /// Local hour at which the scheduled refresh runs
    pub schedule_hour: u32,
    /// Timezone of `schedule_hour`
    pub timezone: Tz,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: String::new(),
            api_token: None,
            exclude_expansions: false,
            collection_max_attempts: 5,
            details_max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            request_throttle: Duration::from_secs(3),
            scheduled_item_throttle: Duration::from_secs(60),
            manual_item_throttle: Duration::from_secs(3),
            collection_stale_after: ChronoDuration::days(1),
            games_stale_after: ChronoDuration::days(7),
            collection_timeout: Duration::from_secs(15),
            details_timeout: Duration::from_secs(10),
            schedule_hour: 2,
            timezone: chrono_tz::America::New_York,
        }
    }
}

impl SyncConfig {
    /// Default configuration for the given BGG user
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Configuration with every delay set to zero, pointed at a mock server
    pub fn without_delays(base_url: &str, username: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            retry_delay: Duration::ZERO,
            request_throttle: Duration::ZERO,
            scheduled_item_throttle: Duration::ZERO,
            manual_item_throttle: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Set `timezone` from an IANA name such as `Europe/Berlin`
    pub fn set_timezone(&mut self, name: &str) -> Result<()> {
        self.timezone = name
            .parse::<Tz>()
            .map_err(|e| SyncError::InvalidConfig(format!("unknown timezone {:?}: {}", name, e)))?;
        Ok(())
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "a BGG username is required".to_string(),
            ));
        }
        if self.collection_max_attempts == 0 || self.details_max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "retry attempts must be at least 1".to_string(),
            ));
        }
        if self.schedule_hour > 23 {
            return Err(SyncError::InvalidConfig(format!(
                "schedule hour {} is not between 0 and 23",
                self.schedule_hour
            )));
        }
        Ok(())
    }
}
