//! Merge catalog data into stored games
//!
//! A game row and its breakdown rows are written as two separate steps. When
//! the second step fails the game simply has stale (or no) breakdown rows
//! until its next successful refresh.

use chrono::{DateTime, Utc};

use crate::bgg::stats::{parse_count, parse_decimal};
use crate::bgg::{collection_stats, BggClient, CollectionItem};
use crate::database::Store;
use crate::error::{Result, SyncError};
use crate::models::{BoardGame, StatsRecord};

/// Writes catalog results into the store for one item at a time
pub struct Reconciler<'a> {
    client: &'a BggClient,
    store: &'a Store,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a BggClient, store: &'a Store) -> Self {
        Self { client, store }
    }

    /// Fetch fresh statistics for a collection entry and upsert the merged game.
    ///
    /// Returns true when the game was not stored before.
    pub async fn upsert_item(&self, item: &CollectionItem) -> Result<bool> {
        let bgg_id = item.bgg_id().ok_or_else(|| {
            SyncError::MalformedResponse(format!(
                "collection item without numeric id: {:?}",
                item.object_id
            ))
        })?;

        let details = self.client.fetch_item_details(bgg_id).await;
        let existing = self.store.get_game(bgg_id)?;
        let now = Utc::now();

        let (stats, fetched_at) = match (&details, &existing) {
            (Some(stats), _) => (stats.clone(), now),
            (None, Some(game)) => {
                log::warn!(
                    "No details for {} ({}), keeping stored statistics",
                    item.name(),
                    bgg_id
                );
                (game.stats(), game.fetched_at)
            }
            (None, None) => {
                log::warn!(
                    "No details for new game {} ({}), using collection ratings",
                    item.name(),
                    bgg_id
                );
                (collection_stats(item), DateTime::<Utc>::UNIX_EPOCH)
            }
        };

        let game = merge_game(bgg_id, item, &stats, now, fetched_at);
        self.store.upsert_game(&game)?;

        if let Some(stats) = &details {
            let rows = stats.breakdown_rows(bgg_id);
            let count = self.store.replace_player_ratings(bgg_id, &rows)?;
            log::debug!("Stored {} player rating rows for {}", count, bgg_id);
        }

        let added = existing.is_none();
        if added && game.is_expansion() {
            log::info!("Added expansion {} ({})", game.name, bgg_id);
        } else if added {
            log::info!("Added {} ({})", game.name, bgg_id);
        } else {
            log::debug!("Updated {} ({})", game.name, bgg_id);
        }
        Ok(added)
    }

    /// Apply fresh statistics to an already stored game and replace its
    /// breakdown rows.
    ///
    /// Returns false when the game is no longer in the store.
    pub fn update_item_stats(&self, bgg_id: i64, stats: &StatsRecord) -> Result<bool> {
        if !self.store.update_game_stats(bgg_id, stats, Utc::now())? {
            log::warn!("Game {} disappeared before its statistics were stored", bgg_id);
            return Ok(false);
        }
        self.store
            .replace_player_ratings(bgg_id, &stats.breakdown_rows(bgg_id))?;
        Ok(true)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Build the stored game from the collection entry's own fields plus `stats`
fn merge_game(
    bgg_id: i64,
    item: &CollectionItem,
    stats: &StatsRecord,
    created_at: DateTime<Utc>,
    fetched_at: DateTime<Utc>,
) -> BoardGame {
    let entry = item.stats.clone().unwrap_or_default();
    let count_or = |raw: Option<&str>, default: i64| match parse_count(raw) {
        0 => default,
        n => n,
    };

    BoardGame {
        bgg_id,
        name: item.name().to_string(),
        thumbnail: non_empty(&item.thumbnail),
        image: non_empty(&item.image),
        year_published: item
            .yearpublished
            .as_deref()
            .and_then(|y| y.trim().parse().ok()),
        min_players: count_or(entry.min_players.as_deref(), 1),
        max_players: count_or(entry.max_players.as_deref(), 1),
        playtime: parse_count(entry.playing_time.as_deref()),
        min_playtime: parse_count(entry.min_playtime.as_deref()),
        max_playtime: parse_count(entry.max_playtime.as_deref()),
        bgg_rating: stats.bgg_rating,
        bayes_average: stats.bayes_average,
        std_deviation: stats.std_deviation,
        users_rated: stats.users_rated,
        average_weight: stats.average_weight,
        num_weights: stats.num_weights,
        my_rating: parse_decimal(entry.rating.as_ref().and_then(|r| r.value.as_deref())),
        num_owned: parse_count(entry.num_owned.as_deref()),
        base_game_id: stats.base_game_id,
        suggested_player_ages: stats.suggested_player_ages.clone(),
        created_at,
        fetched_at,
    }
}
