//! Records mirrored from the catalog and stored locally

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One board game (or expansion) from the owned collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardGame {
    pub bgg_id: i64,
    pub name: String,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub year_published: Option<i32>,
    pub min_players: i64,
    pub max_players: i64,
    pub playtime: i64,
    pub min_playtime: i64,
    pub max_playtime: i64,
    pub bgg_rating: Option<f64>,
    pub bayes_average: Option<f64>,
    pub std_deviation: Option<f64>,
    pub users_rated: i64,
    pub average_weight: Option<f64>,
    pub num_weights: i64,
    /// The collection owner's own rating
    pub my_rating: Option<f64>,
    pub num_owned: i64,
    /// Set only for expansions; the parent may not be synced yet
    pub base_game_id: Option<i64>,
    pub suggested_player_ages: Vec<AgeVote>,
    pub created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

impl BoardGame {
    /// Statistics currently held by this game (without breakdown rows)
    pub fn stats(&self) -> StatsRecord {
        StatsRecord {
            bgg_rating: self.bgg_rating,
            bayes_average: self.bayes_average,
            std_deviation: self.std_deviation,
            users_rated: self.users_rated,
            average_weight: self.average_weight,
            num_weights: self.num_weights,
            player_ratings: BTreeMap::new(),
            suggested_player_ages: self.suggested_player_ages.clone(),
            base_game_id: self.base_game_id,
        }
    }

    /// Whether this game is an expansion of another game
    pub fn is_expansion(&self) -> bool {
        self.base_game_id.is_some()
    }
}

/// Vote tally for one player count, owned by its game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRating {
    pub game_id: i64,
    pub num_players: u32,
    pub best_votes: i64,
    pub recommended_votes: i64,
    pub not_recommended_votes: i64,
}

/// Votes cast in the suggested player count poll for one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerVotes {
    pub best: i64,
    pub recommended: i64,
    pub not_recommended: i64,
}

/// Votes for one minimum player age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeVote {
    pub age: u32,
    pub votes: i64,
}

/// Per-game statistics parsed from a thing response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    pub bgg_rating: Option<f64>,
    pub bayes_average: Option<f64>,
    pub std_deviation: Option<f64>,
    pub users_rated: i64,
    pub average_weight: Option<f64>,
    pub num_weights: i64,
    /// Keyed by numeric player count
    pub player_ratings: BTreeMap<u32, PlayerVotes>,
    /// Ordered by age
    pub suggested_player_ages: Vec<AgeVote>,
    pub base_game_id: Option<i64>,
}

impl StatsRecord {
    /// Breakdown rows for `game_id`, one per player count
    pub fn breakdown_rows(&self, game_id: i64) -> Vec<PlayerRating> {
        self.player_ratings
            .iter()
            .map(|(num_players, votes)| PlayerRating {
                game_id,
                num_players: *num_players,
                best_votes: votes.best,
                recommended_votes: votes.recommended,
                not_recommended_votes: votes.not_recommended,
            })
            .collect()
    }
}

/// A game with its breakdown rows embedded, as served to readers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameWithRatings {
    #[serde(flatten)]
    pub game: BoardGame,
    pub player_ratings: Vec<PlayerRating>,
}

/// Outcome of one refresh invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    /// The staleness check found nothing to do
    pub skipped: bool,
    /// Items visited
    pub processed: usize,
    /// Items written to the store
    pub updated: usize,
    /// Items that failed and were left for the next run
    pub failed: usize,
    /// Items that were not in the store before
    pub added: usize,
}

impl RefreshReport {
    /// Report for a refresh that was not due
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
pub(crate) use tests::make_test_game;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Create a test game with default values
    pub(crate) fn make_test_game(bgg_id: i64, name: &str) -> BoardGame {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        BoardGame {
            bgg_id,
            name: name.to_string(),
            thumbnail: None,
            image: None,
            year_published: Some(2020),
            min_players: 2,
            max_players: 4,
            playtime: 60,
            min_playtime: 45,
            max_playtime: 60,
            bgg_rating: Some(7.0),
            bayes_average: Some(6.5),
            std_deviation: Some(1.2),
            users_rated: 100,
            average_weight: Some(2.5),
            num_weights: 20,
            my_rating: None,
            num_owned: 1,
            base_game_id: None,
            suggested_player_ages: vec![AgeVote { age: 10, votes: 5 }],
            created_at: at,
            fetched_at: at,
        }
    }

    #[test]
    fn expansion_is_detected_from_base_game_link() {
        let mut game = make_test_game(325, "Seafarers");
        assert!(!game.is_expansion());
        game.base_game_id = Some(13);
        assert!(game.is_expansion());
    }

    #[test]
    fn breakdown_rows_follow_player_count_order() {
        let mut stats = StatsRecord::default();
        stats.player_ratings.insert(
            4,
            PlayerVotes {
                best: 10,
                recommended: 5,
                not_recommended: 1,
            },
        );
        stats.player_ratings.insert(2, PlayerVotes::default());

        let rows = stats.breakdown_rows(13);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].num_players, 2);
        assert_eq!(rows[1].num_players, 4);
        assert_eq!(rows[1].best_votes, 10);
        assert!(rows.iter().all(|r| r.game_id == 13));
    }

    #[test]
    fn refresh_report_serializes_camel_case() {
        let json = serde_json::to_string(&RefreshReport::skipped()).unwrap();
        assert!(json.contains("\"skipped\":true"));
        assert!(json.contains("\"processed\":0"));
    }
}
