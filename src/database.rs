//! SQLite store for the mirrored collection
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! The store is opened and closed explicitly and handed to whoever needs it;
//! the connection lock is only held for one statement group at a time.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::models::{AgeVote, BoardGame, GameWithRatings, PlayerRating, StatsRecord};

/// Timestamps are stored as UTC RFC 3339 with milliseconds, which sorts lexically
pub fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_db_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("Unreadable timestamp {:?} in database: {}", raw, e);
            DateTime::<Utc>::default()
        })
}

/// Initialize the database schema
///
/// - `games`: one row per mirrored item
/// - `player_ratings`: breakdown rows, replaced wholesale per game
/// - `tags`: user-supplied labels, untouched by synchronization
/// - `refresh_meta`: singleton row with the last collection refresh time
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS games (
            bgg_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            thumbnail TEXT,
            image TEXT,
            year_published INTEGER,
            min_players INTEGER NOT NULL DEFAULT 1,
            max_players INTEGER NOT NULL DEFAULT 1,
            playtime INTEGER NOT NULL DEFAULT 0,
            min_playtime INTEGER NOT NULL DEFAULT 0,
            max_playtime INTEGER NOT NULL DEFAULT 0,
            bgg_rating REAL,
            bayes_average REAL,
            std_deviation REAL,
            users_rated INTEGER NOT NULL DEFAULT 0,
            average_weight REAL,
            num_weights INTEGER NOT NULL DEFAULT 0,
            my_rating REAL,
            num_owned INTEGER NOT NULL DEFAULT 0,
            base_game_id INTEGER,
            suggested_player_ages TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_games_fetched_at ON games(fetched_at);
        CREATE INDEX IF NOT EXISTS idx_games_base_game ON games(base_game_id);

        -- No foreign key: rows are owned by their game but replaced independently
        CREATE TABLE IF NOT EXISTS player_ratings (
            game_id INTEGER NOT NULL,
            num_players INTEGER NOT NULL,
            best_votes INTEGER NOT NULL DEFAULT 0,
            recommended_votes INTEGER NOT NULL DEFAULT 0,
            not_recommended_votes INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (game_id, num_players)
        );

        CREATE TABLE IF NOT EXISTS tags (
            bgg_id INTEGER NOT NULL,
            tag TEXT NOT NULL,
            UNIQUE (bgg_id, tag)
        );

        CREATE INDEX IF NOT EXISTS idx_tags_bgg_id ON tags(bgg_id);

        CREATE TABLE IF NOT EXISTS refresh_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_collection_update TEXT NOT NULL
        );
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

const GAME_COLUMNS: &str = "bgg_id, name, thumbnail, image, year_published,
    min_players, max_players, playtime, min_playtime, max_playtime,
    bgg_rating, bayes_average, std_deviation, users_rated, average_weight, num_weights,
    my_rating, num_owned, base_game_id, suggested_player_ages, created_at, fetched_at";

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<BoardGame> {
    let ages_json: String = row.get(19)?;
    let suggested_player_ages: Vec<AgeVote> = serde_json::from_str(&ages_json).unwrap_or_else(|e| {
        log::warn!("Unreadable suggested_player_ages {:?}: {}", ages_json, e);
        Vec::new()
    });
    let created_at: String = row.get(20)?;
    let fetched_at: String = row.get(21)?;

    Ok(BoardGame {
        bgg_id: row.get(0)?,
        name: row.get(1)?,
        thumbnail: row.get(2)?,
        image: row.get(3)?,
        year_published: row.get(4)?,
        min_players: row.get(5)?,
        max_players: row.get(6)?,
        playtime: row.get(7)?,
        min_playtime: row.get(8)?,
        max_playtime: row.get(9)?,
        bgg_rating: row.get(10)?,
        bayes_average: row.get(11)?,
        std_deviation: row.get(12)?,
        users_rated: row.get(13)?,
        average_weight: row.get(14)?,
        num_weights: row.get(15)?,
        my_rating: row.get(16)?,
        num_owned: row.get(17)?,
        base_game_id: row.get(18)?,
        suggested_player_ages,
        created_at: from_db_time(&created_at),
        fetched_at: from_db_time(&fetched_at),
    })
}

fn rating_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerRating> {
    Ok(PlayerRating {
        game_id: row.get(0)?,
        num_players: row.get(1)?,
        best_votes: row.get(2)?,
        recommended_votes: row.get(3)?,
        not_recommended_votes: row.get(4)?,
    })
}

/// A game due for a detail refresh
#[derive(Debug, Clone, PartialEq)]
pub struct StaleGame {
    pub bgg_id: i64,
    pub name: String,
    pub fetched_at: DateTime<Utc>,
}

/// Explicitly constructed handle on the SQLite database
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        log::info!("Opened database: {}", path.display());
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Flush and close the connection
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);
        conn.close().map_err(|(_, e)| e)?;
        log::info!("Database closed");
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Games ──────────────────────────────────────────────────────────

    /// Insert a game or replace every field except `created_at`.
    ///
    /// `fetched_at` never moves backwards.
    pub fn upsert_game(&self, game: &BoardGame) -> Result<()> {
        let ages = serde_json::to_string(&game.suggested_player_ages)?;
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO games
             (bgg_id, name, thumbnail, image, year_published,
              min_players, max_players, playtime, min_playtime, max_playtime,
              bgg_rating, bayes_average, std_deviation, users_rated, average_weight, num_weights,
              my_rating, num_owned, base_game_id, suggested_player_ages, created_at, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22)
             ON CONFLICT(bgg_id) DO UPDATE SET
                name = excluded.name,
                thumbnail = excluded.thumbnail,
                image = excluded.image,
                year_published = excluded.year_published,
                min_players = excluded.min_players,
                max_players = excluded.max_players,
                playtime = excluded.playtime,
                min_playtime = excluded.min_playtime,
                max_playtime = excluded.max_playtime,
                bgg_rating = excluded.bgg_rating,
                bayes_average = excluded.bayes_average,
                std_deviation = excluded.std_deviation,
                users_rated = excluded.users_rated,
                average_weight = excluded.average_weight,
                num_weights = excluded.num_weights,
                my_rating = excluded.my_rating,
                num_owned = excluded.num_owned,
                base_game_id = excluded.base_game_id,
                suggested_player_ages = excluded.suggested_player_ages,
                fetched_at = MAX(games.fetched_at, excluded.fetched_at)",
        )?;

        stmt.execute(params![
            game.bgg_id,
            &game.name,
            &game.thumbnail,
            &game.image,
            game.year_published,
            game.min_players,
            game.max_players,
            game.playtime,
            game.min_playtime,
            game.max_playtime,
            game.bgg_rating,
            game.bayes_average,
            game.std_deviation,
            game.users_rated,
            game.average_weight,
            game.num_weights,
            game.my_rating,
            game.num_owned,
            game.base_game_id,
            ages,
            to_db_time(game.created_at),
            to_db_time(game.fetched_at),
        ])?;
        Ok(())
    }

    /// Overwrite only the statistics fields and `fetched_at` of one game.
    ///
    /// Returns false when the game is not in the store.
    pub fn update_game_stats(
        &self,
        bgg_id: i64,
        stats: &StatsRecord,
        fetched_at: DateTime<Utc>,
    ) -> Result<bool> {
        let ages = serde_json::to_string(&stats.suggested_player_ages)?;
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE games SET
                bgg_rating = ?2,
                bayes_average = ?3,
                std_deviation = ?4,
                users_rated = ?5,
                average_weight = ?6,
                num_weights = ?7,
                base_game_id = ?8,
                suggested_player_ages = ?9,
                fetched_at = MAX(fetched_at, ?10)
             WHERE bgg_id = ?1",
            params![
                bgg_id,
                stats.bgg_rating,
                stats.bayes_average,
                stats.std_deviation,
                stats.users_rated,
                stats.average_weight,
                stats.num_weights,
                stats.base_game_id,
                ages,
                to_db_time(fetched_at),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Get a game by its BGG id
    pub fn get_game(&self, bgg_id: i64) -> Result<Option<BoardGame>> {
        let conn = self.conn();
        let sql = format!("SELECT {GAME_COLUMNS} FROM games WHERE bgg_id = ?1");
        let game = conn
            .query_row(&sql, params![bgg_id], game_from_row)
            .optional()?;
        Ok(game)
    }

    /// Ids of every stored game
    pub fn game_ids(&self) -> Result<HashSet<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT bgg_id FROM games")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<i64>>>()?;
        Ok(ids)
    }

    /// Games whose `fetched_at` is older than `cutoff` (all games when `None`),
    /// least recently fetched first
    pub fn stale_games(&self, cutoff: Option<DateTime<Utc>>) -> Result<Vec<StaleGame>> {
        let conn = self.conn();
        let map_row = |row: &Row<'_>| -> rusqlite::Result<StaleGame> {
            let fetched_at: String = row.get(2)?;
            Ok(StaleGame {
                bgg_id: row.get(0)?,
                name: row.get(1)?,
                fetched_at: from_db_time(&fetched_at),
            })
        };

        let games = match cutoff {
            Some(cutoff) => {
                let mut stmt = conn.prepare(
                    "SELECT bgg_id, name, fetched_at FROM games
                     WHERE fetched_at < ?1
                     ORDER BY fetched_at ASC, bgg_id ASC",
                )?;
                let rows = stmt.query_map(params![to_db_time(cutoff)], map_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT bgg_id, name, fetched_at FROM games
                     ORDER BY fetched_at ASC, bgg_id ASC",
                )?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(games)
    }

    /// Total number of games
    pub fn count_games(&self) -> Result<i64> {
        let conn = self.conn();
        Ok(conn.query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?)
    }

    /// Every game with its breakdown rows embedded, ordered by name
    pub fn list_games_with_ratings(&self) -> Result<Vec<GameWithRatings>> {
        let conn = self.conn();

        let mut ratings: HashMap<i64, Vec<PlayerRating>> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT game_id, num_players, best_votes, recommended_votes, not_recommended_votes
                 FROM player_ratings
                 ORDER BY game_id, num_players",
            )?;
            for rating in stmt.query_map([], rating_from_row)? {
                let rating = rating?;
                ratings.entry(rating.game_id).or_default().push(rating);
            }
        }

        let sql = format!("SELECT {GAME_COLUMNS} FROM games ORDER BY name COLLATE NOCASE, bgg_id");
        let mut stmt = conn.prepare(&sql)?;
        let games = stmt
            .query_map([], game_from_row)?
            .map(|game| {
                game.map(|game| GameWithRatings {
                    player_ratings: ratings.remove(&game.bgg_id).unwrap_or_default(),
                    game,
                })
            })
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(games)
    }

    // ── Expansions ─────────────────────────────────────────────────────

    fn query_games(&self, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<BoardGame>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE {where_clause} ORDER BY name COLLATE NOCASE, bgg_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let games = stmt
            .query_map(args, game_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(games)
    }

    /// All games that are expansions of another game
    pub fn list_expansions(&self) -> Result<Vec<BoardGame>> {
        self.query_games("base_game_id IS NOT NULL", &[])
    }

    pub fn count_expansions(&self) -> Result<i64> {
        let conn = self.conn();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM games WHERE base_game_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?)
    }

    /// One expansion; `None` when missing or not an expansion
    pub fn get_expansion(&self, bgg_id: i64) -> Result<Option<BoardGame>> {
        Ok(self
            .query_games("bgg_id = ?1 AND base_game_id IS NOT NULL", &[&bgg_id])?
            .into_iter()
            .next())
    }

    /// Expansions whose base game is `base_game_id`
    pub fn expansions_for(&self, base_game_id: i64) -> Result<Vec<BoardGame>> {
        self.query_games("base_game_id = ?1", &[&base_game_id])
    }

    // ── Player ratings ─────────────────────────────────────────────────

    /// Delete every breakdown row of `game_id` and insert `rows` instead.
    ///
    /// Both steps share one transaction.
    pub fn replace_player_ratings(&self, game_id: i64, rows: &[PlayerRating]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM player_ratings WHERE game_id = ?1",
            params![game_id],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO player_ratings
                 (game_id, num_players, best_votes, recommended_votes, not_recommended_votes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                stmt.execute(params![
                    game_id,
                    row.num_players,
                    row.best_votes,
                    row.recommended_votes,
                    row.not_recommended_votes,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Breakdown rows of one game, by player count
    pub fn player_ratings_for(&self, game_id: i64) -> Result<Vec<PlayerRating>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT game_id, num_players, best_votes, recommended_votes, not_recommended_votes
             FROM player_ratings
             WHERE game_id = ?1
             ORDER BY num_players",
        )?;
        let rows = stmt
            .query_map(params![game_id], rating_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Tags ───────────────────────────────────────────────────────────

    /// Add a tag to a game; returns false when the game already had it
    pub fn add_tag(&self, bgg_id: i64, tag: &str) -> Result<bool> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tags (bgg_id, tag) VALUES (?1, ?2)",
            params![bgg_id, tag],
        )?;
        Ok(inserted > 0)
    }

    /// Remove a tag from a game; returns false when it was not there
    pub fn delete_tag(&self, bgg_id: i64, tag: &str) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM tags WHERE bgg_id = ?1 AND tag = ?2",
            params![bgg_id, tag],
        )?;
        Ok(deleted > 0)
    }

    pub fn tags_for_game(&self, bgg_id: i64) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT tag FROM tags WHERE bgg_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map(params![bgg_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tags)
    }

    /// Every distinct tag, for autocompletion
    pub fn all_tags(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT tag FROM tags ORDER BY tag")?;
        let tags = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tags)
    }

    // ── Refresh meta ───────────────────────────────────────────────────

    /// When the collection was last fetched in full, if ever
    pub fn last_collection_update(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT last_collection_update FROM refresh_meta WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.as_deref().map(from_db_time))
    }

    pub fn set_last_collection_update(&self, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO refresh_meta (id, last_collection_update) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET last_collection_update = excluded.last_collection_update",
            params![to_db_time(at)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "database_tests.rs"]
mod tests;
