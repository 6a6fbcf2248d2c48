//! Board game collection sync
//!
//! Mirrors a BoardGameGeek user's owned collection into SQLite, keeps the
//! per-game statistics fresh on a daily schedule, and serves the result over
//! a small HTTP API.

pub mod bgg;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod scheduler;
pub mod sync;
pub mod web;

pub use bgg::BggClient;
pub use config::SyncConfig;
pub use database::Store;
pub use error::{RefreshKind, Result, SyncError};
pub use models::{AgeVote, BoardGame, GameWithRatings, PlayerRating, RefreshReport, StatsRecord};
pub use reconcile::Reconciler;
pub use sync::SyncEngine;
