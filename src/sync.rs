//! Refresh orchestration
//!
//! Collection and detail refreshes walk their items strictly one after the
//! other with a pause in between, so BGG only ever sees one request at a
//! time from this process. Each refresh kind holds its own guard; a second
//! invocation of the same kind fails fast instead of overlapping.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use crate::bgg::{BggClient, CollectionItem};
use crate::config::SyncConfig;
use crate::database::Store;
use crate::error::{RefreshKind, Result, SyncError};
use crate::models::RefreshReport;
use crate::reconcile::Reconciler;

/// Runs collection, new-items and detail refreshes against one store
pub struct SyncEngine {
    client: BggClient,
    store: Arc<Store>,
    config: SyncConfig,
    collection_guard: Mutex<()>,
    details_guard: Mutex<()>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, store: Arc<Store>) -> Self {
        Self {
            client: BggClient::new(&config),
            store,
            config,
            collection_guard: Mutex::new(()),
            details_guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.client, &self.store)
    }

    fn acquire(guard: &Mutex<()>, kind: RefreshKind) -> Result<MutexGuard<'_, ()>> {
        guard.try_lock().map_err(|_| {
            log::warn!("A {} refresh is already running, not starting another", kind);
            SyncError::RefreshInProgress(kind)
        })
    }

    /// Whether the last full collection fetch is older than the threshold
    fn collection_is_due(&self) -> Result<bool> {
        match self.store.last_collection_update()? {
            None => Ok(true),
            Some(last) => {
                let age = Utc::now() - last;
                log::debug!("Last collection refresh was {} minutes ago", age.num_minutes());
                Ok(age > self.config.collection_stale_after)
            }
        }
    }

    // ── Collection ─────────────────────────────────────────────────────

    /// Fetch the whole collection and upsert every item with fresh details.
    ///
    /// With `check_age` the refresh is skipped while the last one is younger
    /// than `collection_stale_after`. The refresh time is recorded only after
    /// every item has been visited; failing to record it fails the refresh.
    pub async fn refresh_collection(
        &self,
        check_age: bool,
        throttle: Duration,
    ) -> Result<RefreshReport> {
        let _guard = Self::acquire(&self.collection_guard, RefreshKind::Collection)?;

        if check_age && !self.collection_is_due()? {
            log::info!("Collection is fresh, skipping refresh");
            return Ok(RefreshReport::skipped());
        }

        log::info!("Refreshing collection...");
        let items = self.client.fetch_collection().await?;
        let report = self.upsert_items(items.iter(), throttle).await;

        self.store.set_last_collection_update(Utc::now())?;
        log::info!(
            "Collection refresh done: {} processed, {} added, {} updated, {} failed",
            report.processed,
            report.added,
            report.updated,
            report.failed
        );
        Ok(report)
    }

    /// Fetch the collection and upsert only items the store does not know yet.
    ///
    /// Returns the number of games added.
    pub async fn refresh_new_games(&self) -> Result<usize> {
        let _guard = Self::acquire(&self.collection_guard, RefreshKind::Collection)?;

        log::info!("Checking collection for new games...");
        let items = self.client.fetch_collection().await?;
        let known = self.store.game_ids()?;

        let mut seen = HashSet::new();
        let new_items: Vec<&CollectionItem> = items
            .iter()
            .filter(|item| match item.bgg_id() {
                Some(id) => !known.contains(&id) && seen.insert(id),
                None => false,
            })
            .collect();
        log::info!("Found {} new games in collection", new_items.len());

        let report = self
            .upsert_items(new_items.into_iter(), self.config.manual_item_throttle)
            .await;
        log::info!("Added {} new games", report.added);
        Ok(report.added)
    }

    async fn upsert_items<'i>(
        &self,
        items: impl Iterator<Item = &'i CollectionItem>,
        throttle: Duration,
    ) -> RefreshReport {
        let reconciler = self.reconciler();
        let mut report = RefreshReport::default();

        for item in items {
            if item.bgg_id().is_none() {
                log::warn!("Skipping collection item without id: {:?}", item.object_id);
                report.failed += 1;
                continue;
            }
            if report.processed > 0 && !throttle.is_zero() {
                tokio::time::sleep(throttle).await;
            }
            report.processed += 1;

            match reconciler.upsert_item(item).await {
                Ok(added) => {
                    report.updated += 1;
                    if added {
                        report.added += 1;
                    }
                }
                Err(e) => {
                    log::error!("Failed to store {} ({}): {}", item.name(), item.object_id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    // ── Details ────────────────────────────────────────────────────────

    /// Fetch fresh statistics for stored games, least recently fetched first.
    ///
    /// With `check_age` only games older than `games_stale_after` are
    /// visited. A failed game is logged and left for the next run.
    pub async fn refresh_game_details(
        &self,
        check_age: bool,
        throttle: Duration,
    ) -> Result<RefreshReport> {
        let _guard = Self::acquire(&self.details_guard, RefreshKind::Details)?;

        let cutoff = check_age.then(|| Utc::now() - self.config.games_stale_after);
        let stale = self.store.stale_games(cutoff)?;
        if stale.is_empty() {
            log::info!("No games due for a detail refresh");
            return Ok(RefreshReport {
                skipped: check_age,
                ..RefreshReport::default()
            });
        }
        log::info!("Refreshing details for {} games...", stale.len());

        let reconciler = self.reconciler();
        let mut report = RefreshReport::default();

        for (i, game) in stale.iter().enumerate() {
            if i > 0 && !throttle.is_zero() {
                tokio::time::sleep(throttle).await;
            }
            report.processed += 1;
            log::debug!(
                "Refreshing {} ({}), last fetched {}",
                game.name,
                game.bgg_id,
                game.fetched_at
            );

            let Some(stats) = self.client.fetch_item_details(game.bgg_id).await else {
                log::warn!("Skipping {} ({}): no details", game.name, game.bgg_id);
                report.failed += 1;
                continue;
            };

            match reconciler.update_item_stats(game.bgg_id, &stats) {
                Ok(true) => report.updated += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    log::error!("Failed to update {} ({}): {}", game.name, game.bgg_id, e);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Detail refresh done: {} updated, {} failed",
            report.updated,
            report.failed
        );
        Ok(report)
    }

    // ── Passes ─────────────────────────────────────────────────────────

    /// Collection refresh followed by detail refresh.
    ///
    /// A failed collection stage is logged; the detail stage runs anyway.
    pub async fn run_pass(&self, check_age: bool, throttle: Duration) {
        if let Err(e) = self.refresh_collection(check_age, throttle).await {
            log::error!("Collection refresh failed: {}", e);
        }
        if let Err(e) = self.refresh_game_details(check_age, throttle).await {
            log::error!("Detail refresh failed: {}", e);
        }
    }

    /// The nightly pass: staleness checks on, long pause between items
    pub async fn run_scheduled(&self) {
        log::info!("Scheduled refresh triggered");
        self.run_pass(true, self.config.scheduled_item_throttle).await;
    }

    /// Import the whole collection when the store holds no games yet
    pub async fn initial_import_if_empty(&self) -> Result<Option<RefreshReport>> {
        if self.store.count_games()? > 0 {
            return Ok(None);
        }
        log::info!("Store is empty, importing collection");
        let report = self
            .refresh_collection(false, self.config.manual_item_throttle)
            .await?;
        Ok(Some(report))
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
