//! Board game collection sync
//!
//! Mirrors a BGG collection into SQLite and refreshes it daily.
//! Runs continuously by default; `--once`, `--force` and `--new-only` run a
//! single refresh and exit.

use boardgame_sync::{scheduler, web, Store, SyncConfig, SyncEngine};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// BoardGameGeek collection mirror - syncs owned games and their stats to SQLite
#[derive(Parser, Debug)]
#[command(name = "boardgame_sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// BGG user whose owned collection is mirrored
    #[arg(short, long, env = "BGG_USERNAME")]
    username: String,

    /// Bearer token for the BGG XML API
    #[arg(long, env = "BGG_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Run one refresh pass and exit (default: run continuously with daily schedule)
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Ignore staleness thresholds and refresh everything, then exit
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Only import games that are not in the database yet, then exit
    #[arg(long, default_value_t = false, conflicts_with = "force")]
    new_only: bool,

    /// Enable the HTTP API on specified port (default: disabled)
    #[arg(long)]
    web_port: Option<u16>,

    /// Local hour (0-23) of the daily refresh
    #[arg(long, default_value_t = 2)]
    schedule_hour: u32,

    /// IANA timezone of the daily refresh
    #[arg(long, default_value = "America/New_York")]
    timezone: String,

    /// Leave expansions out of the collection
    #[arg(long, default_value_t = false)]
    exclude_expansions: bool,
}

/// Returns the default database path: ~/.local/share/boardgame_sync/collection.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boardgame_sync")
        .join("collection.db")
        .to_string_lossy()
        .to_string()
}

fn build_config(args: &Args) -> boardgame_sync::Result<SyncConfig> {
    let mut config = SyncConfig::for_user(args.username.trim());
    config.api_token = args.api_token.clone().filter(|t| !t.is_empty());
    config.exclude_expansions = args.exclude_expansions;
    config.schedule_hour = args.schedule_hour;
    config.set_timezone(&args.timezone)?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting boardgame_sync...");
    log::info!("Database path: {}", db_path.display());

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    };

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let store = match Store::open(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let engine = Arc::new(SyncEngine::new(config, Arc::clone(&store)));
    run(&args, Arc::clone(&engine)).await;

    // Every other holder of the store is gone once the engine is dropped
    drop(engine);
    match Arc::try_unwrap(store) {
        Ok(store) => {
            if let Err(e) = store.close() {
                log::error!("Failed to close database: {}", e);
            }
        }
        Err(_) => log::warn!("Database still in use at shutdown, leaving it to drop"),
    }
}

async fn run(args: &Args, engine: Arc<SyncEngine>) {
    let manual = engine.config().manual_item_throttle;

    if args.new_only {
        match engine.refresh_new_games().await {
            Ok(added) => log::info!("Imported {} new games", added),
            Err(e) => log::error!("New games refresh failed: {}", e),
        }
        return;
    }
    if args.force {
        engine.run_pass(false, manual).await;
        return;
    }
    if args.once {
        engine.run_pass(true, manual).await;
        return;
    }

    // Spawn web server if --web-port specified
    let web_task = args.web_port.map(|port| {
        let state = web::AppState::new(Arc::clone(&engine));
        tokio::spawn(async move {
            if let Err(e) = web::serve(state, port).await {
                log::error!("Web server error: {}", e);
            }
        })
    });

    match engine.initial_import_if_empty().await {
        Ok(Some(report)) => log::info!("Initial import added {} games", report.added),
        Ok(None) => {}
        Err(e) => log::error!("Initial import failed: {}", e),
    }

    tokio::select! {
        _ = scheduler::run_daemon(Arc::clone(&engine)) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        }
    }

    if let Some(task) = web_task {
        task.abort();
        let _ = task.await;
    }
}
