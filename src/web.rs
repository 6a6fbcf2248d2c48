//! HTTP API over the mirrored collection
//!
//! Read endpoints for games, expansions and breakdown rows, tag editing, and
//! a trigger for manual refreshes. Every response uses the same
//! `{ success, data, error }` envelope.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::database::Store;
use crate::error::SyncError;
use crate::models::{BoardGame, GameWithRatings, PlayerRating, RefreshReport};
use crate::sync::SyncEngine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    engine: Arc<SyncEngine>,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    fn store(&self) -> &Store {
        self.engine.store()
    }
}

/// API response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })
}

/// Error status plus the message placed in the envelope
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", what))
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::RefreshInProgress(_) => StatusCode::CONFLICT,
            SyncError::TransientUnavailable { .. }
            | SyncError::Upstream(_)
            | SyncError::Network(_)
            | SyncError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            SyncError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            SyncError::Persistence(_) | SyncError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            log::error!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ── Games ──────────────────────────────────────────────────────────────────

/// GET /api/games
async fn list_games_handler(State(state): State<AppState>) -> ApiResult<Vec<GameWithRatings>> {
    Ok(ok(state.store().list_games_with_ratings()?))
}

/// GET /api/games/count
async fn count_games_handler(State(state): State<AppState>) -> ApiResult<i64> {
    Ok(ok(state.store().count_games()?))
}

/// GET /api/games/{id}/player-ratings
async fn player_ratings_handler(
    State(state): State<AppState>,
    Path(bgg_id): Path<i64>,
) -> ApiResult<Vec<PlayerRating>> {
    let rows = state.store().player_ratings_for(bgg_id)?;
    if rows.is_empty() {
        return Err(ApiError::not_found("Player ratings"));
    }
    Ok(ok(rows))
}

/// GET /api/games/{id}/expansions
async fn game_expansions_handler(
    State(state): State<AppState>,
    Path(bgg_id): Path<i64>,
) -> ApiResult<Vec<BoardGame>> {
    Ok(ok(state.store().expansions_for(bgg_id)?))
}

// ── Expansions ─────────────────────────────────────────────────────────────

/// GET /api/expansions
async fn list_expansions_handler(State(state): State<AppState>) -> ApiResult<Vec<BoardGame>> {
    Ok(ok(state.store().list_expansions()?))
}

/// GET /api/expansions/count
async fn count_expansions_handler(State(state): State<AppState>) -> ApiResult<i64> {
    Ok(ok(state.store().count_expansions()?))
}

/// GET /api/expansions/{id}
async fn expansion_handler(
    State(state): State<AppState>,
    Path(bgg_id): Path<i64>,
) -> ApiResult<BoardGame> {
    match state.store().get_expansion(bgg_id)? {
        Some(expansion) => Ok(ok(expansion)),
        None => Err(ApiError::not_found("Expansion")),
    }
}

// ── Tags ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NewTag {
    tag: String,
}

/// GET /api/tags
async fn all_tags_handler(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(ok(state.store().all_tags()?))
}

/// GET /api/tags/{id}
async fn game_tags_handler(
    State(state): State<AppState>,
    Path(bgg_id): Path<i64>,
) -> ApiResult<Vec<String>> {
    Ok(ok(state.store().tags_for_game(bgg_id)?))
}

/// POST /api/tags/{id} with `{ "tag": "..." }`
async fn add_tag_handler(
    State(state): State<AppState>,
    Path(bgg_id): Path<i64>,
    Json(body): Json<NewTag>,
) -> Result<(StatusCode, Json<ApiResponse<String>>), ApiError> {
    let tag = body.tag.trim();
    if tag.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Tag must not be empty"));
    }
    if !state.store().add_tag(bgg_id, tag)? {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("Game {} already has tag {:?}", bgg_id, tag),
        ));
    }
    log::info!("Tagged {} with {:?}", bgg_id, tag);
    Ok((StatusCode::CREATED, ok(tag.to_string())))
}

/// DELETE /api/tags/{id}/{tag}
async fn delete_tag_handler(
    State(state): State<AppState>,
    Path((bgg_id, tag)): Path<(i64, String)>,
) -> Result<StatusCode, ApiError> {
    if !state.store().delete_tag(bgg_id, &tag)? {
        return Err(ApiError::not_found("Tag"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── Refresh ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RefreshMode {
    /// Collection refresh, including details for every item
    #[default]
    Full,
    /// Detail refresh of stored games
    Details,
    /// Only games not stored yet
    New,
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    #[serde(default)]
    mode: RefreshMode,
    /// Ignore staleness thresholds
    #[serde(default)]
    force: bool,
}

/// POST /api/refresh?mode={full|details|new}&force={bool}
///
/// The refresh runs on its own task, so a client that disconnects mid-way
/// does not cancel it.
async fn refresh_handler(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> ApiResult<RefreshReport> {
    log::info!("Manual refresh requested: {:?}", params);
    let engine = Arc::clone(&state.engine);
    let task = tokio::spawn(async move { run_refresh(&engine, params).await });

    let report = task.await.map_err(|e| {
        log::error!("Manual refresh task failed: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "refresh task failed")
    })??;
    Ok(ok(report))
}

async fn run_refresh(
    engine: &SyncEngine,
    params: RefreshParams,
) -> crate::error::Result<RefreshReport> {
    let throttle = engine.config().manual_item_throttle;
    match params.mode {
        RefreshMode::Full => engine.refresh_collection(!params.force, throttle).await,
        RefreshMode::Details => engine.refresh_game_details(!params.force, throttle).await,
        RefreshMode::New => {
            let added = engine.refresh_new_games().await?;
            Ok(RefreshReport {
                added,
                ..RefreshReport::default()
            })
        }
    }
}

/// Build the web server router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/games", get(list_games_handler))
        .route("/api/games/count", get(count_games_handler))
        .route("/api/games/{id}/player-ratings", get(player_ratings_handler))
        .route("/api/games/{id}/expansions", get(game_expansions_handler))
        .route("/api/expansions", get(list_expansions_handler))
        .route("/api/expansions/count", get(count_expansions_handler))
        .route("/api/expansions/{id}", get(expansion_handler))
        .route("/api/tags", get(all_tags_handler))
        .route("/api/tags/{id}", get(game_tags_handler).post(add_tag_handler))
        .route("/api/tags/{id}/{tag}", delete(delete_tag_handler))
        .route("/api/refresh", post(refresh_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web server
///
/// Binds to 0.0.0.0 (all interfaces) to work with Docker port mapping.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", port);

    log::info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
#[path = "web_tests.rs"]
mod tests;
