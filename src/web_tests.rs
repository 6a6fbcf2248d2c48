//! Tests for the HTTP API using in-process requests

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::config::SyncConfig;
use crate::models::make_test_game;

fn state_with(base_url: &str) -> AppState {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let engine = SyncEngine::new(SyncConfig::without_delays(base_url, "alice"), store);
    AppState::new(Arc::new(engine))
}

fn offline_state() -> AppState {
    state_with("http://127.0.0.1:9")
}

async fn send(state: &AppState, verb: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(verb).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = create_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    // Extractor rejections answer in plain text
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
    send(state, Method::GET, uri, None).await
}

// ── Games ────────────────────────────────────────────────────────────

#[tokio::test]
async fn games_are_listed_with_ratings() {
    let state = offline_state();
    state.store().upsert_game(&make_test_game(13, "CATAN")).unwrap();
    state
        .store()
        .replace_player_ratings(
            13,
            &[PlayerRating {
                game_id: 13,
                num_players: 4,
                best_votes: 10,
                recommended_votes: 2,
                not_recommended_votes: 0,
            }],
        )
        .unwrap();

    let (status, json) = get_json(&state, "/api/games").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let game = &json["data"][0];
    assert_eq!(game["bggId"], 13);
    assert_eq!(game["name"], "CATAN");
    assert_eq!(game["playerRatings"][0]["numPlayers"], 4);

    let (_, json) = get_json(&state, "/api/games/count").await;
    assert_eq!(json["data"], 1);
}

#[tokio::test]
async fn missing_player_ratings_are_not_found() {
    let state = offline_state();
    let (status, json) = get_json(&state, "/api/games/13/player-ratings").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
    assert!(json.get("data").is_none());
}

#[tokio::test]
async fn expansions_are_served() {
    let state = offline_state();
    state.store().upsert_game(&make_test_game(13, "CATAN")).unwrap();
    let mut seafarers = make_test_game(325, "Seafarers");
    seafarers.base_game_id = Some(13);
    state.store().upsert_game(&seafarers).unwrap();

    let (_, json) = get_json(&state, "/api/expansions").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    let (_, json) = get_json(&state, "/api/expansions/count").await;
    assert_eq!(json["data"], 1);
    let (_, json) = get_json(&state, "/api/games/13/expansions").await;
    assert_eq!(json["data"][0]["bggId"], 325);

    let (status, json) = get_json(&state, "/api/expansions/325").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["baseGameId"], 13);
    let (status, _) = get_json(&state, "/api/expansions/13").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Tags ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn tags_can_be_added_listed_and_removed() {
    let state = offline_state();

    let (status, json) = send(&state, Method::POST, "/api/tags/13", Some(r#"{"tag":" family "}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"], "family");

    let (status, _) = send(&state, Method::POST, "/api/tags/13", Some(r#"{"tag":"family"}"#)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&state, Method::POST, "/api/tags/13", Some(r#"{"tag":"  "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = get_json(&state, "/api/tags/13").await;
    assert_eq!(json["data"], serde_json::json!(["family"]));
    let (_, json) = get_json(&state, "/api/tags").await;
    assert_eq!(json["data"], serde_json::json!(["family"]));

    let (status, _) = send(&state, Method::DELETE, "/api/tags/13/family", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&state, Method::DELETE, "/api/tags/13/family", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Refresh ──────────────────────────────────────────────────────────

const ONE_ITEM: &str = r#"<items totalitems="1">
  <item objecttype="thing" objectid="13" subtype="boardgame"><name>CATAN</name></item>
</items>"#;

const THING: &str = r#"<items><item type="boardgame" id="13">
  <statistics><ratings><average value="7.0"/></ratings></statistics>
</item></items>"#;

#[tokio::test]
async fn forced_refresh_reports_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collection"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ONE_ITEM))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/thing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(THING))
        .mount(&server)
        .await;
    let state = state_with(&server.uri());

    let (status, json) = send(&state, Method::POST, "/api/refresh?mode=full&force=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["added"], 1);
    assert_eq!(json["data"]["skipped"], false);

    let (status, json) = send(&state, Method::POST, "/api/refresh?mode=new", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["added"], 0);
}

#[tokio::test]
async fn collection_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collection"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let state = state_with(&server.uri());

    let (status, json) = send(&state, Method::POST, "/api/refresh?mode=full", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn overlapping_refresh_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collection"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<items></items>")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    let state = state_with(&server.uri());

    let first_state = state.clone();
    let first = tokio::spawn(async move {
        send(&first_state, Method::POST, "/api/refresh?mode=full&force=true", None).await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, _) = send(&state, Method::POST, "/api/refresh?mode=new", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_outlives_disconnected_client() {
    let server = MockServer::start().await;
    let ids = [1, 2, 3, 4];
    let items: String = ids
        .iter()
        .map(|id| format!(r#"<item objecttype="thing" objectid="{id}"><name>Game {id}</name></item>"#))
        .collect();
    Mock::given(method("GET"))
        .and(path("/collection"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("<items>{items}</items>")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/thing"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<items></items>")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    let state = state_with(&server.uri());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = create_router(state.clone());
    tokio::spawn(async move { axum::serve(listener, router).await });

    // The client gives up long before the four detail requests finish
    let result = reqwest::Client::new()
        .post(format!("http://{addr}/api/refresh?mode=full&force=true"))
        .timeout(Duration::from_millis(150))
        .send()
        .await;
    assert!(result.is_err());

    let mut waited = Duration::ZERO;
    while state.store().last_collection_update().unwrap().is_none()
        && waited < Duration::from_secs(5)
    {
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    }
    assert_eq!(state.store().count_games().unwrap(), 4);
    assert!(state.store().last_collection_update().unwrap().is_some());
}

#[tokio::test]
async fn unknown_refresh_mode_is_rejected() {
    let state = offline_state();
    let (status, _) = send(&state, Method::POST, "/api/refresh?mode=everything", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[test]
fn api_response_omits_missing_fields() {
    let response: ApiResponse<()> = ApiResponse {
        success: false,
        data: None,
        error: Some("Test error".to_string()),
    };

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":false"));
    assert!(json.contains("\"error\":\"Test error\""));
    assert!(!json.contains("\"data\""));
}
