//! HTTP server for track endpoints
//!
//! Provides /health, /cache, /tracks and /tracks/:name endpoints.

use crate::types::{CacheListResponse, HealthResponse, PublishResponse};
use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::fs;
use tower_http::cors::CorsLayer;
use track_fetcher::HttpFetcher;
use track_gate::{FetchGate, GateError, Track, TrackCatalog};
use tracing::{error, info, warn};

static X_CACHE: HeaderName = HeaderName::from_static("x-cache");
static X_CATALOG_REVISION: HeaderName = HeaderName::from_static("x-catalog-revision");

/// Shared state for the HTTP server
pub struct ServerState {
    pub gate: Arc<FetchGate<HttpFetcher>>,
    pub catalog: TrackCatalog,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(gate: FetchGate<HttpFetcher>, catalog: TrackCatalog) -> Self {
        Self {
            gate: Arc::new(gate),
            catalog,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cache", get(list_cache))
        .route("/tracks", get(list_tracks).put(publish_tracks))
        .route("/tracks/{name}", get(get_track))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    let (status, cache) = match state.gate.store().stats().await {
        Ok(stats) => ("ok", stats),
        Err(e) => {
            warn!(error = %e, "Failed to read cache stats");
            ("degraded", Default::default())
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        uptime_secs,
        cache,
        gate: state.gate.stats(),
        catalog_revision: state.catalog.revision(),
    })
}

/// Names of all cached tracks
async fn list_cache(State(state): State<SharedState>) -> Response {
    match state.gate.store().list_all().await {
        Ok(entries) => Json(CacheListResponse { entries }).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list cache");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list cache")
        }
    }
}

/// Current track list snapshot
async fn list_tracks(State(state): State<SharedState>) -> Response {
    let snapshot = state.catalog.snapshot();
    Json(snapshot.as_ref()).into_response()
}

/// Replace the track list
async fn publish_tracks(
    State(state): State<SharedState>,
    Json(tracks): Json<Vec<Track>>,
) -> Json<PublishResponse> {
    let count = tracks.len();
    let revision = state.catalog.publish(tracks);
    Json(PublishResponse {
        revision,
        tracks: count,
    })
}

/// Serve a track by name, downloading it on a cache miss
///
/// The download runs detached, so a client that disconnects mid-transfer
/// still leaves the track cached.
async fn get_track(State(state): State<SharedState>, Path(name): Path<String>) -> Response {
    let snapshot = state.catalog.snapshot();
    let Some(track) = snapshot.find(&name) else {
        return error_response(StatusCode::NOT_FOUND, "Track not found");
    };

    let resolved = match state.gate.resolve_track_detached(track).await {
        Ok(resolved) => resolved,
        Err(e @ GateError::Network(_)) => {
            warn!(name = %name, error = %e, "Failed to download track");
            return error_response(StatusCode::BAD_GATEWAY, "Failed to download track");
        }
        Err(e) => {
            error!(name = %name, error = %e, "Failed to resolve track");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to cache track");
        }
    };

    // The file can be evicted by a concurrent miss before we get to read it
    let data = match fs::read(&resolved.location).await {
        Ok(data) => data,
        Err(e) => {
            warn!(name = %name, path = ?resolved.location, error = %e, "Failed to read cached track");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read track");
        }
    };

    let cache_header = if resolved.is_hit() { "HIT" } else { "MISS" };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for(&resolved.location).to_string()),
            (X_CACHE.clone(), cache_header.to_string()),
            (X_CATALOG_REVISION.clone(), snapshot.revision.to_string()),
        ],
        data,
    )
        .into_response()
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp3") => "audio/mpeg",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        Some("m4a") | Some("mp4") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::path::PathBuf;
    use tempfile::tempdir;
    use tower::ServiceExt;
    use track_cache::CacheStore;

    // Nothing listens here, so any download attempt fails fast
    const UNREACHABLE: &str = "http://127.0.0.1:1/tracks";

    async fn create_test_state(cache_dir: PathBuf) -> SharedState {
        let store = CacheStore::new(cache_dir, 5);
        store.init().await.unwrap();
        let gate = FetchGate::new(store, HttpFetcher::new());
        Arc::new(ServerState::new(gate, TrackCatalog::new()))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf()).await;
        let router = create_router(state);

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["cache"]["capacity"], 5);
        assert_eq!(json["gate"]["hits"], 0);
        assert_eq!(json["catalog_revision"], 0);
    }

    #[tokio::test]
    async fn test_cache_endpoint_lists_entries() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf()).await;
        state.gate.store().write("b.mp3", b"audio").await.unwrap();
        state.gate.store().write("a.mp3", b"audio").await.unwrap();
        let router = create_router(state);

        let response = router
            .oneshot(Request::builder().uri("/cache").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["entries"], serde_json::json!(["a.mp3", "b.mp3"]));
    }

    #[tokio::test]
    async fn test_publish_and_list_tracks() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf()).await;
        let router = create_router(state);

        let body = r#"[
            {"musicName": "Morning.mp3", "downloadUrl": "https://music.example/Morning.mp3"},
            {"name": "Evening.mp3", "downloadUrl": "https://music.example/Evening.mp3", "artist": "Someone"}
        ]"#;
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/tracks")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["revision"], 1);
        assert_eq!(json["tracks"], 2);

        let response = router
            .oneshot(Request::builder().uri("/tracks").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["revision"], 1);
        assert_eq!(json["tracks"][0]["name"], "Morning.mp3");
        assert_eq!(json["tracks"][1]["artist"], "Someone");
    }

    #[tokio::test]
    async fn test_unknown_track_not_found() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf()).await;
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/tracks/missing.mp3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cached_track_served_without_download() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf()).await;
        state.catalog.publish(vec![
            Track::new("Song.mp3", format!("{}/Song.mp3", UNREACHABLE)).with_artist("Someone")
        ]);
        state.gate.store().write("Song.mp3", b"ID3 audio").await.unwrap();
        let router = create_router(state.clone());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/tracks/Song.mp3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(response.headers()["x-catalog-revision"], "1");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"ID3 audio");
        assert_eq!(state.gate.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_failed_download_is_bad_gateway() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf()).await;
        state
            .catalog
            .publish(vec![Track::new("Song.mp3", format!("{}/Song.mp3", UNREACHABLE))]);
        let router = create_router(state.clone());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/tracks/Song.mp3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(state.gate.store().list_all().await.unwrap().is_empty());
        assert_eq!(state.gate.stats().failures, 1);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(std::path::Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(std::path::Path::new("a.flac")), "audio/flac");
        assert_eq!(
            content_type_for(std::path::Path::new("a.bin")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_server_state_new() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf()).await;

        // started_at should be close to now
        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}
