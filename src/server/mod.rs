//! HTTP surface of the idempotency gate.
//!
//! This module provides the axum middleware adapter plus a small demo server
//! that exercises it:
//! - Guards a side-effecting endpoint with the `Idempotency-Key` protocol
//! - Lists stored rows, so repeated requests can be seen not to duplicate them
//! - Provides a health check for liveness probes
//!
//! # Endpoints
//!
//! - `POST /songs/create` - Creates a song (201 Created). Requires `Idempotency-Key`
//! - `GET /songs/list` - Returns all songs as JSON
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::config::IdempotencyConfig;
use crate::coordinator::Coordinator;

pub mod health;
pub mod middleware;
pub mod songs;

pub use health::health_handler;
pub use middleware::{IDEMPOTENCY_KEY_HEADER, idempotency_middleware};
pub use songs::{SongRepository, create_song, list_songs};

/// Shared application state.
///
/// Passed to the song handlers via axum's `State` extractor. The coordinator
/// is handed to the middleware separately.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    songs: SongRepository,
    coordinator: Coordinator,
}

impl AppState {
    /// Creates state with an empty repository and a fresh coordinator.
    pub fn new(config: IdempotencyConfig) -> Self {
        Self::with_coordinator(Coordinator::new(config))
    }

    /// Creates state around an existing coordinator.
    pub fn with_coordinator(coordinator: Coordinator) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                songs: SongRepository::new(),
                coordinator,
            }),
        }
    }

    /// Returns the song repository.
    pub fn songs(&self) -> &SongRepository {
        &self.inner.songs
    }

    /// Returns the coordinator guarding `POST /songs/create`.
    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> Router {
    let idempotent = Router::new()
        .route("/songs/create", post(create_song))
        .route_layer(from_fn_with_state(
            app_state.coordinator().clone(),
            idempotency_middleware,
        ));

    Router::new()
        .merge(idempotent)
        .route("/songs/list", get(list_songs))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
