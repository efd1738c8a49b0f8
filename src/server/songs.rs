//! Demo song resource.
//!
//! `POST /songs/create` is the side-effecting operation the idempotency
//! middleware guards. `GET /songs/list` shows how many times it really ran.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::AppState;

/// A stored song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub year: i32,
}

/// Request body for `POST /songs/create`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub year: i32,
}

/// In-memory song table. Ids start at 1.
#[derive(Debug, Default)]
pub struct SongRepository {
    songs: RwLock<Vec<Song>>,
}

impl SongRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `new` under the next id and returns the stored row.
    pub async fn create(&self, new: NewSong) -> Song {
        let mut songs = self.songs.write().await;
        let song = Song {
            id: songs.len() as u64 + 1,
            title: new.title,
            artist: new.artist,
            year: new.year,
        };
        songs.push(song.clone());
        song
    }

    /// Returns every stored song in insertion order.
    pub async fn list(&self) -> Vec<Song> {
        self.songs.read().await.clone()
    }
}

/// Errors from the song endpoints.
#[derive(Debug, Error)]
pub enum SongError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("failed to encode response: {0}")]
    Encode(serde_json::Error),
}

impl IntoResponse for SongError {
    fn into_response(self) -> Response {
        match &self {
            SongError::InvalidJson(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            SongError::Encode(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
        }
    }
}

/// Creates a song and answers 201 with the stored row as JSON.
pub async fn create_song(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, SongError> {
    let new: NewSong = serde_json::from_slice(&body).inspect_err(|e| {
        debug!(error = %e, "Rejecting song body");
    })?;
    let song = state.songs().create(new).await;
    info!(id = song.id, title = %song.title, "Created song");
    json_response(StatusCode::CREATED, &song)
}

/// Lists every stored song.
pub async fn list_songs(State(state): State<AppState>) -> Result<Response, SongError> {
    let songs = state.songs().list().await;
    json_response(StatusCode::OK, &songs)
}

/// Serializes `value` as a newline-terminated JSON body.
fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response, SongError> {
    let mut body = serde_json::to_vec(value).map_err(SongError::Encode)?;
    body.push(b'\n');
    Ok((
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
