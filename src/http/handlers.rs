use super::state::{AppState, SessionEntry};
use crate::audio::{BackendFactory, CaptureSource};
use crate::session::{ArtifactCallback, RecordingSession, SessionConfig, SessionStatus};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Create a recording session on the microphone and begin acquisition
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Starting recording session: {}", session_id);

    // Check if this id is already live
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Session {} already exists", session_id),
                }),
            )
                .into_response();
        }
    }

    let config = SessionConfig {
        session_id: session_id.clone(),
        sample_rate: state.capture.sample_rate,
        channels: state.capture.channels,
    };

    // The finished artifact lands in this entry's slot, at most once.
    let artifact_slot = Arc::new(std::sync::Mutex::new(None));
    let slot = Arc::clone(&artifact_slot);
    let callback: ArtifactCallback = Arc::new(move |artifact| {
        if let Ok(mut stored) = slot.lock() {
            *stored = Some(artifact);
        }
    });

    let session = Arc::new(RecordingSession::new(config, callback));

    let backend = match BackendFactory::create(CaptureSource::Microphone, state.capture.clone()) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to create capture backend: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to create capture backend: {}", e),
                }),
            )
                .into_response();
        }
    };

    session.begin(backend).await;

    let status = session.status().await;

    // Store session
    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(
            session_id.clone(),
            SessionEntry {
                session,
                artifact: artifact_slot,
            },
        );
    }

    info!("Recording session registered: {}", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id: session_id.clone(),
            status,
            message: format!("Recording session {} started", session_id),
        }),
    )
        .into_response()
}

/// POST /sessions/:session_id/stop
/// Stop recording; when this returns the session has settled and the
/// artifact (if any) is available for one-shot retrieval
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping recording session: {}", session_id);

    let entry = {
        let sessions = state.sessions.read().await;
        sessions.get(&session_id).cloned()
    };

    match entry {
        Some(entry) => {
            entry.session.stop().await;
            let status = entry.session.status().await;

            (
                StatusCode::OK,
                Json(StopSessionResponse {
                    session_id: session_id.clone(),
                    status,
                    message: "Recording stopped".to_string(),
                }),
            )
                .into_response()
        }
        None => session_not_found(&session_id),
    }
}

/// GET /sessions/:session_id/status
/// Presentation snapshot of a session (state, MM:SS elapsed, error text)
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(entry) => {
            let status = entry.session.status().await;
            (StatusCode::OK, Json(status)).into_response()
        }
        None => session_not_found(&session_id),
    }
}

/// GET /sessions/:session_id/artifact
/// One-shot retrieval of the finalized capture bytes
pub async fn get_session_artifact(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let entry = {
        let sessions = state.sessions.read().await;
        sessions.get(&session_id).cloned()
    };

    match entry {
        Some(entry) => {
            let artifact = entry.artifact.lock().ok().and_then(|mut slot| slot.take());

            match artifact {
                Some(artifact) => (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, artifact.media_type)],
                    artifact.data,
                )
                    .into_response(),
                None => (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse {
                        error: format!("Session {} has no finalized artifact", session_id),
                    }),
                )
                    .into_response(),
            }
        }
        None => session_not_found(&session_id),
    }
}

/// DELETE /sessions/:session_id
/// Dispose a session from any state and drop it from the registry
pub async fn dispose_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Disposing recording session: {}", session_id);

    let entry = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    match entry {
        Some(entry) => {
            entry.session.dispose().await;
            (StatusCode::OK, "OK").into_response()
        }
        None => session_not_found(&session_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn session_not_found(session_id: &str) -> axum::response::Response {
    error!("Session {} not found", session_id);
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {} not found", session_id),
        }),
    )
        .into_response()
}
