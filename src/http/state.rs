use crate::audio::CaptureConfig;
use crate::session::{Artifact, RecordingSession};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One live session plus the slot its finished artifact lands in.
///
/// The slot is filled by the session's artifact callback, at most once; the
/// artifact endpoint empties it, so retrieval is one-shot.
#[derive(Clone)]
pub struct SessionEntry {
    pub session: Arc<RecordingSession>,
    pub artifact: Arc<std::sync::Mutex<Option<Artifact>>>,
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active recording sessions (session_id → entry)
    pub sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,

    /// Capture settings applied to every session started over HTTP
    pub capture: CaptureConfig,
}

impl AppState {
    pub fn new(capture: CaptureConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            capture,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(CaptureConfig::default())
    }
}
