use serde::{Deserialize, Serialize};

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "interview-2026-08-06-intro")
    pub session_id: String,

    /// Sample rate for capture (16kHz default)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            sample_rate: 16000,
            channels: 1,
        }
    }
}
