use serde::{Deserialize, Serialize};

/// Presentation snapshot of a recording session
///
/// Everything a UI collaborator needs to render the session: these values are
/// derived from the state machine, never the other way around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Session identifier
    pub session_id: String,

    /// Current state ("idle", "acquiring_device", "recording", ...)
    pub state: String,

    /// Elapsed recording time, `MM:SS`
    pub elapsed: String,

    /// Elapsed recording time in whole seconds
    pub elapsed_secs: u64,

    /// Bytes buffered so far
    pub buffered_bytes: usize,

    /// Human-readable error message, present only when failed
    pub error: Option<String>,
}
