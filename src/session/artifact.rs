use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Media type tag carried by every artifact.
///
/// Backends deliver raw interleaved little-endian i16 PCM, so the finalized
/// bytes are a plain PCM stream; sample rate and channel count travel in the
/// artifact metadata.
pub const ARTIFACT_MEDIA_TYPE: &str = "audio/pcm";

/// The single finalized output of a capture session.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Session that produced this artifact
    pub session_id: String,
    /// Fixed media type tag (see [`ARTIFACT_MEDIA_TYPE`])
    pub media_type: &'static str,
    /// Concatenated capture bytes, in arrival order
    pub data: Vec<u8>,
    /// Sample rate of the capture
    pub sample_rate: u32,
    /// Channel count of the capture
    pub channels: u16,
    /// When finalization happened
    pub captured_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(session_id: impl Into<String>, data: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self {
            session_id: session_id.into(),
            media_type: ARTIFACT_MEDIA_TYPE,
            data,
            sample_rate,
            channels,
            captured_at: Utc::now(),
        }
    }
}

/// Callback handed the finalized artifact, invoked exactly once per completed
/// session — never on failure or disposal.
pub type ArtifactCallback = Arc<dyn Fn(Artifact) + Send + Sync>;
