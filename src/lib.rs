pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;

pub use audio::{
    AudioChunk, BackendFactory, CaptureBackend, CaptureConfig, CaptureSource, FileBackend,
    MicBackend,
};
pub use config::Config;
pub use error::DeviceError;
pub use http::{create_router, AppState};
pub use session::{
    format_elapsed, Artifact, ArtifactCallback, CaptureMachine, RecordingSession, SessionConfig,
    SessionState, SessionStatus, ARTIFACT_MEDIA_TYPE,
};
