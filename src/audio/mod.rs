pub mod backend;
pub mod file;
pub mod mic;

pub use backend::{AudioChunk, BackendFactory, CaptureBackend, CaptureConfig, CaptureSource};
pub use file::FileBackend;
pub use mic::MicBackend;
