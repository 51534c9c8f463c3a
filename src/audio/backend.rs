use tokio::sync::mpsc;

use crate::error::DeviceError;

/// One unit of streamed audio data delivered by a capture backend.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw capture bytes (interleaved i16 PCM, little-endian)
    pub data: Vec<u8>,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for capture backends
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate
    pub sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Duration of each delivered chunk in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz
            channels: 1,        // Mono
            buffer_duration_ms: 100,
        }
    }
}

/// Audio capture backend trait
///
/// The "request an input device" capability. Acquisition is asynchronous and
/// may be denied; a successful acquisition opens the device and returns the
/// channel its chunks arrive on. Stopping the backend releases the device,
/// which closes that channel once any buffered chunks have drained — channel
/// closure after `stop()` is the stop confirmation.
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Request the input device and start capturing.
    ///
    /// Returns a channel receiver that will receive audio chunks.
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioChunk>, DeviceError>;

    /// Stop capturing and release the device.
    async fn stop(&mut self) -> Result<(), DeviceError>;

    /// Check if backend currently holds an open device
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture backend factory
pub struct BackendFactory;

impl BackendFactory {
    /// Create a capture backend for the given source
    pub fn create(
        source: CaptureSource,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, DeviceError> {
        match source {
            CaptureSource::Microphone => {
                let backend = super::mic::MicBackend::new(config);
                Ok(Box::new(backend))
            }

            CaptureSource::File(path) => {
                let backend = super::file::FileBackend::new(path, config);
                Ok(Box::new(backend))
            }
        }
    }
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Microphone input (all platforms)
    Microphone,
    /// WAV file replay (for testing/batch processing)
    File(String),
}
