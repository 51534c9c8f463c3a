//! WAV file replay backend, for tests and batch processing.

use hound::WavReader;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{AudioChunk, CaptureBackend, CaptureConfig};
use crate::error::DeviceError;

pub struct FileBackend {
    path: PathBuf,
    config: CaptureConfig,
    stop_tx: Option<mpsc::Sender<()>>,
    capturing: bool,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, config: CaptureConfig) -> Self {
        Self {
            path: path.into(),
            config,
            stop_tx: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileBackend {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioChunk>, DeviceError> {
        if self.capturing {
            return Err(DeviceError::DeviceUnavailable(
                "capture already in progress".to_string(),
            ));
        }

        let reader = WavReader::open(&self.path).map_err(|e| {
            DeviceError::DeviceUnavailable(format!(
                "failed to open WAV file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                DeviceError::DeviceUnavailable(format!("failed to read WAV samples: {}", e))
            })?;

        info!(
            "File backend replaying {} ({} samples, {}Hz, {} channels)",
            self.path.display(),
            samples.len(),
            spec.sample_rate,
            spec.channels
        );

        let (chunk_tx, chunk_rx) = mpsc::channel(64);
        let (stop_tx, mut stop_rx) = mpsc::channel(1);

        let samples_per_chunk = (spec.sample_rate as u64
            * spec.channels as u64
            * self.config.buffer_duration_ms
            / 1000)
            .max(1) as usize;
        let samples_per_sec = (spec.sample_rate as u64 * spec.channels as u64).max(1);

        tokio::spawn(async move {
            for (index, frame) in samples.chunks(samples_per_chunk).enumerate() {
                let chunk = AudioChunk {
                    data: frame.iter().flat_map(|s| s.to_le_bytes()).collect(),
                    timestamp_ms: (index * samples_per_chunk) as u64 * 1000 / samples_per_sec,
                };

                tokio::select! {
                    sent = chunk_tx.send(chunk) => {
                        if sent.is_err() {
                            warn!("Chunk receiver dropped before file replay finished");
                            return;
                        }
                    }
                    _ = stop_rx.recv() => {
                        debug!("File replay stopped mid-stream");
                        return;
                    }
                }
            }

            debug!("File replay exhausted, idling until stop");

            // A finished file is not a lost device: keep the channel open,
            // like a microphone that went silent, until stopped.
            let _ = stop_rx.recv().await;
        });

        self.stop_tx = Some(stop_tx);
        self.capturing = true;

        Ok(chunk_rx)
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        if !self.capturing {
            return Ok(());
        }

        debug!("Stopping file replay");

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(()).await;
        }

        self.capturing = false;

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}
