//! Microphone capture backend via cpal.
//!
//! The cpal stream is not `Send`, so it lives on a dedicated worker thread
//! for its whole lifetime. The worker reports grant/denial back over a
//! oneshot, then parks until stopped. Dropping the stream drops the callback
//! closure and with it the last chunk sender, so the chunk channel closes
//! only after buffered chunks have drained — which is exactly the stop
//! confirmation the session waits for.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioChunk, CaptureBackend, CaptureConfig};
use crate::error::DeviceError;

const CHUNK_CHANNEL_CAPACITY: usize = 64;

pub struct MicBackend {
    config: CaptureConfig,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
    capturing: bool,
}

impl MicBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            worker: None,
            capturing: false,
        }
    }

    /// Open the default input device and run the stream until `stop_rx` fires.
    ///
    /// Runs on the worker thread. The grant/denial outcome is reported over
    /// `ready_tx` before this function settles into its blocking wait.
    fn run_stream(
        config: CaptureConfig,
        chunk_tx: mpsc::Sender<AudioChunk>,
        ready_tx: oneshot::Sender<Result<(), DeviceError>>,
        stop_rx: std::sync::mpsc::Receiver<()>,
    ) {
        let host = cpal::default_host();
        let device = match host.default_input_device() {
            Some(device) => device,
            None => {
                let _ = ready_tx.send(Err(DeviceError::DeviceUnavailable(
                    "no input device available".to_string(),
                )));
                return;
            }
        };

        info!(
            "Mic backend using device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Samples per delivered chunk, derived from the configured chunk duration
        let samples_per_chunk = (config.sample_rate as u64
            * config.channels as u64
            * config.buffer_duration_ms
            / 1000)
            .max(1) as usize;
        let samples_per_sec = (config.sample_rate as u64 * config.channels as u64).max(1);

        let mut pending: Vec<i16> = Vec::with_capacity(samples_per_chunk);
        let mut sent_samples: u64 = 0;

        let err_fn = |err| error!("Mic stream error: {}", err);

        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    pending.push((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                }

                while pending.len() >= samples_per_chunk {
                    let rest = pending.split_off(samples_per_chunk);
                    let samples = std::mem::replace(&mut pending, rest);

                    let chunk = AudioChunk {
                        data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
                        timestamp_ms: sent_samples * 1000 / samples_per_sec,
                    };
                    sent_samples += samples_per_chunk as u64;

                    // The audio callback must not block; drop the chunk if the
                    // session has fallen this far behind.
                    if let Err(mpsc::error::TrySendError::Full(_)) = chunk_tx.try_send(chunk) {
                        warn!("Chunk channel full, dropping {} samples", samples_per_chunk);
                    }
                }
            },
            err_fn,
            None,
        );

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready_tx.send(Err(DeviceError::from(e)));
                return;
            }
        };

        if let Err(e) = stream.play() {
            let _ = ready_tx.send(Err(DeviceError::from(e)));
            return;
        }

        if ready_tx.send(Ok(())).is_err() {
            // Acquirer went away before the grant landed; release immediately.
            debug!("Mic grant arrived after caller went away, releasing device");
            return;
        }

        info!("Mic capture started");

        // Park until stopped (or until the backend itself is dropped, which
        // drops the sender and unblocks this recv with an error).
        let _ = stop_rx.recv();

        drop(stream);
        info!("Mic capture stopped, device released");
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicBackend {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioChunk>, DeviceError> {
        if self.capturing {
            return Err(DeviceError::DeviceUnavailable(
                "capture already in progress".to_string(),
            ));
        }

        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();

        let config = self.config.clone();
        let worker = thread::spawn(move || {
            Self::run_stream(config, chunk_tx, ready_tx, stop_rx);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.worker = Some(worker);
                self.capturing = true;
                Ok(chunk_rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::DeviceUnavailable(
                "capture thread failed to start".to_string(),
            )),
        }
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        if !self.capturing {
            return Ok(());
        }

        debug!("Stopping mic capture");

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        // Wait for the worker to drop the stream so the device is released
        // before stop() returns.
        if let Some(worker) = self.worker.take() {
            let _ = tokio::task::spawn_blocking(move || worker.join()).await;
        }

        self.capturing = false;

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

impl Drop for MicBackend {
    fn drop(&mut self) {
        if self.capturing {
            debug!("Dropping active MicBackend, releasing device");
            if let Some(stop_tx) = self.stop_tx.take() {
                let _ = stop_tx.send(());
            }
        }
    }
}
