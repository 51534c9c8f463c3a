use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};

use super::artifact::{Artifact, ArtifactCallback};
use super::config::SessionConfig;
use super::machine::{format_elapsed, CaptureMachine, SessionState};
use super::status::SessionStatus;
use crate::audio::{AudioChunk, CaptureBackend};
use crate::error::DeviceError;

/// Control messages for the capture task
enum Command {
    Stop,
    Dispose,
}

/// A recording session: owns one capture backend and one state machine, and
/// produces at most one finalized artifact.
///
/// All device events, timer ticks and control commands funnel into a single
/// spawned task that applies them to the machine one at a time — the machine
/// decides legality, the task merely delivers.
pub struct RecordingSession {
    config: SessionConfig,
    machine: Arc<Mutex<CaptureMachine>>,
    on_artifact: ArtifactCallback,

    /// Present while the capture task is running
    command_tx: Arc<Mutex<Option<mpsc::Sender<Command>>>>,

    /// Handle for the capture task
    task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RecordingSession {
    /// Create a new recording session. Nothing is acquired until [`begin`].
    ///
    /// [`begin`]: RecordingSession::begin
    pub fn new(config: SessionConfig, on_artifact: ArtifactCallback) -> Self {
        let machine = CaptureMachine::new(config.session_id.clone());

        Self {
            config,
            machine: Arc::new(Mutex::new(machine)),
            on_artifact,
            command_tx: Arc::new(Mutex::new(None)),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start acquiring the input device and, once granted, recording.
    ///
    /// Resolves the session to `Recording` or `Failed` asynchronously; the
    /// outcome is observable via [`status`]. Calling while the session is not
    /// idle is a logged no-op — the session never errors back into the
    /// caller for a mis-timed button press.
    ///
    /// [`status`]: RecordingSession::status
    pub async fn begin(&self, backend: Box<dyn CaptureBackend>) {
        {
            let mut machine = self.machine.lock().await;
            if !machine.begin_requested() {
                return;
            }
        }

        info!(
            "Starting recording session {} on {}",
            self.config.session_id,
            backend.name()
        );

        let (command_tx, command_rx) = mpsc::channel(4);

        let machine = Arc::clone(&self.machine);
        let on_artifact = Arc::clone(&self.on_artifact);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            run_capture(machine, backend, command_rx, on_artifact, config).await;
        });

        {
            let mut tx = self.command_tx.lock().await;
            *tx = Some(command_tx);
        }
        {
            let mut handle = self.task_handle.lock().await;
            *handle = Some(task);
        }
    }

    /// Request that recording stop, and wait for the session to settle.
    ///
    /// When this returns, the device has confirmed the stop, the final
    /// in-flight chunks have been admitted, and the artifact callback has
    /// fired. Calling while not recording is a logged no-op.
    pub async fn stop(&self) {
        {
            let machine = self.machine.lock().await;
            if machine.state() != SessionState::Recording {
                warn!(
                    "stop() ignored: session {} is not recording ({})",
                    self.config.session_id,
                    machine.state().as_str()
                );
                return;
            }
        }

        if let Some(tx) = self.command_tx.lock().await.as_ref() {
            let _ = tx.send(Command::Stop).await;
        }

        self.join_task().await;
    }

    /// Tear the session down from any state without finalizing.
    ///
    /// Idempotent. Releases the device if held, silences the tick source,
    /// discards the buffer, and never invokes the artifact callback. After
    /// disposal the session is idle again and [`begin`] may start a fresh
    /// capture attempt.
    ///
    /// [`begin`]: RecordingSession::begin
    pub async fn dispose(&self) {
        let tx = self.command_tx.lock().await.take();
        if let Some(tx) = tx {
            let _ = tx.send(Command::Dispose).await;
        }

        self.join_task().await;

        // Settle the machine whether or not a task was running.
        self.machine.lock().await.dispose();
    }

    /// Current presentation snapshot (state, `MM:SS` elapsed, error text).
    pub async fn status(&self) -> SessionStatus {
        let machine = self.machine.lock().await;

        SessionStatus {
            session_id: machine.session_id().to_string(),
            state: machine.state().as_str().to_string(),
            elapsed: format_elapsed(machine.elapsed_secs()),
            elapsed_secs: machine.elapsed_secs(),
            buffered_bytes: machine.buffered_bytes(),
            error: machine.last_error().map(|e| e.to_string()),
        }
    }

    /// Current state of the underlying machine.
    pub async fn state(&self) -> SessionState {
        self.machine.lock().await.state()
    }

    async fn join_task(&self) {
        let handle = self.task_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(
                    "Capture task for session {} panicked: {}",
                    self.config.session_id, e
                );
            }
        }
    }
}

/// The capture task: acquisition, the recording loop, and finalization.
async fn run_capture(
    machine: Arc<Mutex<CaptureMachine>>,
    mut backend: Box<dyn CaptureBackend>,
    mut command_rx: mpsc::Receiver<Command>,
    on_artifact: ArtifactCallback,
    config: SessionConfig,
) {
    // Acquisition: suspends until the host grants or denies the device.
    // Disposal during this window abandons the request; a grant that lands
    // afterwards is released without ever recording.
    let acquired = tokio::select! {
        acquired = backend.acquire() => Some(acquired),
        // Only Dispose (or a dropped session) can land here
        _ = command_rx.recv() => None,
    };

    let mut chunk_rx = match acquired {
        Some(Ok(rx)) => rx,
        Some(Err(e)) => {
            machine.lock().await.device_denied(e);
            return;
        }
        None => {
            machine.lock().await.dispose();
            let _ = backend.stop().await;
            return;
        }
    };

    let accepted = machine.lock().await.device_granted();
    if !accepted {
        // Disposed while the grant was in flight: release immediately.
        let _ = backend.stop().await;
        return;
    }

    info!("Device granted, session {} recording", config.session_id);

    // The tick source exists only inside this recording phase; leaving the
    // loop drops it, so no tick can outlive the Recording state.
    let mut ticker = interval_at(
        Instant::now() + Duration::from_secs(1),
        Duration::from_secs(1),
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                machine.lock().await.tick();
            }

            chunk = chunk_rx.recv() => match chunk {
                Some(AudioChunk { data, .. }) => {
                    machine.lock().await.push_chunk(data);
                }
                None => {
                    machine.lock().await.device_lost(DeviceError::DeviceUnavailable(
                        "capture stream ended unexpectedly".to_string(),
                    ));
                    let _ = backend.stop().await;
                    return;
                }
            },

            cmd = command_rx.recv() => match cmd {
                Some(Command::Stop) => break,
                Some(Command::Dispose) | None => {
                    machine.lock().await.dispose();
                    let _ = backend.stop().await;
                    return;
                }
            },
        }
    }

    // Stop requested. The ticker is gone before the device is told to stop,
    // and the machine leaves Recording in the same breath.
    drop(ticker);
    if !machine.lock().await.stop_requested() {
        let _ = backend.stop().await;
        return;
    }

    if let Err(e) = backend.stop().await {
        warn!("Backend stop for session {} reported: {}", config.session_id, e);
    }

    // Drain buffered chunks until the device confirms the stop by closing the
    // channel; the final in-flight flush lands in the buffer here.
    loop {
        tokio::select! {
            chunk = chunk_rx.recv() => match chunk {
                Some(AudioChunk { data, .. }) => {
                    machine.lock().await.push_chunk(data);
                }
                None => break, // stop confirmed
            },

            cmd = command_rx.recv() => match cmd {
                Some(Command::Dispose) | None => {
                    machine.lock().await.dispose();
                    return;
                }
                Some(Command::Stop) => {} // stray repeat, nothing to do
            },
        }
    }

    let finalized = machine.lock().await.device_stopped();
    if let Some(data) = finalized {
        info!(
            "Recording session {} finalized ({} bytes)",
            config.session_id,
            data.len()
        );

        let artifact = Artifact::new(
            config.session_id.clone(),
            data,
            config.sample_rate,
            config.channels,
        );
        on_artifact(artifact);
    }
}
