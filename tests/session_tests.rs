// Integration tests for the recording session driver
//
// These tests drive a RecordingSession end-to-end against a scripted capture
// backend: the test controls grant/denial, the chunk stream, and the final
// in-flight flush that arrives between the stop request and the device
// confirming the stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use vox_capture::audio::{AudioChunk, CaptureBackend};
use vox_capture::error::DeviceError;
use vox_capture::session::{
    format_elapsed, Artifact, ArtifactCallback, RecordingSession, SessionConfig, SessionState,
    ARTIFACT_MEDIA_TYPE,
};

/// Test backend with scripted acquisition and chunk delivery.
///
/// The backend keeps one sender clone of the chunk channel alive, so the test
/// can drop its own sender without simulating a device loss; `stop()` emits
/// the scripted flush chunks and then closes the backend's side, which is the
/// stop confirmation the session waits for.
struct ScriptedBackend {
    chunk_rx: Option<mpsc::Receiver<AudioChunk>>,
    chunk_tx: Option<mpsc::Sender<AudioChunk>>,
    flush: Vec<Vec<u8>>,
    deny_with: Option<DeviceError>,
    hold_acquire: Option<oneshot::Receiver<()>>,
    released: Arc<AtomicBool>,
}

impl ScriptedBackend {
    /// Backend that grants immediately and emits `flush` on stop.
    fn granting(flush: Vec<Vec<u8>>) -> (Self, mpsc::Sender<AudioChunk>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel(64);
        let released = Arc::new(AtomicBool::new(false));

        let backend = Self {
            chunk_rx: Some(rx),
            chunk_tx: Some(tx.clone()),
            flush,
            deny_with: None,
            hold_acquire: None,
            released: Arc::clone(&released),
        };

        (backend, tx, released)
    }

    /// Backend that grants but holds no sender itself: dropping the test's
    /// sender ends the chunk stream without a stop request (device loss).
    fn losable() -> (Self, mpsc::Sender<AudioChunk>, Arc<AtomicBool>) {
        let (backend, tx, released) = Self::granting(Vec::new());
        let mut backend = backend;
        backend.chunk_tx = None;
        (backend, tx, released)
    }

    /// Backend whose acquisition is denied.
    fn denying(error: DeviceError) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));

        let backend = Self {
            chunk_rx: None,
            chunk_tx: None,
            flush: Vec::new(),
            deny_with: Some(error),
            hold_acquire: None,
            released: Arc::clone(&released),
        };

        (backend, released)
    }

    /// Backend whose acquisition stays pending until the returned sender is
    /// dropped or fired.
    fn hanging() -> (Self, oneshot::Sender<()>, Arc<AtomicBool>) {
        let (hold_tx, hold_rx) = oneshot::channel();
        let (mut backend, _tx, released) = Self::granting(Vec::new());
        backend.hold_acquire = Some(hold_rx);
        (backend, hold_tx, released)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioChunk>, DeviceError> {
        if let Some(hold) = self.hold_acquire.take() {
            let _ = hold.await;
        }

        if let Some(error) = self.deny_with.take() {
            return Err(error);
        }

        Ok(self.chunk_rx.take().expect("acquire called twice"))
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(tx) = self.chunk_tx.take() {
            for (index, data) in self.flush.drain(..).enumerate() {
                let _ = tx
                    .send(AudioChunk {
                        data,
                        timestamp_ms: index as u64,
                    })
                    .await;
            }
            // Dropping the sender closes the channel once buffered chunks drain
        }

        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.chunk_tx.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn collecting_callback() -> (ArtifactCallback, Arc<Mutex<Vec<Artifact>>>) {
    let sink: Arc<Mutex<Vec<Artifact>>> = Arc::new(Mutex::new(Vec::new()));
    let cb_sink = Arc::clone(&sink);
    let callback: ArtifactCallback = Arc::new(move |artifact| {
        cb_sink.lock().unwrap().push(artifact);
    });
    (callback, sink)
}

fn session_config(id: &str) -> SessionConfig {
    SessionConfig {
        session_id: id.to_string(),
        ..SessionConfig::default()
    }
}

async fn send(tx: &mpsc::Sender<AudioChunk>, data: Vec<u8>) {
    tx.send(AudioChunk {
        data,
        timestamp_ms: 0,
    })
    .await
    .expect("chunk channel closed unexpectedly");
}

async fn wait_for_state(session: &RecordingSession, want: SessionState) {
    for _ in 0..500 {
        if session.state().await == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session never reached {:?}", want);
}

#[tokio::test]
async fn test_session_records_and_finalizes_once() {
    let (backend, tx, released) = ScriptedBackend::granting(vec![vec![7, 8], vec![9]]);
    let (callback, sink) = collecting_callback();
    let session = RecordingSession::new(session_config("happy-path"), callback);

    session.begin(Box::new(backend)).await;
    wait_for_state(&session, SessionState::Recording).await;

    send(&tx, vec![1, 2]).await;
    send(&tx, vec![]).await; // zero-length arrival, ignored
    send(&tx, vec![3]).await;
    drop(tx);

    session.stop().await;

    let status = session.status().await;
    assert_eq!(status.state, "completed");
    assert_eq!(status.elapsed, "00:00");
    assert_eq!(status.elapsed_secs, 0, "elapsed resets on finalization");
    assert_eq!(status.buffered_bytes, 0, "buffer cleared on finalization");
    assert!(released.load(Ordering::SeqCst), "device handle released");

    let artifacts = sink.lock().unwrap();
    assert_eq!(artifacts.len(), 1, "exactly one artifact per session");
    assert_eq!(
        artifacts[0].data,
        vec![1, 2, 3, 7, 8, 9],
        "artifact is the concatenation including the final in-flight flush"
    );
    assert_eq!(artifacts[0].media_type, ARTIFACT_MEDIA_TYPE);
    assert_eq!(artifacts[0].session_id, "happy-path");
}

#[tokio::test]
async fn test_repeated_stop_is_a_no_op() {
    let (backend, tx, _released) = ScriptedBackend::granting(Vec::new());
    let (callback, sink) = collecting_callback();
    let session = RecordingSession::new(session_config("double-stop"), callback);

    session.begin(Box::new(backend)).await;
    wait_for_state(&session, SessionState::Recording).await;

    send(&tx, vec![1]).await;
    drop(tx);

    session.stop().await;
    session.stop().await;

    assert_eq!(session.status().await.state, "completed");
    assert_eq!(sink.lock().unwrap().len(), 1, "second stop must not finalize again");
}

#[tokio::test]
async fn test_denied_acquisition_fails_without_artifact() {
    let (backend, _released) = ScriptedBackend::denying(DeviceError::PermissionDenied);
    let (callback, sink) = collecting_callback();
    let session = RecordingSession::new(session_config("denied"), callback);

    session.begin(Box::new(backend)).await;
    wait_for_state(&session, SessionState::Failed).await;

    let status = session.status().await;
    assert_eq!(status.state, "failed");
    let message = status.error.expect("failed session surfaces an error message");
    assert!(message.contains("denied"), "unexpected message: {}", message);

    // stop() after failure is a no-op and nothing ever reaches the buffer
    session.stop().await;
    assert_eq!(session.status().await.state, "failed");
    assert_eq!(session.status().await.buffered_bytes, 0);
    assert!(sink.lock().unwrap().is_empty(), "denied session must not finalize");
}

#[tokio::test]
async fn test_device_loss_while_recording_fails_without_artifact() {
    let (backend, tx, released) = ScriptedBackend::losable();
    let (callback, sink) = collecting_callback();
    let session = RecordingSession::new(session_config("lost"), callback);

    session.begin(Box::new(backend)).await;
    wait_for_state(&session, SessionState::Recording).await;

    send(&tx, vec![1, 2]).await;
    drop(tx); // the device disappears without a stop request

    wait_for_state(&session, SessionState::Failed).await;

    let status = session.status().await;
    assert!(status.error.expect("device loss surfaces an error").contains("unavailable"));
    assert!(released.load(Ordering::SeqCst));
    assert!(sink.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_dispose_during_acquisition_releases_the_grant() {
    let (backend, hold_tx, released) = ScriptedBackend::hanging();
    let (callback, sink) = collecting_callback();
    let session = RecordingSession::new(session_config("dispose-acquiring"), callback);

    session.begin(Box::new(backend)).await;
    assert_eq!(session.status().await.state, "acquiring_device");

    // stop() before the device is open is a no-op, not a hang
    session.stop().await;
    assert_eq!(session.status().await.state, "acquiring_device");

    session.dispose().await;

    assert_eq!(session.status().await.state, "idle");
    assert!(released.load(Ordering::SeqCst), "pending handle must be released");
    assert!(sink.lock().unwrap().is_empty(), "disposal never finalizes");

    drop(hold_tx);
}

#[tokio::test]
async fn test_dispose_while_recording_discards_and_allows_restart() {
    let (backend, tx, released) = ScriptedBackend::granting(Vec::new());
    let (callback, sink) = collecting_callback();
    let session = RecordingSession::new(session_config("dispose-recording"), callback);

    session.begin(Box::new(backend)).await;
    wait_for_state(&session, SessionState::Recording).await;

    send(&tx, vec![1, 2, 3]).await;
    session.dispose().await;
    session.dispose().await; // idempotent

    assert_eq!(session.status().await.state, "idle");
    assert_eq!(session.status().await.buffered_bytes, 0);
    assert!(released.load(Ordering::SeqCst));
    assert!(sink.lock().unwrap().is_empty());

    // A fresh capture attempt is legal after disposal
    let (backend, tx2, _released) = ScriptedBackend::granting(Vec::new());
    session.begin(Box::new(backend)).await;
    wait_for_state(&session, SessionState::Recording).await;

    send(&tx2, vec![4]).await;
    drop(tx2);
    session.stop().await;

    let artifacts = sink.lock().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].data, vec![4], "restarted session carries no stale chunks");
}

#[tokio::test]
async fn test_begin_while_active_is_ignored() {
    let (backend, tx, _released) = ScriptedBackend::granting(Vec::new());
    let (callback, _sink) = collecting_callback();
    let session = RecordingSession::new(session_config("double-begin"), callback);

    session.begin(Box::new(backend)).await;
    wait_for_state(&session, SessionState::Recording).await;

    let (second, _tx2, second_released) = ScriptedBackend::granting(Vec::new());
    session.begin(Box::new(second)).await;

    assert_eq!(session.status().await.state, "recording");
    assert!(
        !second_released.load(Ordering::SeqCst),
        "ignored begin must not touch a second device"
    );

    drop(tx);
    session.dispose().await;
}

#[tokio::test]
async fn test_status_serializes_for_presentation() {
    let (backend, _released) = ScriptedBackend::denying(DeviceError::PermissionDenied);
    let (callback, _sink) = collecting_callback();
    let session = RecordingSession::new(session_config("status-json"), callback);

    session.begin(Box::new(backend)).await;
    wait_for_state(&session, SessionState::Failed).await;

    let value = serde_json::to_value(session.status().await).expect("status serializes");
    assert_eq!(value["session_id"], "status-json");
    assert_eq!(value["state"], "failed");
    assert_eq!(value["elapsed"], "00:00");
    assert_eq!(value["error"], "microphone access was denied");
}

#[tokio::test]
async fn test_elapsed_advances_while_recording() {
    let (backend, tx, _released) = ScriptedBackend::granting(Vec::new());
    let (callback, _sink) = collecting_callback();
    let session = RecordingSession::new(session_config("elapsed"), callback);

    session.begin(Box::new(backend)).await;
    wait_for_state(&session, SessionState::Recording).await;

    tokio::time::sleep(Duration::from_millis(2300)).await;

    let status = session.status().await;
    assert!(
        (1..=3).contains(&status.elapsed_secs),
        "elapsed should track wall clock, got {}",
        status.elapsed_secs
    );
    assert_eq!(status.elapsed, format_elapsed(status.elapsed_secs));

    drop(tx);
    session.dispose().await;
}
