use tracing::{debug, warn};

use crate::error::DeviceError;

/// Capture session state
///
/// Transitions are driven exclusively through [`CaptureMachine`] event
/// methods; the machine is the single source of truth for which events are
/// legal in which state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AcquiringDevice,
    Recording,
    Stopping,
    Completed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AcquiringDevice => "acquiring_device",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }
}

/// The capture state machine: session state, chunk buffer, elapsed counter.
///
/// Pure — no I/O, no clocks, no channels. Device grant/denial, data arrival,
/// stop confirmation and timer ticks are all delivered as explicit event
/// methods by whoever drives the machine, one event at a time. The chunk
/// buffer is an owned field read only at finalization, never captured early.
pub struct CaptureMachine {
    session_id: String,
    state: SessionState,
    chunks: Vec<Vec<u8>>,
    elapsed_secs: u64,
    last_error: Option<DeviceError>,
}

impl CaptureMachine {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Idle,
            chunks: Vec::new(),
            elapsed_secs: 0,
            last_error: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// Set only in `Failed`.
    pub fn last_error(&self) -> Option<&DeviceError> {
        self.last_error.as_ref()
    }

    /// Total bytes currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    /// `begin()`: start acquiring the input device.
    ///
    /// Legal only from `Idle`; anywhere else this is a logged no-op and the
    /// caller must not issue a device request. Returns whether the transition
    /// happened.
    pub fn begin_requested(&mut self) -> bool {
        if self.state != SessionState::Idle {
            warn!(
                "begin() ignored: session {} is not idle ({})",
                self.session_id,
                self.state.as_str()
            );
            return false;
        }

        self.state = SessionState::AcquiringDevice;
        true
    }

    /// The device request resolved with a grant.
    ///
    /// Returns `true` if the grant was accepted (we are now `Recording`, the
    /// chunk buffer is cleared and the elapsed counter restarts from 0). A
    /// grant that lands after `dispose()` is rejected — the caller must
    /// release the handle immediately without recording.
    pub fn device_granted(&mut self) -> bool {
        if self.state != SessionState::AcquiringDevice {
            warn!(
                "Device grant for session {} arrived in state {}, releasing handle",
                self.session_id,
                self.state.as_str()
            );
            return false;
        }

        self.chunks.clear();
        self.elapsed_secs = 0;
        self.state = SessionState::Recording;
        true
    }

    /// The device request resolved with a denial or an unavailable device.
    pub fn device_denied(&mut self, error: DeviceError) {
        if self.state != SessionState::AcquiringDevice {
            debug!(
                "Device denial for session {} arrived in state {}, ignoring",
                self.session_id,
                self.state.as_str()
            );
            return;
        }

        warn!("Device acquisition failed for session {}: {}", self.session_id, error);
        self.last_error = Some(error);
        self.state = SessionState::Failed;
    }

    /// Data arrived from the device.
    ///
    /// Appended in arrival order while `Recording`, or while `Stopping` to
    /// admit the final in-flight flush. Zero-length arrivals are ignored.
    pub fn push_chunk(&mut self, data: Vec<u8>) {
        if !matches!(
            self.state,
            SessionState::Recording | SessionState::Stopping
        ) {
            return;
        }

        if data.is_empty() {
            return;
        }

        self.chunks.push(data);
    }

    /// `stop()`: request that capture end.
    ///
    /// Legal only from `Recording`; anywhere else this is a logged no-op. The
    /// driver must silence its tick source no later than this transition.
    /// Returns whether the transition happened.
    pub fn stop_requested(&mut self) -> bool {
        if self.state != SessionState::Recording {
            warn!(
                "stop() ignored: session {} is not recording ({})",
                self.session_id,
                self.state.as_str()
            );
            return false;
        }

        self.state = SessionState::Stopping;
        true
    }

    /// The device confirmed it has stopped.
    ///
    /// Concatenates the buffered chunks in arrival order into the finalized
    /// capture bytes, clears the buffer, and resets the elapsed counter.
    /// Returns `Some` exactly once per session, on the `Stopping → Completed`
    /// transition.
    pub fn device_stopped(&mut self) -> Option<Vec<u8>> {
        if self.state != SessionState::Stopping {
            debug!(
                "Stop confirmation for session {} arrived in state {}, ignoring",
                self.session_id,
                self.state.as_str()
            );
            return None;
        }

        let data: Vec<u8> = self.chunks.drain(..).flatten().collect();
        self.elapsed_secs = 0;
        self.state = SessionState::Completed;

        Some(data)
    }

    /// The device was lost mid-recording (chunk stream ended without a stop
    /// request).
    pub fn device_lost(&mut self, error: DeviceError) {
        if self.state != SessionState::Recording {
            return;
        }

        warn!("Device lost while session {} was recording: {}", self.session_id, error);
        self.last_error = Some(error);
        self.state = SessionState::Failed;
    }

    /// One second of recording elapsed.
    ///
    /// Counts only while `Recording`; a straggling tick delivered in any
    /// other state changes nothing.
    pub fn tick(&mut self) {
        if self.state != SessionState::Recording {
            return;
        }

        self.elapsed_secs += 1;
    }

    /// Tear the session down without finalizing.
    ///
    /// Legal in every state and idempotent. Discards the buffer and returns
    /// the machine to `Idle`, from which `begin()` may start a fresh attempt.
    /// Never produces an artifact.
    pub fn dispose(&mut self) {
        if self.state != SessionState::Idle {
            debug!(
                "Disposing session {} from state {}",
                self.session_id,
                self.state.as_str()
            );
        }

        self.chunks.clear();
        self.last_error = None;
        self.state = SessionState::Idle;
    }
}

/// Format an elapsed-seconds count as `MM:SS`, both fields zero-padded.
///
/// Minutes are unbounded: an hour-long capture renders as `61:01`, not
/// `01:01:01`.
pub fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
