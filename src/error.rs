use thiserror::Error;

/// Errors from acquiring or operating an audio input device.
///
/// Both variants are terminal for the session that hit them: the session
/// moves to `Failed` and stays there until disposed. No automatic retry.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The user (or OS) declined microphone access.
    #[error("microphone access was denied")]
    PermissionDenied,

    /// No compatible input device, or the device is busy or was lost.
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl From<cpal::BuildStreamError> for DeviceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                DeviceError::DeviceUnavailable("device disconnected".to_string())
            }
            cpal::BuildStreamError::BackendSpecific { err } => {
                let msg = err.description.to_lowercase();
                if msg.contains("permission") || msg.contains("denied") {
                    DeviceError::PermissionDenied
                } else {
                    DeviceError::DeviceUnavailable(err.description)
                }
            }
            other => DeviceError::DeviceUnavailable(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for DeviceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => {
                DeviceError::DeviceUnavailable("device disconnected".to_string())
            }
            cpal::PlayStreamError::BackendSpecific { err } => {
                DeviceError::DeviceUnavailable(err.description)
            }
        }
    }
}
