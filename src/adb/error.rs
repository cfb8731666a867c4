use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::emulator::ProcessError;

/// Substring the bridge prints when the target device dropped offline.
/// This is the only place the offline condition is recognised.
pub const DEVICE_OFFLINE_MARKER: &str = "error: device offline";

/// A specialized `Result` type for single bridge invocations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// A specialized `Result` type for session-level operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failure of one bridge invocation. The channel never retries.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Device is offline: {stderr}")]
    DeviceOffline { stderr: String },

    #[error("Bridge command timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Bridge command failed: {stderr}")]
    NonZeroExit { stderr: String },

    #[error("Failed to spawn '{program}': {source}")]
    ProcessSpawnFailed {
        program: String,
        source: std::io::Error,
    },
}

impl ChannelError {
    /// Classify the failure output of a bridge command that exited non-zero.
    pub fn from_failure_output(stderr: &str) -> Self {
        let stderr = stderr.trim().to_string();
        if stderr.contains(DEVICE_OFFLINE_MARKER) {
            ChannelError::DeviceOffline { stderr }
        } else {
            ChannelError::NonZeroExit { stderr }
        }
    }

    pub fn is_device_offline(&self) -> bool {
        matches!(self, ChannelError::DeviceOffline { .. })
    }
}

/// The error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Could not connect to {address} after {attempts} attempts")]
    ConnectFailed { address: String, attempts: u32 },

    #[error("Could not parse screen size from 'wm size' output: {output:?}")]
    ResolutionUnavailable { output: String },

    #[error("No ready device appeared within {timeout:?}")]
    DeviceNotReady { timeout: Duration },

    #[error("Session lost while running '{command}': {reason}")]
    SessionLost { command: String, reason: String },

    #[error("Session is not connected")]
    NotConnected,

    #[error("Tap coordinates are out of bounds: x={x}, y={y}")]
    TapOutOfBounds { x: u32, y: u32 },

    #[error("Screen capture failed: {description}")]
    Capture { description: String },

    #[error("Could not read screenshot {path:?}: {source}")]
    ScreenshotRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl SessionError {
    /// Errors the orchestrator must not try to recover from with another restart.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::SessionLost { .. } | SessionError::ResolutionUnavailable { .. }
        )
    }
}
