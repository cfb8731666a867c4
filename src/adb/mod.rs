// ADB module - command channel and device session on top of the adb binary.
// The channel runs one invocation at a time; the session owns connection
// state and offline recovery.

pub mod error;
pub mod session;
pub mod shell;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

// Re-export the main types and functions for easy access
pub use error::{ChannelError, ChannelResult, DEVICE_OFFLINE_MARKER, SessionError, SessionResult};
pub use session::{Session, SessionSettings};
pub use shell::AdbShell;
pub use types::{BridgeCommand, CommandChannel, ConnectionStatus, Device, DeviceEndpoint, KeyCode};
