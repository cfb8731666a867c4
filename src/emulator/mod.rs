// Emulator process lifecycle: discovery, graceful/forced termination, launch
// and freeing the local port the bridge needs.

pub mod ports;
pub mod process;

pub use process::{PortRelease, ProcessControl, ProcessError, StopOutcome, SystemProcesses};
