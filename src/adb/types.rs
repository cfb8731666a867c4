// Core bridge types and the channel trait
use super::error::ChannelResult;
use serde::Serialize;
use std::fmt;

/// The device this process controls. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEndpoint {
    /// Network address (`host:port`) or serial passed to `adb -s`
    pub address: String,
    /// Human label used in log output
    pub label: String,
}

impl DeviceEndpoint {
    pub fn new(address: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: label.into(),
        }
    }

    /// TCP port of a `host:port` address, if it has one.
    pub fn port(&self) -> Option<u16> {
        self.address
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Offline,
}

/// One line of `adb devices` output.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct Device {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub state: String,
}

impl Device {
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Home,
    Back,
}

impl KeyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyCode::Home => "KEYCODE_HOME",
            KeyCode::Back => "KEYCODE_BACK",
        }
    }
}

/// Argument list of one bridge invocation, without the binary and `-s` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeCommand {
    args: Vec<String>,
}

impl BridgeCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn shell<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = Self::new(["shell"]);
        cmd.args.extend(args.into_iter().map(Into::into));
        cmd
    }

    pub fn connect(address: &str) -> Self {
        Self::new(["connect", address])
    }

    pub fn disconnect(address: &str) -> Self {
        Self::new(["disconnect", address])
    }

    pub fn devices() -> Self {
        Self::new(["devices"])
    }

    pub fn get_state() -> Self {
        Self::new(["get-state"])
    }

    pub fn screen_size() -> Self {
        Self::shell(["wm", "size"])
    }

    pub fn tap(x: u32, y: u32) -> Self {
        Self::shell(["input".to_string(), "tap".into(), x.to_string(), y.to_string()])
    }

    pub fn key_event(key: KeyCode) -> Self {
        Self::shell(["input", "keyevent", key.as_str()])
    }

    pub fn screencap(remote_path: &str) -> Self {
        Self::shell(["screencap", "-p", remote_path])
    }

    pub fn pull(remote_path: &str, local_path: &str) -> Self {
        Self::new(["pull", remote_path, local_path])
    }

    pub fn remove(remote_path: &str) -> Self {
        Self::shell(["rm", remote_path])
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for BridgeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

// Trait defining the bridge boundary (shell implementation, test fakes)
#[allow(async_fn_in_trait)]
pub trait CommandChannel {
    /// Run one bridge command. `target` of `None` addresses the bridge's
    /// global namespace (`devices`, `connect`).
    async fn execute(
        &self,
        command: &BridgeCommand,
        target: Option<&DeviceEndpoint>,
    ) -> ChannelResult<String>;
}
