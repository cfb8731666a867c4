// In-memory bridge and process fakes shared by the session and scenario tests
use super::error::{ChannelError, ChannelResult};
use super::types::{BridgeCommand, CommandChannel, DeviceEndpoint};
use crate::emulator::{PortRelease, ProcessControl, ProcessError, StopOutcome};
use image::{DynamicImage, GrayImage, ImageFormat};
use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn png_bytes(image: &GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

struct ChannelState {
    calls: Vec<(String, bool)>,
    resolution: (u32, u32),
    wm_size_override: Option<String>,
    refused_connects: usize,
    offline_remaining: usize,
    offline_prefixes: Vec<String>,
    device_listed: bool,
    screens: VecDeque<Vec<u8>>,
    current_screen: Vec<u8>,
}

/// Scriptable stand-in for the adb binary. Clones share state so a test can
/// keep a handle after moving one into a session.
#[derive(Clone)]
pub struct MockChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl MockChannel {
    pub fn new(width: u32, height: u32) -> Self {
        let blank = GrayImage::from_pixel(width, height, image::Luma([30]));
        Self {
            state: Arc::new(Mutex::new(ChannelState {
                calls: Vec::new(),
                resolution: (width, height),
                wm_size_override: None,
                refused_connects: 0,
                offline_remaining: 0,
                offline_prefixes: Vec::new(),
                device_listed: true,
                screens: VecDeque::new(),
                current_screen: png_bytes(&blank),
            })),
        }
    }

    /// The next `n` device-targeted commands fail with "device offline".
    pub fn go_offline_for(&self, n: usize) {
        self.state.lock().unwrap().offline_remaining = n;
    }

    /// Commands starting with `prefix` always fail with "device offline".
    pub fn always_offline_for(&self, prefix: &str) {
        self.state.lock().unwrap().offline_prefixes.push(prefix.to_string());
    }

    pub fn refuse_connects(&self, n: usize) {
        self.state.lock().unwrap().refused_connects = n;
    }

    pub fn set_device_listed(&self, listed: bool) {
        self.state.lock().unwrap().device_listed = listed;
    }

    pub fn set_wm_size_output(&self, output: &str) {
        self.state.lock().unwrap().wm_size_override = Some(output.to_string());
    }

    /// Queue screens returned by successive pulls. The last one sticks.
    pub fn push_screen(&self, image: &GrayImage) {
        self.state.lock().unwrap().screens.push_back(png_bytes(image));
    }

    /// Queue raw bytes for the next pull, e.g. a truncated PNG.
    pub fn push_raw_screen(&self, bytes: &[u8]) {
        self.state.lock().unwrap().screens.push_back(bytes.to_vec());
    }

    pub fn push_screens(&self, image: &GrayImage, count: usize) {
        let bytes = png_bytes(image);
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.screens.push_back(bytes.clone());
        }
    }

    /// Every command issued so far, rendered as its argument string.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == command).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Whether every device-targeted call went through `-s`.
    pub fn all_targeted(&self, commands: &[&str]) -> bool {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(c, _)| commands.iter().any(|p| c.starts_with(p)))
            .all(|(_, targeted)| *targeted)
    }
}

impl CommandChannel for MockChannel {
    async fn execute(
        &self,
        command: &BridgeCommand,
        target: Option<&DeviceEndpoint>,
    ) -> ChannelResult<String> {
        let mut state = self.state.lock().unwrap();
        let rendered = command.to_string();
        state.calls.push((rendered.clone(), target.is_some()));
        let args = command.args();

        match args.first().map(String::as_str) {
            Some("connect") => {
                if state.refused_connects > 0 {
                    state.refused_connects -= 1;
                    return Ok(format!("cannot connect to {}", args[1]));
                }
                return Ok(format!("connected to {}", args[1]));
            }
            Some("disconnect") => return Ok(format!("disconnected {}", args[1])),
            Some("devices") => {
                let mut out = String::from("List of devices attached\n");
                if state.device_listed {
                    out.push_str("127.0.0.1:5555\tdevice\n");
                }
                return Ok(out);
            }
            _ => {}
        }

        if state.offline_remaining > 0 {
            state.offline_remaining -= 1;
            return Err(ChannelError::from_failure_output("error: device offline"));
        }
        if state.offline_prefixes.iter().any(|p| rendered.starts_with(p)) {
            return Err(ChannelError::from_failure_output("error: device offline"));
        }

        match args.first().map(String::as_str) {
            Some("get-state") => Ok("device".to_string()),
            Some("pull") => {
                if let Some(next) = state.screens.pop_front() {
                    state.current_screen = next;
                }
                std::fs::write(&args[2], &state.current_screen).unwrap();
                Ok(format!("{}: 1 file pulled", args[1]))
            }
            Some("shell") if rendered == "shell wm size" => {
                let (w, h) = state.resolution;
                Ok(state
                    .wm_size_override
                    .clone()
                    .unwrap_or_else(|| format!("Physical size: {w}x{h}")))
            }
            _ => Ok(String::new()),
        }
    }
}

#[derive(Default)]
struct ProcessState {
    stopped: Vec<String>,
    started: Vec<PathBuf>,
    released_ports: Vec<u16>,
    port_holders: Vec<u32>,
    fail_start: bool,
}

#[derive(Clone, Default)]
pub struct MockProcesses {
    state: Arc<Mutex<ProcessState>>,
}

impl MockProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start(&self) {
        self.state.lock().unwrap().fail_start = true;
    }

    /// `release_port` reports these PIDs as refusing to stop.
    pub fn hold_port(&self, pids: &[u32]) {
        self.state.lock().unwrap().port_holders = pids.to_vec();
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().started.len()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn released_ports(&self) -> Vec<u16> {
        self.state.lock().unwrap().released_ports.clone()
    }
}

impl ProcessControl for MockProcesses {
    fn is_running(&self, _name: &str) -> bool {
        false
    }

    async fn ensure_stopped(&self, name: &str, _grace: Duration) -> StopOutcome {
        self.state.lock().unwrap().stopped.push(name.to_string());
        StopOutcome::default()
    }

    fn start(&self, executable: &Path) -> Result<(), ProcessError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(ProcessError::ExecutableMissing {
                path: executable.to_path_buf(),
            });
        }
        state.started.push(executable.to_path_buf());
        Ok(())
    }

    async fn release_port(&self, port: u16, _grace: Duration) -> PortRelease {
        let mut state = self.state.lock().unwrap();
        state.released_ports.push(port);
        if state.port_holders.is_empty() {
            PortRelease::NotFound
        } else {
            PortRelease::StillHeld {
                pids: state.port_holders.clone(),
            }
        }
    }
}
