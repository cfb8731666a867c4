// Session manager: owns the device connection state and hides offline
// recovery from callers.
use super::error::{ChannelError, SessionError, SessionResult};
use super::shell::AdbShell;
use super::types::{BridgeCommand, CommandChannel, ConnectionStatus, DeviceEndpoint, KeyCode};
use crate::emulator::ProcessControl;
use crate::template_matching::Frame;
use image::imageops::FilterType;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Timing and paths used by connect and recovery.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    /// Pause after a successful `connect` before the device is queried
    pub connect_settle: Duration,
    /// Pause after launching the emulator before polling for readiness
    pub boot_delay: Duration,
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
    pub online_timeout: Duration,
    pub kill_grace: Duration,
    /// Process name of the emulator front-end (e.g. `dnplayer.exe`)
    pub emulator_process: String,
    pub emulator_path: PathBuf,
    pub remote_screenshot_path: String,
    pub local_screenshot_path: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(2),
            connect_settle: Duration::from_secs(3),
            boot_delay: Duration::from_secs(20),
            ready_timeout: Duration::from_secs(60),
            ready_poll_interval: Duration::from_secs(5),
            online_timeout: Duration::from_secs(30),
            kill_grace: Duration::from_secs(5),
            emulator_process: "dnplayer.exe".to_string(),
            emulator_path: PathBuf::from("D:/APP/LDPlayer9/dnplayer.exe"),
            remote_screenshot_path: "/sdcard/screenshot.png".to_string(),
            local_screenshot_path: PathBuf::from("screenshot.png"),
        }
    }
}

pub struct Session<C, P> {
    channel: C,
    processes: P,
    endpoint: DeviceEndpoint,
    status: ConnectionStatus,
    resolution: Option<(u32, u32)>,
    settings: SessionSettings,
}

impl<C: CommandChannel, P: ProcessControl> Session<C, P> {
    pub fn new(channel: C, processes: P, endpoint: DeviceEndpoint, settings: SessionSettings) -> Self {
        Self {
            channel,
            processes,
            endpoint,
            status: ConnectionStatus::Disconnected,
            resolution: None,
            settings,
        }
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Device screen size; always `Some` while connected.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.resolution
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn processes(&self) -> &P {
        &self.processes
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            log::debug!("📶 Session {:?} -> {:?}", self.status, status);
            self.status = status;
        }
    }

    /// Connect to the endpoint, retrying up to `max_attempts` times, then
    /// refresh the screen resolution.
    pub async fn connect(&mut self, max_attempts: u32) -> SessionResult<()> {
        self.set_status(ConnectionStatus::Connecting);
        self.resolution = None;
        let address = self.endpoint.address.clone();

        for attempt in 1..=max_attempts {
            log::info!(
                "🔌 Connecting to {} (attempt {attempt}/{max_attempts})",
                self.endpoint
            );
            match self
                .channel
                .execute(&BridgeCommand::connect(&address), None)
                .await
            {
                Ok(out) if out.contains("connected to") => {
                    log::info!("⏳ Waiting for device to settle...");
                    sleep(self.settings.connect_settle).await;
                    match self.query_resolution().await {
                        Ok((w, h)) => {
                            self.resolution = Some((w, h));
                            self.set_status(ConnectionStatus::Connected);
                            log::info!("✅ Connected to {} ({w}x{h})", self.endpoint);
                            return Ok(());
                        }
                        // output we cannot parse will not improve on retry
                        Err(e @ SessionError::ResolutionUnavailable { .. }) => {
                            self.set_status(ConnectionStatus::Disconnected);
                            return Err(e);
                        }
                        Err(e) => log::warn!("❌ Resolution query failed: {e}"),
                    }
                }
                Ok(out) => log::warn!("❌ Connect refused: {out}"),
                Err(e) => log::warn!("❌ Connect failed: {e}"),
            }
            if attempt < max_attempts {
                sleep(self.settings.connect_retry_delay).await;
            }
        }

        self.set_status(ConnectionStatus::Disconnected);
        log::error!("❌ Giving up on {} after {max_attempts} attempts", self.endpoint);
        Err(SessionError::ConnectFailed {
            address,
            attempts: max_attempts,
        })
    }

    async fn query_resolution(&self) -> SessionResult<(u32, u32)> {
        let output = self
            .channel
            .execute(&BridgeCommand::screen_size(), Some(&self.endpoint))
            .await?;
        AdbShell::parse_screen_size(&output)
            .ok_or(SessionError::ResolutionUnavailable { output })
    }

    /// Run a device-targeted command. A `DeviceOffline` failure triggers one
    /// full restart-and-reconnect followed by exactly one retry.
    pub async fn execute(&mut self, command: &BridgeCommand) -> SessionResult<String> {
        if self.status != ConnectionStatus::Connected {
            return Err(SessionError::NotConnected);
        }
        match self.channel.execute(command, Some(&self.endpoint)).await {
            Ok(out) => Ok(out),
            Err(ChannelError::DeviceOffline { stderr }) => {
                log::warn!("📴 Device offline during '{command}': {stderr}");
                self.set_status(ConnectionStatus::Offline);
                self.recover_and_retry(command).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recover_and_retry(&mut self, command: &BridgeCommand) -> SessionResult<String> {
        if let Err(e) = self.restart_and_reconnect().await {
            return Err(SessionError::SessionLost {
                command: command.to_string(),
                reason: format!("offline recovery failed: {e}"),
            });
        }
        log::info!("🔁 Re-running '{command}' after recovery");
        self.channel
            .execute(command, Some(&self.endpoint))
            .await
            .map_err(|e| {
                if e.is_device_offline() {
                    self.set_status(ConnectionStatus::Offline);
                }
                SessionError::SessionLost {
                    command: command.to_string(),
                    reason: format!("retry after recovery failed: {e}"),
                }
            })
    }

    /// Stop the emulator, launch it again, wait for the bridge to see a ready
    /// device and reconnect.
    pub async fn restart_and_reconnect(&mut self) -> SessionResult<()> {
        log::info!("♻️ Restarting emulator {}", self.settings.emulator_process);
        self.set_status(ConnectionStatus::Disconnected);
        self.resolution = None;

        self.processes
            .ensure_stopped(&self.settings.emulator_process, self.settings.kill_grace)
            .await;
        self.processes.start(&self.settings.emulator_path)?;
        sleep(self.settings.boot_delay).await;
        self.wait_for_ready().await?;
        self.connect(self.settings.connect_attempts).await
    }

    /// Poll the device listing until a ready device appears.
    pub async fn wait_for_ready(&self) -> SessionResult<()> {
        log::info!("⏳ Waiting for emulator to come up...");
        let started = Instant::now();
        loop {
            match self.channel.execute(&BridgeCommand::devices(), None).await {
                Ok(out) if AdbShell::has_ready_device(&out) => {
                    log::info!("📱 Emulator is up and visible to the bridge");
                    return Ok(());
                }
                Ok(_) => log::debug!("No ready device yet"),
                Err(e) => log::debug!("Device listing failed: {e}"),
            }
            if started.elapsed() + self.settings.ready_poll_interval > self.settings.ready_timeout {
                log::error!("⏱️ Emulator did not become ready within {:?}", self.settings.ready_timeout);
                return Err(SessionError::DeviceNotReady {
                    timeout: self.settings.ready_timeout,
                });
            }
            sleep(self.settings.ready_poll_interval).await;
        }
    }

    /// Poll `get-state` until the device reports `device`.
    pub async fn wait_for_online(&self, timeout: Duration) -> SessionResult<()> {
        let started = Instant::now();
        loop {
            match self
                .channel
                .execute(&BridgeCommand::get_state(), Some(&self.endpoint))
                .await
            {
                Ok(out) if out.trim() == "device" => {
                    log::info!("📱 Device is online");
                    return Ok(());
                }
                Ok(out) => log::debug!("Device state: {out}"),
                Err(e) => log::debug!("get-state failed: {e}"),
            }
            if started.elapsed() >= timeout {
                return Err(SessionError::DeviceNotReady { timeout });
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    /// Capture the screen, rescaled to the session resolution if the
    /// screenshot came back at a different size.
    pub async fn capture_frame(&mut self) -> SessionResult<Frame> {
        let remote = self.settings.remote_screenshot_path.clone();
        let local = self.settings.local_screenshot_path.clone();

        self.execute(&BridgeCommand::screencap(&remote)).await?;
        self.execute(&BridgeCommand::pull(&remote, &local.to_string_lossy()))
            .await?;
        if let Err(e) = self.execute(&BridgeCommand::remove(&remote)).await {
            if e.is_fatal() {
                return Err(e);
            }
            log::debug!("Could not remove {remote} on device: {e}");
        }

        let bytes = tokio::fs::read(&local)
            .await
            .map_err(|source| SessionError::ScreenshotRead {
                path: local.clone(),
                source,
            })?;
        let frame = Frame::decode(&bytes).map_err(|e| SessionError::Capture {
            description: format!("decode {}: {e}", local.display()),
        })?;
        Ok(self.fit_to_resolution(frame))
    }

    fn fit_to_resolution(&self, frame: Frame) -> Frame {
        match self.resolution {
            Some((w, h)) if frame.dimensions() != (w, h) => {
                log::info!(
                    "📐 Screenshot {}x{} differs from device {w}x{h}, resizing",
                    frame.width(),
                    frame.height()
                );
                Frame::new(frame.image().resize_exact(w, h, FilterType::Triangle))
            }
            _ => frame,
        }
    }

    pub async fn tap(&mut self, x: u32, y: u32) -> SessionResult<()> {
        let (w, h) = self.resolution.ok_or(SessionError::NotConnected)?;
        if x > w || y > h {
            return Err(SessionError::TapOutOfBounds { x, y });
        }
        log::info!("👆 Tap at ({x}, {y})");
        self.execute(&BridgeCommand::tap(x, y)).await.map(|_| ())
    }

    pub async fn tap_center(&mut self) -> SessionResult<()> {
        let (w, h) = self.resolution.ok_or(SessionError::NotConnected)?;
        self.tap(w / 2, h / 2).await
    }

    pub async fn key_event(&mut self, key: KeyCode) -> SessionResult<()> {
        log::info!("⌨️ Key {}", key.as_str());
        self.execute(&BridgeCommand::key_event(key)).await.map(|_| ())
    }

    /// Drop the bridge connection. Failures are only logged.
    pub async fn disconnect(&mut self) {
        let command = BridgeCommand::disconnect(&self.endpoint.address);
        if let Err(e) = self.channel.execute(&command, None).await {
            log::debug!("Disconnect failed: {e}");
        }
        self.resolution = None;
        self.set_status(ConnectionStatus::Disconnected);
    }
}
