use super::error::{ChannelError, ChannelResult};
use super::types::{BridgeCommand, CommandChannel, Device, DeviceEndpoint};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Command channel backed by the `adb` command-line tool.
pub struct AdbShell {
    adb_path: PathBuf,
    command_timeout: Duration,
}

impl AdbShell {
    pub fn new(adb_path: impl Into<PathBuf>, command_timeout: Duration) -> Self {
        Self {
            adb_path: adb_path.into(),
            command_timeout,
        }
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    /// Verify the bridge binary can be invoked before any automation starts.
    pub fn ensure_available(&self) -> Result<(), String> {
        match std::process::Command::new(&self.adb_path)
            .arg("version")
            .output()
        {
            Ok(out) => {
                if !out.status.success() {
                    return Err(format!(
                        "'{}' found but 'version' returned non-zero ({}). Check the emulator's bundled adb.",
                        self.adb_path.display(),
                        out.status
                    ));
                }
                Ok(())
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Err(format!(
                        "'{}' not found. Point 'adb_path' at the emulator's adb binary or add adb to PATH.",
                        self.adb_path.display()
                    ))
                } else {
                    Err(format!(
                        "Failed to invoke '{}': {e}",
                        self.adb_path.display()
                    ))
                }
            }
        }
    }

    /// Parse `adb devices` output, skipping the header line.
    pub fn parse_devices(output: &str) -> Vec<Device> {
        output
            .lines()
            .skip_while(|line| !line.starts_with("List of devices"))
            .skip(1)
            .filter_map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 2 {
                    Some(Device {
                        serial: parts[0].to_string(),
                        state: parts[1].to_string(),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// True when the listing contains at least one device in the `device` state.
    pub fn has_ready_device(output: &str) -> bool {
        Self::parse_devices(output).iter().any(Device::is_ready)
    }

    pub fn parse_screen_size(stdout: &str) -> Option<(u32, u32)> {
        for line in stdout.lines() {
            if let Some(size_str) = line.trim().strip_prefix("Physical size: ") {
                let parts: Vec<&str> = size_str.trim().split('x').collect();
                if parts.len() == 2
                    && let (Ok(x), Ok(y)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>())
                    && x > 0
                    && y > 0
                {
                    return Some((x, y));
                }
            }
        }
        None
    }
}

impl CommandChannel for AdbShell {
    async fn execute(
        &self,
        command: &BridgeCommand,
        target: Option<&DeviceEndpoint>,
    ) -> ChannelResult<String> {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(endpoint) = target {
            cmd.arg("-s").arg(&endpoint.address);
        }
        cmd.args(command.args()).kill_on_drop(true);

        log::debug!("⚙️ adb {command}");
        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Err(_) => {
                return Err(ChannelError::Timeout {
                    duration: self.command_timeout,
                });
            }
            Ok(Err(source)) => {
                return Err(ChannelError::ProcessSpawnFailed {
                    program: self.adb_path.display().to_string(),
                    source,
                });
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            // some adb builds report errors on stdout
            let combined = if stderr.trim().is_empty() {
                stdout.into_owned()
            } else {
                stderr.into_owned()
            };
            return Err(ChannelError::from_failure_output(&combined));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
