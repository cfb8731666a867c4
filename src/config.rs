//! Runtime configuration loaded from an optional TOML file
//!
//! Every field has a default matching a stock LDPlayer 9 install, so a run
//! without any config file works on the machine the automation was built for.

use crate::adb::{DeviceEndpoint, SessionSettings};
use crate::game_automation::{RunOptions, Stage};
use crate::template_matching::DEFAULT_THRESHOLD;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "android-signin-run.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub adb_path: PathBuf,
    pub device_address: String,
    pub device_label: String,
    pub emulator_path: PathBuf,
    pub emulator_process: String,
    /// Helper processes left over from earlier emulator sessions
    pub cleanup_processes: Vec<String>,
    pub template_dir: PathBuf,
    pub match_threshold: f32,
    pub max_restarts: u32,
    pub command_timeout_secs: u64,
    pub stop_emulator_on_complete: bool,
    pub connect: ConnectSettings,
    pub recovery: RecoverySettings,
    pub network: NetworkSettings,
    pub capture: CaptureSettings,
    /// Per-stage timing overrides keyed by stage name
    pub stages: HashMap<String, StageTiming>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("D:/APP/LDPlayer9/adb.exe"),
            device_address: "127.0.0.1:5555".to_string(),
            device_label: "LDPlayer".to_string(),
            emulator_path: PathBuf::from("D:/APP/LDPlayer9/dnplayer.exe"),
            emulator_process: "dnplayer.exe".to_string(),
            cleanup_processes: vec![
                "ldplayerservice.exe".to_string(),
                "Ld9BoxHeadless.exe".to_string(),
                "Ld9BoxSVC.exe".to_string(),
            ],
            template_dir: PathBuf::from("templates"),
            match_threshold: DEFAULT_THRESHOLD,
            max_restarts: 3,
            command_timeout_secs: 30,
            stop_emulator_on_complete: true,
            connect: ConnectSettings::default(),
            recovery: RecoverySettings::default(),
            network: NetworkSettings::default(),
            capture: CaptureSettings::default(),
            stages: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectSettings {
    pub attempts: u32,
    pub retry_delay_secs: u64,
    pub settle_secs: u64,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay_secs: 2,
            settle_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub boot_delay_secs: u64,
    pub ready_timeout_secs: u64,
    pub ready_poll_secs: u64,
    pub kill_grace_secs: u64,
    pub online_timeout_secs: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            boot_delay_secs: 20,
            ready_timeout_secs: 60,
            ready_poll_secs: 5,
            kill_grace_secs: 5,
            online_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub urls: Vec<String>,
    pub timeout_secs: u64,
    pub rounds: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            urls: vec![
                "https://www.baidu.com".to_string(),
                "https://www.taobao.com".to_string(),
            ],
            timeout_secs: 5,
            rounds: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub remote_path: String,
    pub local_path: PathBuf,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            remote_path: "/sdcard/screenshot.png".to_string(),
            local_path: PathBuf::from("screenshot.png"),
        }
    }
}

/// Optional overrides for one stage's timing
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageTiming {
    pub poll_interval_ms: Option<u64>,
    pub max_wait_secs: Option<u64>,
    pub settle_secs: Option<u64>,
}

impl StageTiming {
    pub fn apply(&self, stage: &mut Stage) {
        if let Some(ms) = self.poll_interval_ms {
            stage.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = self.max_wait_secs {
            stage.max_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = self.settle_secs {
            stage.settle_after_match = Duration::from_secs(secs);
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from [`DEFAULT_CONFIG_FILE`] when it
    /// exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    log::debug!("No config file at {default:?}, using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let settings = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        log::debug!("Loaded settings from {path:?}");
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_address.trim().is_empty() {
            return Err(ConfigError::Invalid("device_address is empty".into()));
        }
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be in (0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.connect.attempts == 0 {
            return Err(ConfigError::Invalid("connect.attempts must be at least 1".into()));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid("command_timeout_secs must be positive".into()));
        }
        if self.recovery.ready_poll_secs == 0 {
            return Err(ConfigError::Invalid("recovery.ready_poll_secs must be positive".into()));
        }
        if self.network.rounds == 0 {
            return Err(ConfigError::Invalid("network.rounds must be at least 1".into()));
        }
        let mut names: Vec<&String> = self.stages.keys().collect();
        names.sort();
        for name in names {
            if self.stages[name].poll_interval_ms == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "stages.{name}.poll_interval_ms must be positive"
                )));
            }
        }
        Ok(())
    }

    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new(&self.device_address, &self.device_label)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            connect_attempts: self.connect.attempts,
            connect_retry_delay: Duration::from_secs(self.connect.retry_delay_secs),
            connect_settle: Duration::from_secs(self.connect.settle_secs),
            boot_delay: Duration::from_secs(self.recovery.boot_delay_secs),
            ready_timeout: Duration::from_secs(self.recovery.ready_timeout_secs),
            ready_poll_interval: Duration::from_secs(self.recovery.ready_poll_secs),
            online_timeout: Duration::from_secs(self.recovery.online_timeout_secs),
            kill_grace: Duration::from_secs(self.recovery.kill_grace_secs),
            emulator_process: self.emulator_process.clone(),
            emulator_path: self.emulator_path.clone(),
            remote_screenshot_path: self.capture.remote_path.clone(),
            local_screenshot_path: self.capture.local_path.clone(),
        }
    }

    pub fn run_options(&self, skip_network_check: bool) -> RunOptions {
        RunOptions {
            skip_network_check,
            cleanup_processes: self.cleanup_processes.clone(),
            stop_emulator_on_complete: self.stop_emulator_on_complete,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.device_address, "127.0.0.1:5555");
        assert_eq!(settings.max_restarts, 3);
        assert!(settings.stop_emulator_on_complete);
        assert_eq!(settings.network.rounds, 2);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            device_address = "127.0.0.1:5557"
            max_restarts = 5

            [recovery]
            boot_delay_secs = 30

            [stages.enter-game]
            max_wait_secs = 90
            "#,
        )
        .unwrap();

        assert_eq!(settings.endpoint().port(), Some(5557));
        assert_eq!(settings.max_restarts, 5);
        let session = settings.session_settings();
        assert_eq!(session.boot_delay, Duration::from_secs(30));
        assert_eq!(session.ready_timeout, Duration::from_secs(60));
        assert_eq!(
            settings.stages["enter-game"],
            StageTiming {
                max_wait_secs: Some(90),
                ..StageTiming::default()
            }
        );
    }

    #[test]
    fn unknown_stage_timing_key_is_rejected() {
        let err = Settings::from_toml("[stages.enter-game]\nmax_wait = 90\n");
        assert!(err.is_err());
    }

    #[test]
    fn threshold_out_of_range_is_invalid() {
        let settings = Settings::from_toml("match_threshold = 1.5").unwrap();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_poll_intervals_are_invalid() {
        for content in [
            "[recovery]\nready_poll_secs = 0\n",
            "[network]\nrounds = 0\n",
            "[stages.navigate-home]\npoll_interval_ms = 0\n",
        ] {
            let settings = Settings::from_toml(content).unwrap();
            assert!(
                matches!(settings.validate(), Err(ConfigError::Invalid(_))),
                "accepted {content:?}"
            );
        }
    }

    #[test]
    fn load_rejects_zero_poll_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[stages.enter-game]\npoll_interval_ms = 0\n").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn load_reports_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "template_dir = \"fig\"\n[capture]\nlocal_path = \"shot.png\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.template_dir, PathBuf::from("fig"));
        assert_eq!(
            settings.session_settings().local_screenshot_path,
            PathBuf::from("shot.png")
        );
    }
}
