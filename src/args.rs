use crate::config::Settings;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    SignIn,
    Screenshot,
}

/// 🤖 Unattended emulator sign-in automation
#[derive(Parser, Debug)]
#[command(name = "android-signin-run", version)]
#[command(about = "Drive an Android emulator through the daily sign-in flow", long_about = None)]
pub struct Args {
    /// TOML config file (defaults to ./android-signin-run.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Device address passed to adb, e.g. 127.0.0.1:5555
    #[arg(long, value_name = "ADDR")]
    pub address: Option<String>,

    /// Directory holding the <name>.png templates
    #[arg(long, value_name = "DIR")]
    pub templates: Option<PathBuf>,

    /// Maximum number of emulator restarts in one run
    #[arg(long, value_name = "N")]
    pub max_restarts: Option<u32>,

    /// Do not probe internet reachability before starting
    #[arg(long)]
    pub skip_network_check: bool,

    /// Connect, save one screenshot to cli-screenshot.png and exit
    #[arg(long, short = 's')]
    pub screenshot: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    pub fn mode(&self) -> Mode {
        if self.screenshot {
            Mode::Screenshot
        } else {
            Mode::SignIn
        }
    }

    /// Command-line values win over the config file.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(address) = &self.address {
            settings.device_address = address.clone();
        }
        if let Some(dir) = &self.templates {
            settings.template_dir = dir.clone();
        }
        if let Some(max) = self.max_restarts {
            settings.max_restarts = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_runs_sign_in() {
        let args = Args::try_parse_from(["android-signin-run"]).unwrap();
        assert_eq!(args.mode(), Mode::SignIn);
        assert!(!args.debug);
    }

    #[test]
    fn overrides_replace_config_values() {
        let args = Args::try_parse_from([
            "android-signin-run",
            "--address",
            "127.0.0.1:5557",
            "--templates",
            "fig",
            "--max-restarts",
            "1",
        ])
        .unwrap();
        let mut settings = Settings::default();
        args.apply_to(&mut settings);

        assert_eq!(settings.device_address, "127.0.0.1:5557");
        assert_eq!(settings.template_dir, PathBuf::from("fig"));
        assert_eq!(settings.max_restarts, 1);
    }

    #[test]
    fn screenshot_flag_selects_mode() {
        let args = Args::try_parse_from(["android-signin-run", "-s", "--debug"]).unwrap();
        assert_eq!(args.mode(), Mode::Screenshot);
        assert!(args.debug);
    }

    #[test]
    fn bad_restart_count_is_rejected() {
        assert!(Args::try_parse_from(["android-signin-run", "--max-restarts", "many"]).is_err());
    }
}
