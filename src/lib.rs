pub mod adb;
pub mod args;
pub mod config;
pub mod emulator;
pub mod game_automation;
pub mod network;
pub mod template_matching;

pub use adb::{AdbShell, Session};
pub use game_automation::{ScenarioOutcome, ScenarioRunner};
