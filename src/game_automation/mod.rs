// Game automation module
// Runs the sign-in stage sequence against a device session, with restarts
// bounded by a budget.

pub mod orchestrator;
pub mod scenario;
pub mod types;


// Re-export the main types and functions for easy access
pub use orchestrator::{RunOptions, ScenarioRunner};
pub use scenario::{TEMPLATE_NAMES, default_stages, sign_in_stages};
pub use types::{RestartBudget, ScenarioOutcome, Stage, StageAction, TimeoutPolicy};
