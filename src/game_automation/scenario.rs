// The fixed sign-in stage sequence
use super::types::{Stage, StageAction, TimeoutPolicy};
use crate::adb::KeyCode;
use crate::config::StageTiming;
use std::collections::HashMap;
use std::time::Duration;

pub const HOME_SCREEN_MARKER: &str = "home-screen-marker";
pub const GAME_ICON: &str = "game-icon";
pub const CLICK_GAME_PROMPT: &str = "click-game-prompt";
pub const CLICK_SCREEN_PROMPT: &str = "click-screen-prompt";
pub const ANNOUNCEMENT_MARKER: &str = "announcement-marker";
pub const EXIT_CONFIRMATION: &str = "exit-confirmation";

/// Every template the sign-in scenario looks up, in stage order
pub const TEMPLATE_NAMES: [&str; 6] = [
    HOME_SCREEN_MARKER,
    GAME_ICON,
    CLICK_GAME_PROMPT,
    CLICK_SCREEN_PROMPT,
    ANNOUNCEMENT_MARKER,
    EXIT_CONFIRMATION,
];

/// Built-in stages with their default timing.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new("navigate-home", HOME_SCREEN_MARKER)
            .on_miss(StageAction::KeyEvent(KeyCode::Home))
            .poll_every(Duration::from_secs(5)),
        // the game takes a long time to boot after the icon is tapped
        Stage::new("launch-game", GAME_ICON)
            .on_match(StageAction::TapMatch)
            .poll_every(Duration::from_secs(2))
            .wait_at_most(Duration::from_secs(60))
            .settle(Duration::from_secs(40)),
        Stage::new("enter-game", CLICK_GAME_PROMPT)
            .on_match(StageAction::TapMatch)
            .settle(Duration::from_secs(9)),
        Stage::new("dismiss-title", CLICK_SCREEN_PROMPT)
            .on_match(StageAction::TapCenter)
            .settle(Duration::from_secs(9)),
        Stage::new("close-announcement", ANNOUNCEMENT_MARKER)
            .on_match(StageAction::KeyEvent(KeyCode::Back))
            .settle(Duration::from_secs(5)),
        Stage::new("confirm-exit", EXIT_CONFIRMATION)
            .on_match(StageAction::KeyEvent(KeyCode::Back))
            .on_miss(StageAction::KeyEvent(KeyCode::Back))
            .settle(Duration::from_secs(5))
            .on_timeout(TimeoutPolicy::RepeatAction),
    ]
}

/// Built-in stages with per-stage overrides applied by stage name.
pub fn sign_in_stages(overrides: &HashMap<String, StageTiming>) -> Vec<Stage> {
    let mut stages = default_stages();
    for stage in &mut stages {
        if let Some(timing) = overrides.get(&stage.name) {
            timing.apply(stage);
        }
    }
    for name in overrides.keys() {
        if !stages.iter().any(|s| &s.name == name) {
            log::warn!("⚠️ Ignoring timing override for unknown stage '{name}'");
        }
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_matches_sign_in_flow() {
        let names: Vec<_> = default_stages().into_iter().map(|s| s.template).collect();
        assert_eq!(names, TEMPLATE_NAMES);
    }

    #[test]
    fn only_exit_confirmation_repeats_on_timeout() {
        let stages = default_stages();
        let repeating: Vec<_> = stages
            .iter()
            .filter(|s| s.on_timeout == TimeoutPolicy::RepeatAction)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(repeating, ["confirm-exit"]);
    }

    #[test]
    fn overrides_apply_by_name() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "enter-game".to_string(),
            StageTiming {
                max_wait_secs: Some(30),
                ..StageTiming::default()
            },
        );
        overrides.insert("no-such-stage".to_string(), StageTiming::default());

        let stages = sign_in_stages(&overrides);
        let enter = stages.iter().find(|s| s.name == "enter-game").unwrap();
        assert_eq!(enter.max_wait, Duration::from_secs(30));
        assert_eq!(enter.poll_interval, Duration::from_millis(500));
        assert_eq!(stages.len(), 6);
    }
}
