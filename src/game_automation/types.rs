// Types and enums for the sign-in scenario
use crate::adb::KeyCode;
use std::fmt;
use std::time::Duration;

/// What to do with the device after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    None,
    /// Tap the center of the matched area
    TapMatch,
    TapCenter,
    KeyEvent(KeyCode),
}

/// Behaviour once a stage has waited `max_wait` without seeing its marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Restart the emulator and start over from the first stage
    Escalate,
    /// Keep performing the miss action every poll
    RepeatAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub template: String,
    pub on_match: StageAction,
    pub on_miss: StageAction,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    /// Pause after the match action before moving on
    pub settle_after_match: Duration,
    pub on_timeout: TimeoutPolicy,
}

impl Stage {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            on_match: StageAction::None,
            on_miss: StageAction::None,
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(120),
            settle_after_match: Duration::ZERO,
            on_timeout: TimeoutPolicy::Escalate,
        }
    }

    pub fn on_match(mut self, action: StageAction) -> Self {
        self.on_match = action;
        self
    }

    pub fn on_miss(mut self, action: StageAction) -> Self {
        self.on_miss = action;
        self
    }

    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn wait_at_most(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn settle(mut self, delay: Duration) -> Self {
        self.settle_after_match = delay;
        self
    }

    pub fn on_timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.on_timeout = policy;
        self
    }
}

/// Bounds the number of full emulator restarts in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartBudget {
    max: u32,
    used: u32,
}

impl RestartBudget {
    pub fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    /// Take one restart from the budget. Returns false once it is spent.
    pub fn try_consume(&mut self) -> bool {
        if self.used >= self.max {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.max - self.used
    }
}

impl Default for RestartBudget {
    fn default() -> Self {
        Self::new(3)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Completed,
    Fatal(String),
    Interrupted,
}

impl ScenarioOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            ScenarioOutcome::Completed => 0,
            ScenarioOutcome::Fatal(_) => 1,
            ScenarioOutcome::Interrupted => 130,
        }
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioOutcome::Completed => write!(f, "completed"),
            ScenarioOutcome::Fatal(reason) => write!(f, "fatal: {reason}"),
            ScenarioOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}
