// Scenario orchestrator: drives the stage sequence against a live session
use super::types::{RestartBudget, ScenarioOutcome, Stage, StageAction, TimeoutPolicy};
use crate::adb::{CommandChannel, Session, SessionResult};
use crate::emulator::{PortRelease, ProcessControl};
use crate::network::ConnectivityProbe;
use crate::template_matching::{MatchResult, TemplateMatcher};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Host-side behaviour around the stage sequence.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub skip_network_check: bool,
    /// Helper processes stopped before the first emulator launch
    pub cleanup_processes: Vec<String>,
    pub stop_emulator_on_complete: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            skip_network_check: false,
            cleanup_processes: Vec::new(),
            stop_emulator_on_complete: true,
        }
    }
}

enum StageEnd {
    Advanced,
    TimedOut,
    Fatal(String),
}

pub struct ScenarioRunner<C, P, N> {
    session: Session<C, P>,
    matcher: TemplateMatcher,
    probe: N,
    stages: Vec<Stage>,
    budget: RestartBudget,
    options: RunOptions,
    cancel: CancellationToken,
}

impl<C, P, N> ScenarioRunner<C, P, N>
where
    C: CommandChannel,
    P: ProcessControl,
    N: ConnectivityProbe,
{
    pub fn new(session: Session<C, P>, matcher: TemplateMatcher, probe: N, stages: Vec<Stage>) -> Self {
        Self {
            session,
            matcher,
            probe,
            stages,
            budget: RestartBudget::default(),
            options: RunOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_budget(mut self, budget: RestartBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Cancelling `token` stops the run at the next await point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn budget(&self) -> &RestartBudget {
        &self.budget
    }

    pub fn session(&self) -> &Session<C, P> {
        &self.session
    }

    pub async fn run(&mut self) -> ScenarioOutcome {
        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("🛑 Interrupted by operator");
                ScenarioOutcome::Interrupted
            }
            outcome = self.drive() => outcome,
        };
        self.finish(&outcome).await;
        outcome
    }

    async fn drive(&mut self) -> ScenarioOutcome {
        if self.options.skip_network_check {
            log::info!("🌐 Network check skipped");
        } else if !self.probe.is_online().await {
            return ScenarioOutcome::Fatal("network unreachable".to_string());
        }

        self.prepare_host().await;
        if let Err(outcome) = self.restart_until_up().await {
            return outcome;
        }

        let mut index = 0;
        while index < self.stages.len() {
            let stage = self.stages[index].clone();
            log::info!("▶️ Stage {}/{}: {}", index + 1, self.stages.len(), stage.name);
            match self.run_stage(&stage).await {
                StageEnd::Advanced => index += 1,
                StageEnd::TimedOut => {
                    let reason = format!("stage '{}' timed out", stage.name);
                    if let Err(outcome) = self.consume_budget(&reason) {
                        return outcome;
                    }
                    if let Err(outcome) = self.restart_until_up().await {
                        return outcome;
                    }
                    index = 0;
                }
                StageEnd::Fatal(reason) => return ScenarioOutcome::Fatal(reason),
            }
        }
        log::info!("✅ All {} stages completed", self.stages.len());
        ScenarioOutcome::Completed
    }

    async fn prepare_host(&mut self) {
        let grace = self.session.settings().kill_grace;
        log::info!("🧹 Stopping stale helper processes");
        self.session
            .processes()
            .stop_all(&self.options.cleanup_processes, grace)
            .await;

        if let Some(port) = self.session.endpoint().port() {
            match self.session.processes().release_port(port, grace).await {
                PortRelease::NotFound => log::info!("🔓 Port {port} is free"),
                PortRelease::Released { pids } => {
                    log::info!("🔓 Released port {port} held by {pids:?}")
                }
                PortRelease::StillHeld { pids } => {
                    log::warn!("🔒 Port {port} still held by {pids:?}, the bridge may fail to connect")
                }
            }
        }
    }

    /// Restart the emulator until it is online. Failed attempts draw from the
    /// restart budget.
    async fn restart_until_up(&mut self) -> Result<(), ScenarioOutcome> {
        loop {
            match self.bring_device_up().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => {
                    log::error!("❌ {e}");
                    return Err(ScenarioOutcome::Fatal(e.to_string()));
                }
                Err(e) => {
                    log::warn!("⚠️ Device bring-up failed: {e}");
                    self.consume_budget(&format!("device bring-up failed: {e}"))?;
                }
            }
        }
    }

    async fn bring_device_up(&mut self) -> SessionResult<()> {
        self.session.restart_and_reconnect().await?;
        let timeout = self.session.settings().online_timeout;
        self.session.wait_for_online(timeout).await
    }

    fn consume_budget(&mut self, reason: &str) -> Result<(), ScenarioOutcome> {
        if self.budget.try_consume() {
            log::warn!(
                "♻️ Restart {}/{}: {reason}",
                self.budget.used(),
                self.budget.max()
            );
            Ok(())
        } else {
            log::error!(
                "❌ Restart budget exhausted after {} restarts: {reason}",
                self.budget.used()
            );
            Err(ScenarioOutcome::Fatal(format!(
                "restart budget exhausted after {} restarts: {reason}",
                self.budget.used()
            )))
        }
    }

    async fn run_stage(&mut self, stage: &Stage) -> StageEnd {
        let started = Instant::now();
        let mut timeout_reported = false;

        loop {
            let result = match self.session.capture_frame().await {
                Ok(frame) => self.matcher.find(&frame, &stage.template),
                Err(e) if e.is_fatal() => return StageEnd::Fatal(e.to_string()),
                Err(e) => {
                    log::warn!("📷 Capture failed, counting as miss: {e}");
                    MatchResult::default()
                }
            };

            if result.found {
                log::info!("🎯 {} found (score {:.3})", stage.template, result.score);
                match self.perform(stage.on_match, result.center).await {
                    Ok(()) => {
                        if !stage.settle_after_match.is_zero() {
                            log::info!("⏳ Waiting {:?} for the screen to settle", stage.settle_after_match);
                            sleep(stage.settle_after_match).await;
                        }
                        return StageEnd::Advanced;
                    }
                    Err(e) if e.is_fatal() => return StageEnd::Fatal(e.to_string()),
                    Err(e) => log::warn!("⚠️ Action on {} failed: {e}", stage.template),
                }
            } else {
                log::debug!("👀 {} not on screen yet", stage.template);
                if let Err(e) = self.perform(stage.on_miss, None).await {
                    if e.is_fatal() {
                        return StageEnd::Fatal(e.to_string());
                    }
                    log::warn!("⚠️ Miss action failed: {e}");
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= stage.max_wait {
                match stage.on_timeout {
                    TimeoutPolicy::Escalate => {
                        log::warn!("⏱️ Stage '{}' timed out after {elapsed:?}", stage.name);
                        return StageEnd::TimedOut;
                    }
                    TimeoutPolicy::RepeatAction if !timeout_reported => {
                        log::warn!(
                            "⏱️ Stage '{}' exceeded {:?}, still repeating {:?}",
                            stage.name,
                            stage.max_wait,
                            stage.on_miss
                        );
                        timeout_reported = true;
                    }
                    TimeoutPolicy::RepeatAction => {}
                }
            }
            sleep(stage.poll_interval).await;
        }
    }

    async fn perform(&mut self, action: StageAction, center: Option<(u32, u32)>) -> SessionResult<()> {
        match action {
            StageAction::None => Ok(()),
            StageAction::TapMatch => match center {
                Some((x, y)) => self.session.tap(x, y).await,
                None => Ok(()),
            },
            StageAction::TapCenter => self.session.tap_center().await,
            StageAction::KeyEvent(key) => self.session.key_event(key).await,
        }
    }

    async fn finish(&mut self, outcome: &ScenarioOutcome) {
        match outcome {
            ScenarioOutcome::Completed => log::info!("🏁 Sign-in completed"),
            ScenarioOutcome::Fatal(reason) => log::error!("💥 Sign-in failed: {reason}"),
            ScenarioOutcome::Interrupted => {}
        }

        if *outcome == ScenarioOutcome::Completed && self.options.stop_emulator_on_complete {
            let settings = self.session.settings();
            let (name, grace) = (settings.emulator_process.clone(), settings.kill_grace);
            log::info!("🛑 Closing {name}");
            self.session.processes().ensure_stopped(&name, grace).await;
        }
        self.session.disconnect().await;
    }
}
