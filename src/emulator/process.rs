use super::ports;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind,
};
use thiserror::Error;
use tokio::time::{Instant, sleep};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Emulator executable not found at {path:?}")]
    ExecutableMissing { path: PathBuf },

    #[error("Failed to launch {path:?}: {source}")]
    SpawnFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result of `ensure_stopped` for one process name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopOutcome {
    pub terminated: usize,
    pub killed: usize,
    pub skipped: usize,
}

impl StopOutcome {
    pub fn nothing_running(&self) -> bool {
        self.terminated == 0 && self.killed == 0 && self.skipped == 0
    }

    fn record(&mut self, termination: Termination) {
        match termination {
            Termination::Graceful | Termination::Vanished => self.terminated += 1,
            Termination::Forced => self.killed += 1,
            Termination::Denied => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRelease {
    NotFound,
    Released { pids: Vec<u32> },
    /// Every owner refused to stop; the port is still taken
    StillHeld { pids: Vec<u32> },
}

impl PortRelease {
    fn from_attempts(released: Vec<u32>, denied: Vec<u32>) -> Self {
        match (released.is_empty(), denied.is_empty()) {
            (true, true) => PortRelease::NotFound,
            (true, false) => PortRelease::StillHeld { pids: denied },
            (false, _) => PortRelease::Released { pids: released },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Graceful,
    Forced,
    Vanished,
    Denied,
}

// Trait defining the process control boundary (system implementation, test fakes)
#[allow(async_fn_in_trait)]
pub trait ProcessControl {
    fn is_running(&self, name: &str) -> bool;

    /// Terminate every process called `name`, force-killing any that outlive
    /// `grace`. Nothing running is a successful no-op.
    async fn ensure_stopped(&self, name: &str, grace: Duration) -> StopOutcome;

    /// Launch `executable` and return immediately.
    fn start(&self, executable: &Path) -> Result<(), ProcessError>;

    async fn release_port(&self, port: u16, grace: Duration) -> PortRelease;

    async fn stop_all(&self, names: &[String], grace: Duration) {
        for name in names {
            let outcome = self.ensure_stopped(name, grace).await;
            if outcome.nothing_running() {
                log::info!("🧹 No running {name} process");
            }
        }
    }
}

/// Process control over the host OS process table.
#[derive(Debug, Default)]
pub struct SystemProcesses;

impl SystemProcesses {
    pub fn new() -> Self {
        Self
    }

    fn snapshot() -> System {
        let mut system = System::new();
        // exe paths are only filled in when asked for
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
        );
        system
    }

    fn name_matches(process: &Process, name: &str) -> bool {
        if process.name().to_string_lossy().eq_ignore_ascii_case(name) {
            return true;
        }
        process
            .exe()
            .and_then(|exe| exe.file_name())
            .is_some_and(|file| file.to_string_lossy().eq_ignore_ascii_case(name))
    }

    fn matching_pids(name: &str) -> Vec<Pid> {
        let own_pid = std::process::id();
        let system = Self::snapshot();
        let mut pids: Vec<Pid> = system
            .processes()
            .iter()
            .filter(|(pid, process)| {
                pid.as_u32() != own_pid
                    && process.status() != ProcessStatus::Zombie
                    && Self::name_matches(process, name)
            })
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort();
        pids
    }

    fn is_alive(pid: Pid) -> bool {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), ProcessRefreshKind::new());
        system
            .process(pid)
            .is_some_and(|p| p.status() != ProcessStatus::Zombie)
    }

    async fn terminate(pid: Pid, grace: Duration) -> Termination {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), ProcessRefreshKind::new());
        let Some(process) = system.process(pid) else {
            return Termination::Vanished;
        };

        match process.kill_with(Signal::Term) {
            Some(true) => {
                let deadline = Instant::now() + grace;
                while Instant::now() < deadline {
                    if !Self::is_alive(pid) {
                        return Termination::Graceful;
                    }
                    sleep(EXIT_POLL_INTERVAL).await;
                }
                if !Self::is_alive(pid) {
                    return Termination::Graceful;
                }
                log::warn!("⏱️ PID {pid} ignored terminate for {grace:?}, killing");
            }
            Some(false) => {
                log::debug!("PID {pid} refused terminate, trying kill");
            }
            // graceful signals are not available on this platform
            None => {}
        }

        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), ProcessRefreshKind::new());
        match system.process(pid) {
            None => Termination::Vanished,
            Some(process) => {
                if process.kill() {
                    Termination::Forced
                } else {
                    log::warn!("🔒 Permission denied stopping PID {pid}, skipping");
                    Termination::Denied
                }
            }
        }
    }
}

impl ProcessControl for SystemProcesses {
    fn is_running(&self, name: &str) -> bool {
        !Self::matching_pids(name).is_empty()
    }

    async fn ensure_stopped(&self, name: &str, grace: Duration) -> StopOutcome {
        let mut outcome = StopOutcome::default();
        for pid in Self::matching_pids(name) {
            log::info!("🛑 Stopping {name} (PID {pid})");
            let termination = Self::terminate(pid, grace).await;
            match termination {
                Termination::Graceful => log::info!("✅ {name} (PID {pid}) exited"),
                Termination::Forced => log::info!("💀 {name} (PID {pid}) force-killed"),
                Termination::Vanished => log::debug!("{name} (PID {pid}) already gone"),
                Termination::Denied => {}
            }
            outcome.record(termination);
        }
        outcome
    }

    fn start(&self, executable: &Path) -> Result<(), ProcessError> {
        if !executable.exists() {
            return Err(ProcessError::ExecutableMissing {
                path: executable.to_path_buf(),
            });
        }
        let mut child = tokio::process::Command::new(executable)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|source| ProcessError::SpawnFailed {
                path: executable.to_path_buf(),
                source,
            })?;
        log::info!("🚀 Launched {}", executable.display());

        // Reap the child in the background so it never lingers as a zombie
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
        Ok(())
    }

    async fn release_port(&self, port: u16, grace: Duration) -> PortRelease {
        let own_pid = std::process::id();
        let owners: Vec<u32> = ports::find_port_owners(port)
            .await
            .into_iter()
            .filter(|pid| *pid != own_pid)
            .collect();
        if owners.is_empty() {
            log::info!("🔌 No process holds port {port}");
            return PortRelease::NotFound;
        }

        let mut released = Vec::new();
        let mut denied = Vec::new();
        for pid in owners {
            log::info!("🔌 Port {port} held by PID {pid}, stopping it");
            match Self::terminate(Pid::from_u32(pid), grace).await {
                Termination::Denied => denied.push(pid),
                _ => released.push(pid),
            }
        }
        if !denied.is_empty() {
            log::warn!("🔒 Port {port} may still be held by {denied:?}");
        }
        PortRelease::from_attempts(released, denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_SUCH_PROCESS: &str = "definitely-not-running-emulator.exe";

    #[test]
    fn absent_process_is_not_running() {
        assert!(!SystemProcesses::new().is_running(NO_SUCH_PROCESS));
    }

    #[tokio::test]
    async fn stopping_absent_process_is_noop() {
        let outcome = SystemProcesses::new()
            .ensure_stopped(NO_SUCH_PROCESS, Duration::from_millis(100))
            .await;
        assert!(outcome.nothing_running());
    }

    #[test]
    fn start_missing_executable_fails() {
        let err = SystemProcesses::new()
            .start(Path::new("/nonexistent/dnplayer.exe"))
            .unwrap_err();
        assert!(matches!(err, ProcessError::ExecutableMissing { .. }));
    }

    #[tokio::test]
    async fn releasing_unused_port_reports_not_found() {
        // nothing listens on port 1 on a developer machine or CI runner
        let release = SystemProcesses::new()
            .release_port(1, Duration::from_millis(100))
            .await;
        assert_eq!(release, PortRelease::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stops_a_real_child_process() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = Pid::from_u32(child.id().unwrap());

        let reaper = tokio::spawn(async move { child.wait().await });
        let termination = SystemProcesses::terminate(pid, Duration::from_secs(5)).await;
        assert!(matches!(
            termination,
            Termination::Graceful | Termination::Vanished
        ));
        assert!(reaper.await.unwrap().is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_ignoring_terminate_is_force_killed() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "trap '' TERM; while true; do sleep 0.1; done"])
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = Pid::from_u32(child.id().unwrap());
        // give the shell time to install its trap
        sleep(Duration::from_millis(300)).await;

        let reaper = tokio::spawn(async move { child.wait().await });
        let started = Instant::now();
        let termination = SystemProcesses::terminate(pid, Duration::from_secs(1)).await;
        assert_eq!(termination, Termination::Forced);
        assert!(started.elapsed() >= Duration::from_secs(1));

        let status = reaper.await.unwrap().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn stop_outcome_counts_each_termination() {
        let mut outcome = StopOutcome::default();
        outcome.record(Termination::Graceful);
        outcome.record(Termination::Forced);
        outcome.record(Termination::Denied);
        assert_eq!(
            outcome,
            StopOutcome {
                terminated: 1,
                killed: 1,
                skipped: 1
            }
        );
        assert!(!outcome.nothing_running());
    }

    #[test]
    fn port_owners_that_refuse_leave_port_held() {
        assert_eq!(PortRelease::from_attempts(vec![], vec![]), PortRelease::NotFound);
        assert_eq!(
            PortRelease::from_attempts(vec![], vec![4, 8]),
            PortRelease::StillHeld { pids: vec![4, 8] }
        );
        assert_eq!(
            PortRelease::from_attempts(vec![15], vec![16]),
            PortRelease::Released { pids: vec![15] }
        );
    }
}
