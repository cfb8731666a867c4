//! Local TCP port ownership lookup via the platform's socket listing tool.

use std::time::Duration;
use tokio::process::Command;

/// Upper bound on one socket listing; a hung tool is treated as "no owner".
const LISTING_TIMEOUT: Duration = Duration::from_secs(10);

/// Return the PIDs owning a local TCP socket on `port`.
///
/// A missing tool or a failed listing yields an empty list; callers treat
/// that the same as "no owner".
pub async fn find_port_owners(port: u16) -> Vec<u32> {
    let (program, args) = listing_command(port);
    let Some(stdout) = run_listing(program, &args, LISTING_TIMEOUT).await else {
        return Vec::new();
    };
    if cfg!(windows) {
        parse_netstat(&stdout, port)
    } else {
        parse_lsof(&stdout, port)
    }
}

async fn run_listing(program: &str, args: &[String], limit: Duration) -> Option<String> {
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    match tokio::time::timeout(limit, cmd.output()).await {
        // lsof exits 1 when nothing matched, so the status is not checked
        Ok(Ok(output)) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
        Ok(Err(e)) => {
            log::debug!("🔌 Could not run {program}: {e}");
            None
        }
        Err(_) => {
            log::warn!("⏱️ {program} did not finish within {limit:?}, assuming no port owner");
            None
        }
    }
}

fn listing_command(port: u16) -> (&'static str, Vec<String>) {
    if cfg!(windows) {
        ("netstat", vec!["-ano".into(), "-p".into(), "TCP".into()])
    } else {
        (
            "lsof",
            vec![
                "-nP".into(),
                format!("-iTCP:{port}"),
                "-F".into(),
                "pn".into(),
            ],
        )
    }
}

fn local_port_matches(local: &str, port: u16) -> bool {
    local
        .rsplit_once(':')
        .and_then(|(_, p)| p.parse::<u16>().ok())
        .is_some_and(|p| p == port)
}

/// Parse `lsof -F pn` output: `p<pid>` lines followed by `n<local>[-><remote>]`.
pub fn parse_lsof(output: &str, port: u16) -> Vec<u32> {
    let mut owners = Vec::new();
    let mut current: Option<u32> = None;
    for line in output.lines() {
        if let Some(pid) = line.strip_prefix('p') {
            current = pid.trim().parse().ok();
        } else if let Some(name) = line.strip_prefix('n') {
            let local = name.split("->").next().unwrap_or(name);
            if local_port_matches(local, port)
                && let Some(pid) = current
                && !owners.contains(&pid)
            {
                owners.push(pid);
            }
        }
    }
    owners
}

/// Parse `netstat -ano` output: `TCP <local> <remote> <state> <pid>`.
pub fn parse_netstat(output: &str, port: u16) -> Vec<u32> {
    let mut owners = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || !fields[0].eq_ignore_ascii_case("TCP") {
            continue;
        }
        if !local_port_matches(fields[1], port) {
            continue;
        }
        if let Some(pid) = fields.last().and_then(|p| p.parse::<u32>().ok())
            && pid != 0
            && !owners.contains(&pid)
        {
            owners.push(pid);
        }
    }
    owners
}
