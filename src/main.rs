use android_signin_run::adb::{AdbShell, Session};
use android_signin_run::args::{Args, Mode};
use android_signin_run::config::Settings;
use android_signin_run::emulator::SystemProcesses;
use android_signin_run::game_automation::{RestartBudget, ScenarioRunner, TEMPLATE_NAMES, sign_in_stages};
use android_signin_run::network::HttpProbe;
use android_signin_run::template_matching::{TemplateMatcher, TemplateStore};
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

const STARTUP_ERROR: u8 = 2;
const SCREENSHOT_FILE: &str = "cli-screenshot.png";

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    let mut settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("❌ {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };
    args.apply_to(&mut settings);
    if let Err(e) = settings.validate() {
        log::error!("❌ {e}");
        return ExitCode::from(STARTUP_ERROR);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("❌ Failed to start runtime: {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };

    runtime.block_on(async move {
        match args.mode() {
            Mode::Screenshot => screenshot(&settings).await,
            Mode::SignIn => sign_in(&settings, args.skip_network_check).await,
        }
    })
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn bridge(settings: &Settings) -> Option<AdbShell> {
    let shell = AdbShell::new(&settings.adb_path, settings.command_timeout());
    match shell.ensure_available() {
        Ok(()) => Some(shell),
        Err(e) => {
            log::error!("❌ {e}");
            None
        }
    }
}

async fn sign_in(settings: &Settings, skip_network_check: bool) -> ExitCode {
    let Some(shell) = bridge(settings) else {
        return ExitCode::from(STARTUP_ERROR);
    };

    let store = TemplateStore::new(&settings.template_dir);
    let missing = store.missing(TEMPLATE_NAMES);
    if !missing.is_empty() {
        log::warn!(
            "⚠️ Missing templates in {}: {}",
            store.directory().display(),
            missing.join(", ")
        );
    }

    log::info!(
        "🚀 Starting sign-in on {} (max {} restarts)",
        settings.endpoint(),
        settings.max_restarts
    );
    let session = Session::new(
        shell,
        SystemProcesses::new(),
        settings.endpoint(),
        settings.session_settings(),
    );
    let matcher = TemplateMatcher::new(store, settings.match_threshold);
    let probe = HttpProbe::new(
        settings.network.urls.clone(),
        settings.probe_timeout(),
        settings.network.rounds,
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let mut runner = ScenarioRunner::new(session, matcher, probe, sign_in_stages(&settings.stages))
        .with_budget(RestartBudget::new(settings.max_restarts))
        .with_options(settings.run_options(skip_network_check))
        .with_cancellation(cancel);
    let outcome = runner.run().await;
    log::info!("🏁 Run {outcome}");
    ExitCode::from(outcome.exit_code())
}

async fn screenshot(settings: &Settings) -> ExitCode {
    let Some(shell) = bridge(settings) else {
        return ExitCode::from(STARTUP_ERROR);
    };
    let mut session = Session::new(
        shell,
        SystemProcesses::new(),
        settings.endpoint(),
        settings.session_settings(),
    );

    println!("📸 CLI screenshot from {}...", settings.endpoint());
    if let Err(e) = session.connect(settings.connect.attempts).await {
        println!("❌ Connect failed: {e}");
        return ExitCode::FAILURE;
    }
    let result = match session.capture_frame().await {
        Ok(frame) => match frame.image().save(SCREENSHOT_FILE) {
            Ok(()) => {
                println!(
                    "✅ Screenshot {}x{} saved to {SCREENSHOT_FILE}",
                    frame.width(),
                    frame.height()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("❌ Write failed: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            println!("❌ Screenshot failed: {e}");
            ExitCode::FAILURE
        }
    };
    session.disconnect().await;
    result
}
