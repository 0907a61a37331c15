//! `roverdeck` – teleop console for a small mobile robot.
//!
//! 1. Loads `~/.roverdeck/config.toml`, running a **First-Run Wizard** when
//!    the file is absent.
//! 2. Starts a session: health polling of the control API and, once it
//!    answers, the camera frame loop.
//! 3. Drops the operator into a REPL with slash-commands and a raw-mode
//!    drive console.
//! 4. Intercepts **Ctrl-C** to send `/stop` before exiting.

mod config;
mod drive;
mod repl;

use colored::Colorize;
use roverdeck_gateway::{CommandGateway, HttpFrameSource};
use roverdeck_session::SessionCoordinator;
use roverdeck_session::telemetry::init_tracing;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Session shared by the REPL thread, the pump task and the Ctrl-C handler.
pub type SharedSession = Arc<Mutex<SessionCoordinator>>;

/// How often queued background events are applied.
const PUMP_INTERVAL: Duration = Duration::from_millis(50);
const OVERLAY_INTERVAL: Duration = Duration::from_secs(1);

fn main() {
    // Logs go to stderr; RUST_LOG filters, ROVERDECK_LOG_FORMAT=json switches format.
    let _tracing = init_tracing("roverdeck");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            std::process::exit(1);
        }
    };

    let session: SharedSession = {
        let _enter = rt.enter();
        let mut coordinator = SessionCoordinator::new(
            cfg.session_config(),
            Arc::new(CommandGateway::new()),
            Arc::new(HttpFrameSource::new()),
        );
        coordinator.start();
        Arc::new(Mutex::new(coordinator))
    };
    let pump = rt.spawn(pump(session.clone()));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = shutdown.clone();
    let session_ctrlc = Arc::downgrade(&session);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        if let Some(session) = session_ctrlc.upgrade() {
            match session.blocking_lock().send_stop() {
                Ok(()) => println!("{}", "  ✓ Stop queued.".green()),
                Err(e) => println!("{}: {}", "  Stop not sent".red(), e),
            }
        }
        println!("{}", "  Press Enter to exit.".dimmed());
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the robot");
    }

    println!(
        "  Polling {} every {} ms.",
        cfg.api_url.bold(),
        cfg.poll_interval_ms
    );
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    let mut shell = repl::Shell::new(rt.handle().clone(), session.clone(), cfg, shutdown);
    shell.run();
    drop(shell);

    pump.abort();
    rt.block_on(async move {
        // The pump is aborted; wait for its lock to be released before unwrapping.
        let _ = pump.await;
        match Arc::try_unwrap(session) {
            Ok(session) => session.into_inner().shutdown().await,
            Err(_) => warn!("session still shared at exit; skipping orderly shutdown"),
        }
    });
}

/// Apply background events and refresh the overlay until aborted.
async fn pump(session: SharedSession) {
    let mut events = tokio::time::interval(PUMP_INTERVAL);
    let mut overlay = tokio::time::interval(OVERLAY_INTERVAL);
    loop {
        tokio::select! {
            _ = events.tick() => {
                session.lock().await.drain_pending();
            }
            _ = overlay.tick() => {
                let mut guard = session.lock().await;
                guard.refresh_overlay(&mut rand::rng());
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      RoverDeck First-Run Wizard      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Where is the robot?\n");

    let mut cfg = config::Config::default();
    config::apply_env_overrides(&mut cfg);

    cfg.api_url = repl::prompt_str(&format!("  Control API URL [{}]: ", cfg.api_url), &cfg.api_url);
    cfg.camera_url = repl::prompt_str(
        &format!("  Camera stream URL (\"-\" for none) [{}]: ", cfg.camera_url),
        &cfg.camera_url,
    );
    if cfg.camera_url == "-" {
        cfg.camera_url.clear();
    }

    let speed = repl::prompt_str(&format!("  Drive speed [{}]: ", cfg.move_speed), &cfg.move_speed.to_string());
    match speed.parse::<u16>() {
        Ok(v) => cfg.move_speed = v,
        Err(_) => println!(
            "  {} '{}' is not a valid speed, keeping {}",
            "Warning:".yellow(),
            speed,
            cfg.move_speed
        ),
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                   ___          _   "#.bold().cyan());
    println!("{}", r#"  / _ \___ _  _____ ____/ _ \___ ____| |__"#.bold().cyan());
    println!("{}", r#" / , _/ _ \ |/ / -_) __/ // / -_) __/  '_/"#.bold().cyan());
    println!("{}", r#"/_/|_|\___/___/\__/_/ /____/\__/\__/_/\_\ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "RoverDeck".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Teleoperation console");
    println!();
}
