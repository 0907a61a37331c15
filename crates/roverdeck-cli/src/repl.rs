//! REPL – the RoverDeck operator shell.
//!
//! Supported slash-commands:
//!   /help                      – show this list
//!   /status [json]             – connection, camera and mode summary
//!   /settings                  – edit, probe and save the endpoints
//!   /panel <standby|default|advanced>
//!   /manual | /auto            – autonomy toggle (panel DEF or ADV)
//!   /mode <manual|line|avoid|follow>   (panel ADV)
//!   /servo <left|center|right>         (panel ADV)
//!   /lights <red|green|blue>           (panel ADV)
//!   /stop                      – send an immediate stop
//!   /drive                     – raw-mode keyboard driving
//!   /quit | /exit

use colored::Colorize;
use roverdeck_gateway::Prober;
use roverdeck_session::{LightPreset, PanelLevel, ProbeStatus, ServoPreset, SessionSnapshot, SettingsDraft};
use roverdeck_types::{AutonomyMode, DeckError, RobotMode};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;

use crate::SharedSession;
use crate::config::{self, Config};
use crate::drive::{self, DriveExit};

/// A parsed slash-command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status { json: bool },
    Settings,
    Panel(PanelLevel),
    Autonomy(AutonomyMode),
    Mode(RobotMode),
    Servo(ServoPreset),
    Lights(LightPreset),
    Stop,
    Drive,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let head = words.next().unwrap_or_default();
    let arg = words.next();
    let need = |usage: &str| arg.ok_or_else(|| format!("usage: {head} {usage}"));

    match head {
        "/help" => Ok(Command::Help),
        "/status" => Ok(Command::Status {
            json: arg == Some("json"),
        }),
        "/settings" => Ok(Command::Settings),
        "/panel" => Ok(Command::Panel(need("<standby|default|advanced>")?.parse()?)),
        "/manual" => Ok(Command::Autonomy(AutonomyMode::Manual)),
        "/auto" => Ok(Command::Autonomy(AutonomyMode::Autonomous)),
        "/mode" => Ok(Command::Mode(need("<manual|line|avoid|follow>")?.parse()?)),
        "/servo" => Ok(Command::Servo(need("<left|center|right>")?.parse()?)),
        "/lights" => Ok(Command::Lights(need("<red|green|blue>")?.parse()?)),
        "/stop" => Ok(Command::Stop),
        "/drive" => Ok(Command::Drive),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

/// Interactive shell bound to one running session.
pub struct Shell {
    rt: Handle,
    session: SharedSession,
    config: Config,
    shutdown: Arc<AtomicBool>,
}

impl Shell {
    pub fn new(rt: Handle, session: SharedSession, config: Config, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            rt,
            session,
            config,
            shutdown,
        }
    }

    /// Read commands until `/quit`, EOF or the shutdown flag.
    pub fn run(&mut self) {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            print!("{} ", "roverdeck>".bold().cyan());
            stdout.flush().ok();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    break;
                }
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_command(line) {
                Ok(Command::Quit) => {
                    println!("{}", "Goodbye.".green());
                    self.shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(command) => self.execute(command),
                Err(e) => println!("{} {}. Type {} for available commands.", "Error:".red(), e, "/help".bold()),
            }
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Help => cmd_help(),
            Command::Status { json } => self.cmd_status(json),
            Command::Settings => self.cmd_settings(),
            Command::Panel(level) => {
                self.session.blocking_lock().set_panel(level);
                println!("  Panel set to {}", level.label().bold());
            }
            Command::Autonomy(mode) => {
                let result = self.session.blocking_lock().set_autonomy(mode);
                report(result, &format!("Autonomy set to {mode}"));
            }
            Command::Mode(mode) => {
                let result = self.session.blocking_lock().set_robot_mode(mode);
                report(result, &format!("Robot mode set to {}", mode.label()));
            }
            Command::Servo(preset) => {
                let result = self.session.blocking_lock().servo(preset);
                report(result, &format!("Servo to {}°", preset.angle()));
            }
            Command::Lights(preset) => {
                let result = self.session.blocking_lock().lights(preset);
                report(result, &format!("Lights {preset:?}"));
            }
            Command::Stop => {
                let result = self.session.blocking_lock().send_stop();
                report(result, "Stop sent");
            }
            Command::Drive => match drive::run(&self.session, &self.shutdown) {
                Ok(DriveExit::Left) => println!("  {}", "Robot stopped, back at the prompt.".dimmed()),
                Ok(DriveExit::Interrupted) => {
                    println!("{}", "Interrupted – robot stopped, exiting.".yellow());
                    self.shutdown.store(true, Ordering::SeqCst);
                }
                Err(e) => println!("{}: {}", "Drive console error".red(), e),
            },
            Command::Quit => {}
        }
    }

    fn cmd_status(&self, json: bool) {
        let snap = self.session.blocking_lock().snapshot();
        if json {
            match serde_json::to_string_pretty(&snap) {
                Ok(text) => println!("{text}"),
                Err(e) => println!("{}: {}", "Encode error".red(), e),
            }
        } else {
            print_status(&snap);
        }
    }

    fn cmd_settings(&mut self) {
        let committed = self.session.blocking_lock().endpoints().clone();
        let mut draft = SettingsDraft::from_config(&committed);
        let prober = Prober::new(self.config.probe_timeout());

        println!("{}", "Endpoint Settings".bold().underline());
        draft.api_url = prompt_str(&format!("  API URL    [{}]: ", draft.api_url), &draft.api_url);
        draft.camera_url = prompt_str(&format!("  Camera URL [{}]: ", draft.camera_url), &draft.camera_url);

        loop {
            print!("  Probing … ");
            io::stdout().flush().ok();
            let api = self.rt.block_on(draft.probe_api(&prober));
            let camera = self.rt.block_on(draft.probe_camera(&prober));
            println!("API {}  camera {}", probe_label(api), probe_label(camera));

            let answer = prompt_str("  Save these endpoints? [y]es / [n]o / [r]etest: ", "y");
            match answer.to_lowercase().as_str() {
                "r" | "retest" => continue,
                "n" | "no" => {
                    draft.cancel(&committed);
                    println!("  {}", "Changes discarded.".dimmed());
                    return;
                }
                _ => break,
            }
        }

        let endpoints = draft.save();
        self.session.blocking_lock().apply_endpoints(endpoints.clone());
        self.config.set_endpoints(endpoints);
        match config::save(&self.config) {
            Ok(()) => println!(
                "{} {}",
                "✓ Endpoints saved to".green(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "RoverDeck Commands".bold().underline());
    println!("  {}          – connection, camera and mode summary", "/status [json]".bold().cyan());
    println!("  {}               – edit and probe the API / camera URLs", "/settings".bold().cyan());
    println!("  {}  – unlock controls (standby|default|advanced)", "/panel <level>".bold().cyan());
    println!("  {}          – hand locomotion to operator / robot", "/manual  /auto".bold().cyan());
    println!("  {}            – manual|line|avoid|follow", "/mode <mode>".bold().cyan());
    println!("  {}       – left|center|right", "/servo <preset>".bold().cyan());
    println!("  {}      – red|green|blue", "/lights <colour>".bold().cyan());
    println!("  {}                   – stop the robot now", "/stop".bold().cyan());
    println!("  {}                  – keyboard driving console", "/drive".bold().cyan());
    println!("  {}            – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn print_status(snap: &SessionSnapshot) {
    println!("{}", "Session Status".bold().underline());
    let link = if snap.connection == "OK" {
        snap.connection.green().bold()
    } else {
        snap.connection.red().bold()
    };
    println!("  API        : {} {}", link, snap.api_url.dimmed());
    println!("  Telemetry  : {}", snap.telemetry.as_deref().unwrap_or("--"));
    if let Some(seen) = snap.last_seen {
        println!("  Last seen  : {}", seen.format("%H:%M:%S"));
    }
    println!(
        "  Camera     : {} {} {}",
        snap.banner.title().bold(),
        snap.banner.detail(),
        snap.camera_url.dimmed()
    );
    println!(
        "  Overlay    : {} objects, {} fps (observed {})",
        snap.overlay.objects, snap.overlay.fps, snap.stream.observed_fps
    );
    println!(
        "  Control    : {} / {} (panel {})",
        snap.autonomy.to_string().yellow(),
        snap.mode_label.yellow(),
        snap.panel.label()
    );
    println!("  Phase      : {:?}", snap.phase);
}

fn probe_label(status: ProbeStatus) -> colored::ColoredString {
    match status {
        ProbeStatus::Connected => status.label().green().bold(),
        ProbeStatus::Failed => status.label().red().bold(),
        ProbeStatus::Unknown | ProbeStatus::Testing => status.label().yellow(),
    }
}

fn report(result: Result<(), DeckError>, done: &str) {
    match result {
        Ok(()) => println!("  {} {}", "✓".green(), done),
        Err(DeckError::Locked(why)) => println!("  {} {}", "Locked:".yellow(), why),
        Err(e) => println!("  {}: {}", "Error".red(), e),
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
pub fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() { default.to_string() } else { trimmed }
        }
        Err(_) => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_commands() {
        assert_eq!(parse_command("/help"), Ok(Command::Help));
        assert_eq!(parse_command("/status"), Ok(Command::Status { json: false }));
        assert_eq!(parse_command("/status json"), Ok(Command::Status { json: true }));
        assert_eq!(parse_command("/auto"), Ok(Command::Autonomy(AutonomyMode::Autonomous)));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
    }

    #[test]
    fn parses_arguments() {
        assert_eq!(parse_command("/panel adv"), Ok(Command::Panel(PanelLevel::Advanced)));
        assert_eq!(parse_command("/mode follow"), Ok(Command::Mode(RobotMode::Follow)));
        assert_eq!(parse_command("/servo center"), Ok(Command::Servo(ServoPreset::Center)));
        assert_eq!(parse_command("  /lights   RED "), Ok(Command::Lights(LightPreset::Red)));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_command("/mode"), Err("usage: /mode <manual|line|avoid|follow>".to_string()));
        assert!(parse_command("/mode warp").unwrap_err().contains("warp"));
        assert!(parse_command("/teleport").unwrap_err().contains("unknown command"));
    }
}
