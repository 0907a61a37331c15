//! Drive console – raw-mode keyboard driving.
//!
//! Keys `w/a/s/d`, the arrow keys and Space drive the robot; `q` or `Esc`
//! return to the prompt and Ctrl-C quits.  Leaving always sends `/stop`.
//!
//! Terminals that report key release events (kitty keyboard protocol) give
//! exact press/release edges.  Elsewhere only presses and auto-repeats
//! arrive, so a key counts as released once it has been quiet for
//! [`FALLBACK_RELEASE`].

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use colored::Colorize;
use crossterm::cursor::{Hide, MoveToColumn, Show};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{execute, queue};
use roverdeck_session::{CameraBanner, ControlKey, SessionSnapshot};
use tracing::warn;

use crate::SharedSession;

/// Quiet time after which a key is treated as released when the terminal
/// does not report releases.  Longer than the usual auto-repeat delay.
pub const FALLBACK_RELEASE: Duration = Duration::from_millis(650);

const INPUT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveInput {
    Key(ControlKey, KeyPhase),
    Leave,
    Interrupt,
    Ignored,
}

/// How the console was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveExit {
    Left,
    Interrupted,
}

pub fn classify(event: &KeyEvent) -> DriveInput {
    let phase = match event.kind {
        KeyEventKind::Press | KeyEventKind::Repeat => KeyPhase::Down,
        KeyEventKind::Release => KeyPhase::Up,
    };
    let control = match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            return if phase == KeyPhase::Down {
                DriveInput::Interrupt
            } else {
                DriveInput::Ignored
            };
        }
        KeyCode::Char('q') | KeyCode::Esc => {
            return if phase == KeyPhase::Down {
                DriveInput::Leave
            } else {
                DriveInput::Ignored
            };
        }
        KeyCode::Up => Some(ControlKey::ArrowUp),
        KeyCode::Down => Some(ControlKey::ArrowDown),
        KeyCode::Left => Some(ControlKey::ArrowLeft),
        KeyCode::Right => Some(ControlKey::ArrowRight),
        KeyCode::Char(c) => ControlKey::from_name(&c.to_string()),
        _ => None,
    };
    match control {
        Some(key) => DriveInput::Key(key, phase),
        None => DriveInput::Ignored,
    }
}

/// Synthesises releases for terminals that never report them.
#[derive(Debug)]
pub struct ReleaseTimer {
    quiet: Duration,
    last_seen: HashMap<ControlKey, Instant>,
}

impl ReleaseTimer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_seen: HashMap::new(),
        }
    }

    pub fn touch(&mut self, key: ControlKey, now: Instant) {
        self.last_seen.insert(key, now);
    }

    /// Keys quiet for at least the threshold, removed from tracking.
    pub fn expired(&mut self, now: Instant) -> Vec<ControlKey> {
        let quiet = self.quiet;
        let mut released: Vec<ControlKey> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) >= quiet)
            .map(|(key, _)| *key)
            .collect();
        released.sort();
        for key in &released {
            self.last_seen.remove(key);
        }
        released
    }
}

struct TerminalGuard {
    enhanced: bool,
}

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let enhanced = matches!(terminal::supports_keyboard_enhancement(), Ok(true));
        let mut stdout = io::stdout();
        if enhanced {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }
        execute!(stdout, Hide)?;
        Ok(Self { enhanced })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        if self.enhanced {
            let _ = execute!(stdout, PopKeyboardEnhancementFlags);
        }
        let _ = execute!(stdout, Show);
        let _ = terminal::disable_raw_mode();
    }
}

/// Run the console until the operator leaves.
pub fn run(session: &SharedSession, shutdown: &AtomicBool) -> io::Result<DriveExit> {
    println!(
        "  {} w/a/s/d or arrows drive, Space stops, {} or {} leaves.",
        "Drive console:".bold(),
        "q".bold(),
        "Esc".bold()
    );
    let guard = TerminalGuard::enter()?;
    if !guard.enhanced {
        warn!("terminal does not report key releases; using a release timeout");
    }
    let result = drive_loop(session, shutdown, guard.enhanced);

    {
        let mut s = session.blocking_lock();
        s.clear_held_keys();
        if let Err(e) = s.send_stop() {
            warn!(error = %e, "stop on leaving drive console not sent");
        }
    }
    drop(guard);
    println!();
    result
}

fn drive_loop(session: &SharedSession, shutdown: &AtomicBool, enhanced: bool) -> io::Result<DriveExit> {
    let mut release = (!enhanced).then(|| ReleaseTimer::new(FALLBACK_RELEASE));
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(DriveExit::Interrupted);
        }
        if event::poll(INPUT_POLL)?
            && let Event::Key(key) = event::read()?
        {
            match classify(&key) {
                DriveInput::Leave => return Ok(DriveExit::Left),
                DriveInput::Interrupt => return Ok(DriveExit::Interrupted),
                DriveInput::Key(control, KeyPhase::Down) => {
                    if let Some(timer) = release.as_mut() {
                        timer.touch(control, Instant::now());
                    }
                    press(session, control);
                }
                DriveInput::Key(control, KeyPhase::Up) => lift(session, control),
                DriveInput::Ignored => {}
            }
        }
        if let Some(timer) = release.as_mut() {
            for control in timer.expired(Instant::now()) {
                lift(session, control);
            }
        }
        render(&session.blocking_lock().snapshot())?;
    }
}

fn press(session: &SharedSession, key: ControlKey) {
    if let Err(e) = session.blocking_lock().key_down(key) {
        warn!(key = key.label(), error = %e, "key press not sent");
    }
}

fn lift(session: &SharedSession, key: ControlKey) {
    if let Err(e) = session.blocking_lock().key_up(key) {
        warn!(key = key.label(), error = %e, "key release not sent");
    }
}

fn render(snap: &SessionSnapshot) -> io::Result<()> {
    let mut stdout = io::stdout();
    queue!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    write!(stdout, "{}", status_line(snap))?;
    stdout.flush()
}

/// One-line dashboard shown while driving.
pub fn status_line(snap: &SessionSnapshot) -> String {
    let link = if snap.connection == "OK" {
        "OK".green().bold()
    } else {
        "ERR".red().bold()
    };
    let camera = match snap.banner {
        CameraBanner::Live => format!("LIVE {}fps", snap.overlay.fps).green(),
        other => other.title().yellow(),
    };
    let keys = if snap.held_keys.is_empty() {
        "-".to_string()
    } else {
        snap.held_keys.iter().map(|k| k.label()).collect::<Vec<_>>().join(" ")
    };
    format!(
        "[{link}] {} {} | cam {camera} | keys {keys} | {}",
        snap.autonomy,
        snap.mode_label,
        snap.telemetry.as_deref().unwrap_or("--")
    )
}
