//! [`InputTracker`] – keyboard to drive-command translator.
//!
//! State is kept per *physical* key, not per direction: `w` and `ArrowUp`
//! both mean "forward" but are tracked independently, so releasing one
//! never looks like releasing the other.
//!
//! # Rules
//!
//! * Key-down of a released movement key emits one `/move`; key-down of the
//!   released stop key emits one `/stop`.
//! * Key-down of a key that is already held (auto-repeat) emits nothing.
//! * Key-up of any movement key emits `/stop`, even while another movement
//!   key is still held.
//! * While [`AutonomyMode::Autonomous`] every event passes through untouched.
//! * [`InputTracker::dispose`] forgets held keys without emitting a stop.
//!
//! # Example
//!
//! ```
//! use roverdeck_session::input::{ControlKey, InputTracker, KeyOutcome};
//! use roverdeck_types::{AutonomyMode, Direction, RobotCommand};
//!
//! let mut tracker = InputTracker::default();
//! let manual = AutonomyMode::Manual;
//!
//! assert_eq!(
//!     tracker.key_down(ControlKey::W, manual),
//!     KeyOutcome::Command(RobotCommand::drive(Direction::Forward))
//! );
//! // Auto-repeat is swallowed.
//! assert_eq!(tracker.key_down(ControlKey::W, manual), KeyOutcome::Consumed);
//! assert_eq!(tracker.key_up(ControlKey::W, manual), KeyOutcome::Command(RobotCommand::stop()));
//! ```

use std::collections::BTreeSet;

use roverdeck_types::{AutonomyMode, DEFAULT_MOVE_SPEED, Direction, RobotCommand};
use serde::Serialize;
use tracing::debug;

/// A recognised control key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ControlKey {
    W,
    A,
    S,
    D,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Space,
}

impl ControlKey {
    /// Map a key name (`"w"`, `"ArrowUp"`, `" "`, …) to a control key.
    ///
    /// Matching is case-insensitive; anything else returns `None` and must
    /// keep its default handling.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "w" => Some(ControlKey::W),
            "a" => Some(ControlKey::A),
            "s" => Some(ControlKey::S),
            "d" => Some(ControlKey::D),
            "arrowup" => Some(ControlKey::ArrowUp),
            "arrowdown" => Some(ControlKey::ArrowDown),
            "arrowleft" => Some(ControlKey::ArrowLeft),
            "arrowright" => Some(ControlKey::ArrowRight),
            " " | "space" => Some(ControlKey::Space),
            _ => None,
        }
    }

    /// Drive direction of a movement key; `None` for the stop key.
    pub fn direction(self) -> Option<Direction> {
        match self {
            ControlKey::W | ControlKey::ArrowUp => Some(Direction::Forward),
            ControlKey::S | ControlKey::ArrowDown => Some(Direction::Back),
            ControlKey::A | ControlKey::ArrowLeft => Some(Direction::Left),
            ControlKey::D | ControlKey::ArrowRight => Some(Direction::Right),
            ControlKey::Space => None,
        }
    }

    pub fn is_movement(self) -> bool {
        self.direction().is_some()
    }

    pub fn label(self) -> &'static str {
        match self {
            ControlKey::W => "W",
            ControlKey::A => "A",
            ControlKey::S => "S",
            ControlKey::D => "D",
            ControlKey::ArrowUp => "↑",
            ControlKey::ArrowDown => "↓",
            ControlKey::ArrowLeft => "←",
            ControlKey::ArrowRight => "→",
            ControlKey::Space => "SPACE",
        }
    }
}

/// What the front end should do with a key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not handled; the event keeps its default behaviour.
    Passthrough,
    /// Handled and swallowed, nothing to send.
    Consumed,
    /// Handled and swallowed; send this command.
    Command(RobotCommand),
}

/// Held-key state machine.
#[derive(Debug)]
pub struct InputTracker {
    held: BTreeSet<ControlKey>,
    speed: u16,
}

impl Default for InputTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MOVE_SPEED)
    }
}

impl InputTracker {
    /// Create a tracker that drives at `speed`.
    pub fn new(speed: u16) -> Self {
        Self {
            held: BTreeSet::new(),
            speed,
        }
    }

    /// Handle a key-down (or auto-repeat) event.
    pub fn key_down(&mut self, key: ControlKey, autonomy: AutonomyMode) -> KeyOutcome {
        if autonomy == AutonomyMode::Autonomous {
            return KeyOutcome::Passthrough;
        }
        if !self.held.insert(key) {
            return KeyOutcome::Consumed;
        }
        debug!(key = ?key, "key pressed");
        match key.direction() {
            Some(direction) => KeyOutcome::Command(RobotCommand::Move {
                direction,
                speed: self.speed,
            }),
            None => KeyOutcome::Command(RobotCommand::stop()),
        }
    }

    /// Handle a key-up event.
    pub fn key_up(&mut self, key: ControlKey, autonomy: AutonomyMode) -> KeyOutcome {
        if autonomy == AutonomyMode::Autonomous {
            return KeyOutcome::Passthrough;
        }
        self.held.remove(&key);
        debug!(key = ?key, "key released");
        if key.is_movement() {
            KeyOutcome::Command(RobotCommand::stop())
        } else {
            KeyOutcome::Consumed
        }
    }

    pub fn is_held(&self, key: ControlKey) -> bool {
        self.held.contains(&key)
    }

    /// Currently held keys in a stable order.
    pub fn held_keys(&self) -> Vec<ControlKey> {
        self.held.iter().copied().collect()
    }

    /// Forget every held key.  No stop is emitted.
    pub fn dispose(&mut self) {
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANUAL: AutonomyMode = AutonomyMode::Manual;
    const AUTO: AutonomyMode = AutonomyMode::Autonomous;

    fn commands(outcomes: &[KeyOutcome]) -> Vec<RobotCommand> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                KeyOutcome::Command(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn key_names_map_case_insensitively() {
        assert_eq!(ControlKey::from_name("W"), Some(ControlKey::W));
        assert_eq!(ControlKey::from_name("ArrowLeft"), Some(ControlKey::ArrowLeft));
        assert_eq!(ControlKey::from_name(" "), Some(ControlKey::Space));
        assert_eq!(ControlKey::from_name("q"), None);
        assert_eq!(ControlKey::from_name("Enter"), None);
    }

    #[test]
    fn letters_and_arrows_alias_the_same_directions() {
        assert_eq!(ControlKey::W.direction(), ControlKey::ArrowUp.direction());
        assert_eq!(ControlKey::S.direction(), Some(Direction::Back));
        assert_eq!(ControlKey::A.direction(), Some(Direction::Left));
        assert_eq!(ControlKey::ArrowRight.direction(), Some(Direction::Right));
        assert!(!ControlKey::Space.is_movement());
    }

    #[test]
    fn press_emits_single_move_despite_auto_repeat() {
        let mut tracker = InputTracker::default();
        let outcomes: Vec<_> = (0..10).map(|_| tracker.key_down(ControlKey::D, MANUAL)).collect();
        assert_eq!(commands(&outcomes), vec![RobotCommand::drive(Direction::Right)]);
        assert!(tracker.is_held(ControlKey::D));
    }

    #[test]
    fn each_press_transition_emits_again() {
        let mut tracker = InputTracker::default();
        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(tracker.key_down(ControlKey::W, MANUAL));
            outcomes.push(tracker.key_down(ControlKey::W, MANUAL));
            outcomes.push(tracker.key_up(ControlKey::W, MANUAL));
        }
        let sent = commands(&outcomes);
        assert_eq!(sent.iter().filter(|c| !c.is_stop()).count(), 3);
        assert_eq!(sent.iter().filter(|c| c.is_stop()).count(), 3);
    }

    #[test]
    fn releasing_one_of_two_held_keys_still_stops() {
        let mut tracker = InputTracker::default();
        assert_eq!(
            tracker.key_down(ControlKey::W, MANUAL),
            KeyOutcome::Command(RobotCommand::drive(Direction::Forward))
        );
        assert_eq!(
            tracker.key_down(ControlKey::D, MANUAL),
            KeyOutcome::Command(RobotCommand::drive(Direction::Right))
        );
        assert_eq!(tracker.key_up(ControlKey::W, MANUAL), KeyOutcome::Command(RobotCommand::stop()));
        assert_eq!(tracker.held_keys(), vec![ControlKey::D]);
    }

    #[test]
    fn aliased_keys_are_tracked_separately() {
        let mut tracker = InputTracker::default();
        tracker.key_down(ControlKey::W, MANUAL);
        // Same direction, different physical key: a fresh press.
        assert_eq!(
            tracker.key_down(ControlKey::ArrowUp, MANUAL),
            KeyOutcome::Command(RobotCommand::drive(Direction::Forward))
        );
        tracker.key_up(ControlKey::ArrowUp, MANUAL);
        assert!(tracker.is_held(ControlKey::W));
    }

    #[test]
    fn space_press_stops_and_release_is_silent() {
        let mut tracker = InputTracker::default();
        assert_eq!(tracker.key_down(ControlKey::Space, MANUAL), KeyOutcome::Command(RobotCommand::stop()));
        assert_eq!(tracker.key_down(ControlKey::Space, MANUAL), KeyOutcome::Consumed);
        assert_eq!(tracker.key_up(ControlKey::Space, MANUAL), KeyOutcome::Consumed);
        assert!(tracker.held_keys().is_empty());
    }

    #[test]
    fn autonomous_mode_ignores_every_event() {
        let mut tracker = InputTracker::default();
        let keys = [ControlKey::W, ControlKey::ArrowLeft, ControlKey::Space, ControlKey::S];
        for key in keys {
            assert_eq!(tracker.key_down(key, AUTO), KeyOutcome::Passthrough);
            assert_eq!(tracker.key_up(key, AUTO), KeyOutcome::Passthrough);
        }
        assert!(tracker.held_keys().is_empty());
    }

    #[test]
    fn custom_speed_is_used() {
        let mut tracker = InputTracker::new(90);
        assert_eq!(
            tracker.key_down(ControlKey::S, MANUAL),
            KeyOutcome::Command(RobotCommand::Move {
                direction: Direction::Back,
                speed: 90
            })
        );
    }

    #[test]
    fn dispose_forgets_keys_without_stopping() {
        let mut tracker = InputTracker::default();
        tracker.key_down(ControlKey::W, MANUAL);
        tracker.key_down(ControlKey::A, MANUAL);
        tracker.dispose();
        assert!(tracker.held_keys().is_empty());
        // A new press after disposal is a fresh transition.
        assert!(matches!(tracker.key_down(ControlKey::W, MANUAL), KeyOutcome::Command(_)));
    }
}
