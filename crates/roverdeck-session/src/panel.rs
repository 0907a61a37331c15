//! Control panel levels and actuator presets.

use roverdeck_types::RobotCommand;
use serde::Serialize;

/// Servo driven by the preset buttons.
pub const PRESET_SERVO_ID: u8 = 1;

/// Light sequence used by the colour presets.
pub const PRESET_LIGHT_SEQUENCE: u8 = 1;

/// How much of the control panel is exposed.
///
/// * `Standby` – nothing.
/// * `Default` – the MANUAL / AUTO toggle.
/// * `Advanced` – additionally robot mode, servo and light presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PanelLevel {
    #[default]
    Standby,
    Default,
    Advanced,
}

impl PanelLevel {
    pub fn allows_autonomy_toggle(self) -> bool {
        self >= PanelLevel::Default
    }

    pub fn allows_actuators(self) -> bool {
        self == PanelLevel::Advanced
    }

    pub fn label(self) -> &'static str {
        match self {
            PanelLevel::Standby => "STBY",
            PanelLevel::Default => "DEF",
            PanelLevel::Advanced => "ADV",
        }
    }
}

impl std::str::FromStr for PanelLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standby" | "stby" => Ok(PanelLevel::Standby),
            "default" | "def" => Ok(PanelLevel::Default),
            "advanced" | "adv" => Ok(PanelLevel::Advanced),
            other => Err(format!("unknown panel level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoPreset {
    Left,
    Center,
    Right,
}

impl ServoPreset {
    pub fn angle(self) -> u16 {
        match self {
            ServoPreset::Left => 45,
            ServoPreset::Center => 90,
            ServoPreset::Right => 135,
        }
    }

    pub fn command(self) -> RobotCommand {
        RobotCommand::Servo {
            servo_id: PRESET_SERVO_ID,
            angle: self.angle(),
        }
    }
}

impl std::str::FromStr for ServoPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l" | "left" => Ok(ServoPreset::Left),
            "c" | "center" | "centre" => Ok(ServoPreset::Center),
            "r" | "right" => Ok(ServoPreset::Right),
            other => Err(format!("unknown servo preset '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightPreset {
    Red,
    Green,
    Blue,
}

impl LightPreset {
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            LightPreset::Red => (255, 0, 0),
            LightPreset::Green => (0, 255, 0),
            LightPreset::Blue => (0, 0, 255),
        }
    }

    pub fn command(self) -> RobotCommand {
        let (r, g, b) = self.rgb();
        RobotCommand::Lights {
            sequence: PRESET_LIGHT_SEQUENCE,
            r,
            g,
            b,
        }
    }
}

impl std::str::FromStr for LightPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "r" | "red" => Ok(LightPreset::Red),
            "g" | "green" => Ok(LightPreset::Green),
            "b" | "blue" => Ok(LightPreset::Blue),
            other => Err(format!("unknown light preset '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_gating() {
        assert!(!PanelLevel::Standby.allows_autonomy_toggle());
        assert!(PanelLevel::Default.allows_autonomy_toggle());
        assert!(!PanelLevel::Default.allows_actuators());
        assert!(PanelLevel::Advanced.allows_autonomy_toggle());
        assert!(PanelLevel::Advanced.allows_actuators());
        assert_eq!(PanelLevel::default(), PanelLevel::Standby);
    }

    #[test]
    fn servo_presets() {
        assert_eq!(
            "left".parse::<ServoPreset>().unwrap().command(),
            RobotCommand::Servo { servo_id: 1, angle: 45 }
        );
        assert_eq!(ServoPreset::Center.angle(), 90);
        assert_eq!("R".parse::<ServoPreset>().unwrap().angle(), 135);
    }

    #[test]
    fn light_presets() {
        assert_eq!(
            LightPreset::Blue.command(),
            RobotCommand::Lights {
                sequence: 1,
                r: 0,
                g: 0,
                b: 255
            }
        );
        assert!("purple".parse::<LightPreset>().is_err());
    }

    #[test]
    fn panel_parse() {
        assert_eq!("ADV".parse::<PanelLevel>().unwrap(), PanelLevel::Advanced);
        assert!("expert".parse::<PanelLevel>().is_err());
    }
}
