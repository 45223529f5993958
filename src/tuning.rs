//! Runtime-adjustable detection threshold and the commands that move it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Occupancy threshold shared by every region. A region's candidate status is
/// occupied when its score is strictly above this value, so a *higher* value
/// means *less* sensitive detection.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sensitivity(f64);

impl Sensitivity {
    pub const DEFAULT: f64 = 1.4;
    pub const MIN: f64 = 0.1;
    pub const STEP: f64 = 0.1;

    /// Clamps to the floor; non-finite input falls back to the default.
    pub fn new(value: f64) -> Self {
        if !value.is_finite() {
            return Self(Self::DEFAULT);
        }
        Self(value.max(Self::MIN))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Applies one adjustment command and returns the new threshold.
    pub fn apply(&mut self, command: Command) -> Self {
        *self = match command {
            Command::IncreaseSensitivity => Self::new(self.0 - Self::STEP),
            Command::DecreaseSensitivity => Self::new(self.0 + Self::STEP),
        };
        *self
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// The only commands the engine accepts between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Lower the threshold by one step: occupancy triggers more easily.
    IncreaseSensitivity,
    /// Raise the threshold by one step: occupancy triggers less easily.
    DecreaseSensitivity,
}

impl Command {
    /// Maps the interactive keys (`+`/`=` and `-`/`_`) to commands.
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            '+' | '=' => Some(Self::IncreaseSensitivity),
            '-' | '_' => Some(Self::DecreaseSensitivity),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increase_lowers_threshold_down_to_floor() {
        let mut s = Sensitivity::new(0.3);
        s.apply(Command::IncreaseSensitivity);
        assert!((s.value() - 0.2).abs() < 1e-9);
        for _ in 0..5 {
            s.apply(Command::IncreaseSensitivity);
        }
        assert_eq!(s.value(), Sensitivity::MIN);
    }

    #[test]
    fn decrease_raises_threshold_without_ceiling() {
        let mut s = Sensitivity::default();
        for _ in 0..20 {
            s.apply(Command::DecreaseSensitivity);
        }
        assert!((s.value() - 3.4).abs() < 1e-9);
    }

    #[test]
    fn construction_clamps() {
        assert_eq!(Sensitivity::new(-4.0).value(), 0.1);
        assert_eq!(Sensitivity::new(f64::NAN).value(), Sensitivity::DEFAULT);
        assert_eq!(Sensitivity::new(2.5).to_string(), "2.5");
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(Command::from_key('+'), Some(Command::IncreaseSensitivity));
        assert_eq!(Command::from_key('_'), Some(Command::DecreaseSensitivity));
        assert_eq!(Command::from_key('q'), None);
    }
}
