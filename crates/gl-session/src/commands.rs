//! Parameter types for guider commands and query results

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::client::EventSnapshot;

/// Offset added to algorithm parameters before sending them.
///
/// The guider treats a value equal to its stored one as "no change" in
/// some code paths; nudging by a thousandth keeps writes effective.
pub const PARAM_EPSILON: f64 = 0.001;

/// Largest read-back difference still accepted as "stored what we sent"
pub const PARAM_VERIFY_TOLERANCE: f64 = 0.0015;

/// Value actually sent for an algorithm parameter: rounded to three
/// decimals, then offset by [`PARAM_EPSILON`]
pub fn adjust_param_value(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0 + PARAM_EPSILON
}

/// Settle criteria for guide and dither
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettleParams {
    /// Max guide distance in pixels to count as settled
    pub pixels: f64,
    /// Seconds the distance must stay within `pixels`
    pub time: u32,
    /// Seconds before settling gives up
    pub timeout: u32,
}

impl Default for SettleParams {
    fn default() -> Self {
        Self {
            pixels: 1.5,
            time: 10,
            timeout: 60,
        }
    }
}

/// Guide axis of an algorithm parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Ra,
    Dec,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Ra => "ra",
            Axis::Dec => "dec",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ra" | "x" => Ok(Axis::Ra),
            "dec" | "y" => Ok(Axis::Dec),
            other => Err(format!("unknown axis '{}', expected ra or dec", other)),
        }
    }
}

/// Declination guide mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecGuideMode {
    Off,
    Auto,
    North,
    South,
}

impl DecGuideMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecGuideMode::Off => "Off",
            DecGuideMode::Auto => "Auto",
            DecGuideMode::North => "North",
            DecGuideMode::South => "South",
        }
    }
}

impl fmt::Display for DecGuideMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecGuideMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(DecGuideMode::Off),
            "auto" => Ok(DecGuideMode::Auto),
            "north" => Ok(DecGuideMode::North),
            "south" => Ok(DecGuideMode::South),
            other => Err(format!("unknown dec guide mode '{}'", other)),
        }
    }
}

/// Guider state as seen by [`status`](crate::GuiderSession::status)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuiderStatus {
    /// Application state reported by the guider
    pub app_state: String,
    /// State accumulated from events
    pub events: EventSnapshot,
}

/// An equipment profile known to the running guider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuiderProfile {
    pub id: u32,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_param_value() {
        assert!((adjust_param_value(0.7) - 0.701).abs() < 1e-9);
        assert!((adjust_param_value(0.12345) - 0.124).abs() < 1e-9);
        assert!((adjust_param_value(100.0) - 100.001).abs() < 1e-9);
    }

    #[test]
    fn test_settle_params_wire_shape() {
        let json = serde_json::to_value(SettleParams::default()).unwrap();
        assert_eq!(json, serde_json::json!({"pixels": 1.5, "time": 10, "timeout": 60}));
    }

    #[test]
    fn test_parse_axis_and_mode() {
        assert_eq!("RA".parse::<Axis>().unwrap(), Axis::Ra);
        assert_eq!("dec".parse::<Axis>().unwrap(), Axis::Dec);
        assert!("z".parse::<Axis>().is_err());
        assert_eq!("north".parse::<DecGuideMode>().unwrap(), DecGuideMode::North);
        assert_eq!(DecGuideMode::Auto.to_string(), "Auto");
    }
}
