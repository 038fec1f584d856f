//! Window specifications such as `"10s"`, `"1h"` or `"2d"`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_HOUR: u64 = 60 * 60 * MILLIS_PER_SECOND;
const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;

/// Why a window string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowParseError {
    #[error("window is empty")]
    Empty,

    #[error("window '{0}' has no magnitude")]
    MissingMagnitude(String),

    #[error("window '{0}' must be a positive integer followed by s, h or d")]
    InvalidFormat(String),

    #[error("window '{0}' has unknown unit (expected s, h or d)")]
    UnknownUnit(String),

    #[error("window '{0}' must have a magnitude greater than 0")]
    NonPositive(String),

    #[error("window '{0}' is too large")]
    Overflow(String),
}

/// Unit suffix of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowUnit {
    Seconds,
    Hours,
    Days,
}

impl WindowUnit {
    fn millis(self) -> u64 {
        match self {
            WindowUnit::Seconds => MILLIS_PER_SECOND,
            WindowUnit::Hours => MILLIS_PER_HOUR,
            WindowUnit::Days => MILLIS_PER_DAY,
        }
    }

    fn suffix(self) -> char {
        match self {
            WindowUnit::Seconds => 's',
            WindowUnit::Hours => 'h',
            WindowUnit::Days => 'd',
        }
    }
}

/// A parsed, strictly positive window duration.
///
/// # Example
///
/// ```rust
/// use request_pipeline::rate_limit::RlWindow;
///
/// let window: RlWindow = "10s".parse().unwrap();
/// assert_eq!(window.as_millis(), 10_000);
/// assert!("0s".parse::<RlWindow>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RlWindow {
    magnitude: u64,
    unit: WindowUnit,
    millis: u64,
}

impl RlWindow {
    /// Parse `<positive integer><s|h|d>`.
    pub fn parse(spec: &str) -> Result<Self, WindowParseError> {
        let spec = spec.trim();
        let Some((unit_idx, unit_char)) = spec.char_indices().last() else {
            return Err(WindowParseError::Empty);
        };

        let (digits, _) = spec.split_at(unit_idx);

        let unit = match unit_char {
            's' => WindowUnit::Seconds,
            'h' => WindowUnit::Hours,
            'd' => WindowUnit::Days,
            c if c.is_ascii_digit() => {
                return Err(WindowParseError::InvalidFormat(spec.to_string()));
            }
            _ if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) => {
                return Err(WindowParseError::InvalidFormat(spec.to_string()));
            }
            _ => return Err(WindowParseError::UnknownUnit(spec.to_string())),
        };

        if digits.is_empty() {
            return Err(WindowParseError::MissingMagnitude(spec.to_string()));
        }

        // Reject signs and anything else `u64::from_str` would tolerate
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WindowParseError::InvalidFormat(spec.to_string()));
        }

        let magnitude: u64 = digits
            .parse()
            .map_err(|_| WindowParseError::Overflow(spec.to_string()))?;

        if magnitude == 0 {
            return Err(WindowParseError::NonPositive(spec.to_string()));
        }

        let millis = magnitude
            .checked_mul(unit.millis())
            .ok_or_else(|| WindowParseError::Overflow(spec.to_string()))?;

        Ok(Self {
            magnitude,
            unit,
            millis,
        })
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }

    pub fn magnitude(&self) -> u64 {
        self.magnitude
    }

    pub fn unit(&self) -> WindowUnit {
        self.unit
    }
}

impl FromStr for RlWindow {
    type Err = WindowParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RlWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(RlWindow::parse("10s").unwrap().as_millis(), 10_000);
    }

    #[test]
    fn test_parse_hours() {
        assert_eq!(RlWindow::parse("1h").unwrap().as_millis(), 3_600_000);
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(RlWindow::parse("2d").unwrap().as_millis(), 172_800_000);
    }

    #[test]
    fn test_parse_zero_rejected() {
        assert_eq!(
            RlWindow::parse("0s"),
            Err(WindowParseError::NonPositive("0s".to_string()))
        );
    }

    #[test]
    fn test_parse_negative_rejected() {
        assert!(matches!(
            RlWindow::parse("-1h"),
            Err(WindowParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_garbage_rejected() {
        assert!(RlWindow::parse("abc").is_err());
        assert!(RlWindow::parse("s").is_err());
        assert!(RlWindow::parse("1.5h").is_err());
        assert!(RlWindow::parse("1 0s").is_err());
    }

    #[test]
    fn test_parse_plus_sign_rejected() {
        assert!(RlWindow::parse("+5s").is_err());
    }

    #[test]
    fn test_parse_missing_unit() {
        assert!(matches!(
            RlWindow::parse("10"),
            Err(WindowParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_unknown_unit() {
        assert!(matches!(
            RlWindow::parse("5m"),
            Err(WindowParseError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(RlWindow::parse(""), Err(WindowParseError::Empty));
        assert_eq!(RlWindow::parse("   "), Err(WindowParseError::Empty));
    }

    #[test]
    fn test_parse_overflow() {
        assert!(matches!(
            RlWindow::parse("99999999999999999999d"),
            Err(WindowParseError::Overflow(_))
        ));
        assert!(matches!(
            RlWindow::parse("999999999999999d"),
            Err(WindowParseError::Overflow(_))
        ));
    }

    #[test]
    fn test_display_round_trips_input() {
        let window: RlWindow = " 15h ".parse().unwrap();
        assert_eq!(window.to_string(), "15h");
        assert_eq!(window.magnitude(), 15);
        assert_eq!(window.unit(), WindowUnit::Hours);
    }

    #[test]
    fn test_as_duration() {
        let window = RlWindow::parse("3s").unwrap();
        assert_eq!(window.as_duration(), Duration::from_secs(3));
    }
}
