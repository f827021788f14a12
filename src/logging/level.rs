//! Log severity levels and their display attributes.

use std::fmt;
use std::str::FromStr;

use crossterm::style::Color;
use serde::{Deserialize, Serialize};

/// Severity of a log entry.
///
/// `Success` is a cosmetic sibling of `Info`: it filters at the same severity
/// but renders green so provisioning scripts can flag completed steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Success,
    Warning,
    Error,
    Fatal,
}

impl Level {
    /// Numeric severity rank (higher = more severe).
    pub fn severity(&self) -> u8 {
        match self {
            Level::Debug => 0,
            Level::Info | Level::Success => 1,
            Level::Warning => 2,
            Level::Error => 3,
            Level::Fatal => 4,
        }
    }

    /// Check whether this level passes a minimum-severity filter.
    pub fn passes(&self, min: Level) -> bool {
        self.severity() >= min.severity()
    }

    /// Upper-case tag used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }

    /// Terminal color for the console sink.
    pub fn color(&self) -> Color {
        match self {
            Level::Debug => Color::Cyan,
            Level::Info => Color::White,
            Level::Success => Color::Green,
            Level::Warning => Color::Yellow,
            Level::Error => Color::Red,
            Level::Fatal => Color::Magenta,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "success" => Ok(Level::Success),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Unknown log level name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Level::Debug.severity() < Level::Info.severity());
        assert!(Level::Info.severity() < Level::Warning.severity());
        assert!(Level::Warning.severity() < Level::Error.severity());
        assert!(Level::Error.severity() < Level::Fatal.severity());
    }

    #[test]
    fn test_success_filters_like_info() {
        assert_eq!(Level::Success.severity(), Level::Info.severity());
        assert!(Level::Success.passes(Level::Info));
        assert!(!Level::Success.passes(Level::Warning));
    }

    #[test]
    fn test_passes_filter() {
        assert!(Level::Error.passes(Level::Info));
        assert!(Level::Info.passes(Level::Info));
        assert!(!Level::Debug.passes(Level::Info));
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("DEBUG".parse::<Level>().unwrap(), Level::Debug);
        assert_eq!("Info".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("fatal".parse::<Level>().unwrap(), Level::Fatal);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn test_display_matches_tag() {
        assert_eq!(Level::Warning.to_string(), "WARNING");
        assert_eq!(Level::Success.to_string(), "SUCCESS");
    }
}
