//! Trading session utilities.
//!
//! Provides session classification based on UTC time.
//! Used for:
//! - Session filters on conditional orders
//! - Session-aware order registration
//! - The session panel exposed by the engine (current/next session)

use crate::error::{CoreError, Result};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Trading session classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingSession {
    /// Asian session: 22:00 – 08:00 UTC by default.
    Asian,
    /// London session: 08:00 – 16:00 UTC by default.
    London,
    /// New York session: 13:00 – 22:00 UTC by default.
    #[serde(rename = "NEWYORK", alias = "NEW_YORK")]
    NewYork,
    /// No configured window covers the hour.
    OffHours,
}

impl std::fmt::Display for TradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asian => write!(f, "ASIAN"),
            Self::London => write!(f, "LONDON"),
            Self::NewYork => write!(f, "NEWYORK"),
            Self::OffHours => write!(f, "OFF_HOURS"),
        }
    }
}

impl std::str::FromStr for TradingSession {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "ASIAN" | "ASIA" => Ok(Self::Asian),
            "LONDON" => Ok(Self::London),
            "NEWYORK" | "NEW_YORK" | "NY" => Ok(Self::NewYork),
            "OFF_HOURS" | "OFFHOURS" => Ok(Self::OffHours),
            other => Err(CoreError::InvalidSessionWindow(format!(
                "unknown session: {other}"
            ))),
        }
    }
}

impl TradingSession {
    /// Next major session in the Asian → London → New York cycle.
    ///
    /// Off-hours rolls into the Asian session.
    #[must_use]
    pub fn next(&self) -> TradingSession {
        match self {
            Self::Asian => Self::London,
            Self::London => Self::NewYork,
            Self::NewYork => Self::Asian,
            Self::OffHours => Self::Asian,
        }
    }

    /// Static characteristics for the session.
    #[must_use]
    pub fn profile(&self) -> SessionProfile {
        match self {
            Self::Asian => SessionProfile {
                session: *self,
                typical_volume: "medium",
                best_pairs: &["USD/JPY", "AUD/USD", "NZD/USD"],
                recommendation: "Lower volatility, suited to JPY and antipodean pairs",
            },
            Self::London => SessionProfile {
                session: *self,
                typical_volume: "high",
                best_pairs: &["EUR/USD", "GBP/USD", "EUR/GBP"],
                recommendation: "Highest volatility and volume, good for scalping and swings",
            },
            Self::NewYork => SessionProfile {
                session: *self,
                typical_volume: "high",
                best_pairs: &["EUR/USD", "GBP/USD", "USD/CAD"],
                recommendation: "Strong trends, good for trend-following",
            },
            Self::OffHours => SessionProfile {
                session: *self,
                typical_volume: "low",
                best_pairs: &[],
                recommendation: "Thin liquidity and wide spreads, consider waiting",
            },
        }
    }
}

/// Descriptive profile of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProfile {
    pub session: TradingSession,
    pub typical_volume: &'static str,
    pub best_pairs: &'static [&'static str],
    pub recommendation: &'static str,
}

/// Half-open UTC hour window `[start_hour, end_hour)`.
///
/// `start_hour > end_hour` wraps across midnight. `start_hour == end_hour`
/// is an empty window (disables the session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl SessionWindow {
    pub const fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    #[must_use]
    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.start_hour > 23 || self.end_hour > 24 {
            return Err(CoreError::InvalidSessionWindow(format!(
                "{name}: hours out of range ({}..{})",
                self.start_hour, self.end_hour
            )));
        }
        Ok(())
    }
}

/// Session windows used by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindows {
    #[serde(default = "default_asian")]
    pub asian: SessionWindow,
    #[serde(default = "default_london")]
    pub london: SessionWindow,
    #[serde(default = "default_new_york")]
    pub new_york: SessionWindow,
}

fn default_asian() -> SessionWindow {
    SessionWindow::new(22, 8)
}

fn default_london() -> SessionWindow {
    SessionWindow::new(8, 16)
}

fn default_new_york() -> SessionWindow {
    SessionWindow::new(13, 22)
}

impl Default for SessionWindows {
    fn default() -> Self {
        Self {
            asian: default_asian(),
            london: default_london(),
            new_york: default_new_york(),
        }
    }
}

impl SessionWindows {
    /// Validate hour ranges.
    pub fn validate(&self) -> Result<()> {
        self.asian.validate("asian")?;
        self.london.validate("london")?;
        self.new_york.validate("new_york")
    }

    /// Classify a UTC timestamp.
    ///
    /// Overlaps resolve New York > London > Asian.
    #[must_use]
    pub fn session_at(&self, dt: DateTime<Utc>) -> TradingSession {
        let hour = dt.hour();

        if self.new_york.contains_hour(hour) {
            TradingSession::NewYork
        } else if self.london.contains_hour(hour) {
            TradingSession::London
        } else if self.asian.contains_hour(hour) {
            TradingSession::Asian
        } else {
            TradingSession::OffHours
        }
    }
}

/// Get the trading session at a given UTC datetime using the default windows.
#[must_use]
pub fn session_at(dt: DateTime<Utc>) -> TradingSession {
    SessionWindows::default().session_at(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_default_windows() {
        assert_eq!(session_at(at(3, 0)), TradingSession::Asian);
        assert_eq!(session_at(at(23, 59)), TradingSession::Asian);
        assert_eq!(session_at(at(8, 0)), TradingSession::London);
        assert_eq!(session_at(at(12, 59)), TradingSession::London);
        assert_eq!(session_at(at(21, 30)), TradingSession::NewYork);
        assert_eq!(session_at(at(22, 0)), TradingSession::Asian);
    }

    #[test]
    fn test_overlap_prefers_new_york() {
        // 13:00-16:00 is covered by both London and New York.
        assert_eq!(session_at(at(13, 0)), TradingSession::NewYork);
        assert_eq!(session_at(at(15, 59)), TradingSession::NewYork);
    }

    #[test]
    fn test_off_hours_reachable_with_gaps() {
        let windows = SessionWindows {
            asian: SessionWindow::new(0, 6),
            london: SessionWindow::new(8, 16),
            new_york: SessionWindow::new(13, 21),
        };
        assert_eq!(windows.session_at(at(7, 0)), TradingSession::OffHours);
        assert_eq!(windows.session_at(at(22, 0)), TradingSession::OffHours);
        assert_eq!(windows.session_at(at(5, 0)), TradingSession::Asian);
    }

    #[test]
    fn test_empty_window_disables_session() {
        let windows = SessionWindows {
            asian: SessionWindow::new(0, 0),
            ..SessionWindows::default()
        };
        assert_eq!(windows.session_at(at(3, 0)), TradingSession::OffHours);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let windows = SessionWindows {
            london: SessionWindow::new(25, 4),
            ..SessionWindows::default()
        };
        assert!(windows.validate().is_err());
        assert!(SessionWindows::default().validate().is_ok());
    }

    #[test]
    fn test_next_session_cycle() {
        assert_eq!(TradingSession::Asian.next(), TradingSession::London);
        assert_eq!(TradingSession::London.next(), TradingSession::NewYork);
        assert_eq!(TradingSession::NewYork.next(), TradingSession::Asian);
        assert_eq!(TradingSession::OffHours.next(), TradingSession::Asian);
    }

    #[test]
    fn test_parse_session_names() {
        assert_eq!("london".parse::<TradingSession>().unwrap(), TradingSession::London);
        assert_eq!("new_york".parse::<TradingSession>().unwrap(), TradingSession::NewYork);
        assert_eq!("NEWYORK".parse::<TradingSession>().unwrap(), TradingSession::NewYork);
        assert!("tokyo".parse::<TradingSession>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TradingSession::NewYork).unwrap();
        assert_eq!(json, "\"NEWYORK\"");
        let parsed: TradingSession = serde_json::from_str("\"OFF_HOURS\"").unwrap();
        assert_eq!(parsed, TradingSession::OffHours);
    }
}
