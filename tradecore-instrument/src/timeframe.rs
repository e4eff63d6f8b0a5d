use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The canonical timeframe set (§4.A). Provider adapters map their native
/// intervals onto this set and reject anything that doesn't fit with
/// [`TimeframeError::Unsupported`].
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    D1,
    W1,
    Mo1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::Mo1,
    ];

    /// Parse a provider-native timeframe string onto the canonical set.
    ///
    /// Accepts the common spellings (`"1m"`, `"1Min"`, `"1h"`, `"1d"`, `"1w"`,
    /// `"1mo"`) so each [`ProviderAdapter`](tradecore_data) only needs to
    /// normalize its own vendor spelling before delegating here.
    pub fn parse(native: &str) -> Result<Self, TimeframeError> {
        let normalized = native.to_ascii_lowercase();
        Ok(match normalized.as_str() {
            "1m" | "1min" | "1minute" => Timeframe::M1,
            "5m" | "5min" | "5minute" => Timeframe::M5,
            "15m" | "15min" => Timeframe::M15,
            "30m" | "30min" => Timeframe::M30,
            "1h" | "60m" | "1hour" => Timeframe::H1,
            "1d" | "1day" | "daily" => Timeframe::D1,
            "1w" | "1week" | "weekly" => Timeframe::W1,
            "1mo" | "1month" | "monthly" => Timeframe::Mo1,
            other => {
                return Err(TimeframeError::Unsupported(other.to_string()));
            }
        })
    }

    /// Nominal duration of one bar at this [`Timeframe`]. Months are
    /// approximated as 30 days purely for gap-detection heuristics; the
    /// calendar-accurate bar boundary is the provider's concern.
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
            Timeframe::Mo1 => Duration::days(30),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
            Timeframe::Mo1 => "1mo",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TimeframeError {
    #[error("unsupported timeframe: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_spellings() {
        assert_eq!(Timeframe::parse("1Min").unwrap(), Timeframe::M1);
        assert_eq!(Timeframe::parse("1d").unwrap(), Timeframe::D1);
        assert_eq!(Timeframe::parse("Daily").unwrap(), Timeframe::D1);
    }

    #[test]
    fn rejects_unsupported_timeframe() {
        let err = Timeframe::parse("3m").unwrap_err();
        assert!(matches!(err, TimeframeError::Unsupported(_)));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::parse(&tf.to_string()).unwrap(), tf);
        }
    }
}
