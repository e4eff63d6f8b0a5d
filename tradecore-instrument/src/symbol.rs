use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A tradable symbol, eg/ `"AAPL"`, `"MSFT"`, `"BTCUSDT"`.
///
/// Backed by a [`SmolStr`] so cloning a [`Symbol`] used as a cache or map key
/// is cheap (inline storage for short tickers, the common case).
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, Constructor,
)]
pub struct Symbol(pub SmolStr);

impl Symbol {
    pub fn new(ticker: impl Into<SmolStr>) -> Self {
        Self(ticker.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self(SmolStr::new(value))
    }
}

/// Identifies the upstream provider or broker a [`Bar`](tradecore_data) or
/// credential belongs to. Unlike the teacher's large per-venue `ExchangeId`
/// enum, this core only needs the handful of venues it actually wires up,
/// plus `Other` as an escape hatch for configuration-driven venues.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    AlphaVantage,
    Iex,
    Mock,
    Other,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum BrokerId {
    Alpaca,
    InteractiveBrokers,
    Mock,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_from_str_round_trips() {
        let sym = Symbol::from("AAPL");
        assert_eq!(sym.as_str(), "AAPL");
        assert_eq!(sym.to_string(), "AAPL");
    }
}
