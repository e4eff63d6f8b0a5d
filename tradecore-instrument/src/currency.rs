use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Portfolio cash currency. A sum type per the source's "replacing dynamic
/// typing" guidance rather than a loosely typed currency-code string.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Other(SmolStr),
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => write!(f, "USD"),
            Currency::Eur => write!(f, "EUR"),
            Currency::Gbp => write!(f, "GBP"),
            Currency::Other(code) => write!(f, "{code}"),
        }
    }
}
