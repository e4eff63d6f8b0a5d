use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Order/fill direction, shared by the risk gate, the portfolio store, and
/// the execution engine so the three don't each grow their own copy (§9:
/// "sum types ... for `OrderSide`").
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// `+1` for `Buy`, `-1` for `Sell` — the sign applied to a fill's
    /// quantity when folding it into a signed [`Position`](tradecore_portfolio)
    /// quantity.
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}
