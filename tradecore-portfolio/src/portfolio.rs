use crate::position::Position;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tradecore_instrument::{Currency, PortfolioId, Symbol};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioStatus {
    Active,
    /// Set by an `ErrIntegrity` halt (§7); writes are refused until cleared.
    Halted,
    Closed,
}

/// `{id, owner_id, cash, currency, positions, var_limit,
/// max_position_weight, max_leverage, status}` per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: PortfolioId,
    pub owner_id: String,
    pub cash: Decimal,
    pub currency: Currency,
    pub positions: IndexMap<Symbol, Position>,
    pub var_limit: f64,
    pub max_position_weight: Decimal,
    pub max_leverage: Decimal,
    pub status: PortfolioStatus,
}

impl Portfolio {
    pub fn new(id: PortfolioId, owner_id: impl Into<String>, cash: Decimal, currency: Currency) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            cash,
            currency,
            positions: IndexMap::new(),
            var_limit: 0.1,
            max_position_weight: Decimal::new(25, 2),
            max_leverage: Decimal::new(2, 0),
            status: PortfolioStatus::Active,
        }
    }

    /// `cash + Σ pos.quantity * last_mark` (falling back to `avg_cost` for
    /// unmarked positions), the denominator of the leverage invariant (§3).
    pub fn total_value(&self) -> Decimal {
        self.cash + self.positions.values().map(Position::market_value).sum::<Decimal>()
    }

    /// `Σ|pos.quantity * last_mark| / total_value` — the invariant in §3
    /// that [`Portfolio::total_value`] is compared against externally.
    pub fn leverage(&self) -> Decimal {
        let total = self.total_value();
        if total.is_zero() {
            return Decimal::ZERO;
        }
        let gross: Decimal = self.positions.values().map(|p| p.market_value().abs()).sum();
        gross / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn total_value_sums_cash_and_marked_positions() {
        let mut portfolio = Portfolio::new(PortfolioId::random(), "user-1", dec!(50_000), Currency::Usd);
        let mut pos = Position::flat(Symbol::from("AAPL"), chrono::Utc::now());
        pos.apply_fill(dec!(100), dec!(150), chrono::Utc::now());
        pos.mark(dec!(155), chrono::Utc::now());
        portfolio.positions.insert(Symbol::from("AAPL"), pos);
        assert_eq!(portfolio.total_value(), dec!(50_000) + dec!(15_500));
    }
}
