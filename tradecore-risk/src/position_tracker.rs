use crate::alert::{RiskAlertHook, RiskViolation};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tradecore_instrument::Symbol;

/// Tracks net position per symbol. Positive amounts are long exposure,
/// negative amounts short.
#[derive(Debug, Default, Clone)]
pub struct PositionTracker {
    positions: HashMap<Symbol, Decimal>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self { positions: HashMap::new() }
    }

    pub fn update(&mut self, symbol: Symbol, qty: Decimal) {
        *self.positions.entry(symbol).or_insert(Decimal::ZERO) += qty;
    }

    pub fn position(&self, symbol: &Symbol) -> Decimal {
        *self.positions.get(symbol).unwrap_or(&Decimal::ZERO)
    }

    pub fn check_limit(&self, symbol: Symbol, limit: Decimal, hook: &impl RiskAlertHook) {
        let position = self.position(&symbol);
        if position.abs() > limit {
            hook.alert(RiskViolation::ExposureLimit { symbol, exposure: position, limit });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_accumulates_net_position() {
        let mut tracker = PositionTracker::new();
        tracker.update(Symbol::from("AAPL"), rust_decimal::Decimal::from(10));
        tracker.update(Symbol::from("AAPL"), rust_decimal::Decimal::from(-3));
        assert_eq!(tracker.position(&Symbol::from("AAPL")), rust_decimal::Decimal::from(7));
    }
}
