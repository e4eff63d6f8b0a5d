use crate::alert::{RiskAlertHook, RiskViolation};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tradecore_instrument::Symbol;

/// Tracks realized/unrealized PnL per symbol to compute drawdown from its
/// running peak.
#[derive(Debug, Default, Clone)]
pub struct DrawdownTracker {
    peak: HashMap<Symbol, Decimal>,
    current: HashMap<Symbol, Decimal>,
}

impl DrawdownTracker {
    pub fn new() -> Self {
        Self { peak: HashMap::new(), current: HashMap::new() }
    }

    pub fn update_pnl(&mut self, symbol: Symbol, pnl: Decimal) {
        let cur = self.current.entry(symbol.clone()).or_insert(Decimal::ZERO);
        *cur += pnl;
        let peak = self.peak.entry(symbol).or_insert(*cur);
        if *cur > *peak {
            *peak = *cur;
        }
    }

    pub fn drawdown(&self, symbol: &Symbol) -> Decimal {
        let cur = *self.current.get(symbol).unwrap_or(&Decimal::ZERO);
        let peak = *self.peak.get(symbol).unwrap_or(&cur);
        if peak.is_zero() {
            Decimal::ZERO
        } else {
            (peak - cur) / peak
        }
    }

    pub fn check_limit(&self, symbol: Symbol, limit: Decimal, hook: &impl RiskAlertHook) {
        let drawdown = self.drawdown(&symbol);
        if drawdown > limit {
            hook.alert(RiskViolation::DrawdownLimit { symbol, drawdown, limit });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn drawdown_tracks_decline_from_peak() {
        let mut tracker = DrawdownTracker::new();
        tracker.update_pnl(Symbol::from("AAPL"), dec!(100));
        tracker.update_pnl(Symbol::from("AAPL"), dec!(-40));
        assert_eq!(tracker.drawdown(&Symbol::from("AAPL")), dec!(0.4));
    }
}
