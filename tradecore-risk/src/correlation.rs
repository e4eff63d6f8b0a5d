use crate::alert::{RiskAlertHook, RiskViolation};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tradecore_instrument::Symbol;

/// Configured combined-exposure limits between symbol pairs.
#[derive(Debug, Default, Clone)]
pub struct CorrelationMatrix {
    limits: HashMap<(Symbol, Symbol), Decimal>,
}

impl CorrelationMatrix {
    pub fn new() -> Self {
        Self { limits: HashMap::new() }
    }

    pub fn set_limit(&mut self, a: Symbol, b: Symbol, limit: Decimal) {
        self.limits.insert((a, b), limit);
    }

    pub fn check_limit(&self, a: Symbol, b: Symbol, combined_exposure: Decimal, hook: &impl RiskAlertHook) {
        if let Some(limit) = self.limits.get(&(a.clone(), b.clone())) {
            if combined_exposure > *limit {
                hook.alert(RiskViolation::CorrelationLimit {
                    symbols: (a, b),
                    combined_exposure,
                    limit: *limit,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::VecAlertHook;
    use rust_decimal_macros::dec;

    #[test]
    fn check_limit_alerts_when_combined_exposure_exceeds_configured_pair_limit() {
        let mut matrix = CorrelationMatrix::new();
        matrix.set_limit(Symbol::from("AAPL"), Symbol::from("MSFT"), dec!(10000));
        let hook = VecAlertHook::default();
        matrix.check_limit(Symbol::from("AAPL"), Symbol::from("MSFT"), dec!(15000), &hook);
        assert_eq!(hook.alerts.lock().len(), 1);
    }
}
