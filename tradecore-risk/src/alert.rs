use derive_more::Constructor;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tradecore_instrument::Symbol;

/// Risk-limit breaches surfaced by the exposure/drawdown/correlation
/// trackers (§4.G's "composable risk-alert primitives").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Constructor)]
pub enum RiskViolation {
    ExposureLimit { symbol: Symbol, exposure: Decimal, limit: Decimal },
    DrawdownLimit { symbol: Symbol, drawdown: Decimal, limit: Decimal },
    CorrelationLimit { symbols: (Symbol, Symbol), combined_exposure: Decimal, limit: Decimal },
}

/// Consumes risk alerts as they're raised by a tracker's `check_limit`.
pub trait RiskAlertHook {
    fn alert(&self, violation: RiskViolation);
}

/// Test/inspection hook that stores every alert it receives.
#[derive(Default)]
pub struct VecAlertHook {
    pub alerts: Mutex<Vec<RiskViolation>>,
}

impl RiskAlertHook for VecAlertHook {
    fn alert(&self, violation: RiskViolation) {
        self.alerts.lock().push(violation);
    }
}
