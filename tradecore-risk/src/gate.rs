use crate::metrics::value_at_risk;
use crate::stress::AssetClass;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradecore_instrument::{PortfolioId, Side, Symbol};

#[derive(Debug, Clone)]
pub struct PositionSnapshot {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub market_value: Decimal,
    pub asset_classes: Vec<AssetClass>,
}

#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub portfolio_id: PortfolioId,
    pub cash: Decimal,
    pub total_value: Decimal,
    pub positions: Vec<PositionSnapshot>,
    pub daily_traded_notional: Decimal,
    /// Recent daily return series, used for the portfolio's VaR% check.
    pub returns: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ProposedOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub asset_classes: Vec<AssetClass>,
}

impl ProposedOrder {
    fn signed_notional(&self) -> Decimal {
        let signed_qty = match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        };
        signed_qty * self.price
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_weight: Decimal,
    pub var_limit: f64,
    pub max_leverage: Decimal,
    pub max_concentration: Decimal,
    pub max_daily_volume: Decimal,
}

/// Machine-readable rejection reason (§4.G). `code()` is the stable
/// identifier a caller should branch on; the `Display` impl is for logs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RejectionReason {
    #[error("position weight {weight} exceeds limit {limit}")]
    PositionWeightExceeded { weight: Decimal, limit: Decimal },

    #[error("portfolio VaR% {var_pct} exceeds limit {limit}")]
    VarLimitExceeded { var_pct: f64, limit: f64 },

    #[error("leverage {leverage} exceeds limit {limit}")]
    LeverageExceeded { leverage: Decimal, limit: Decimal },

    #[error("asset-class concentration {concentration} exceeds limit {limit}")]
    ConcentrationExceeded { concentration: Decimal, limit: Decimal },

    #[error("daily traded volume {volume} exceeds limit {limit}")]
    DailyVolumeExceeded { volume: Decimal, limit: Decimal },
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::PositionWeightExceeded { .. } => "position_weight_exceeded",
            RejectionReason::VarLimitExceeded { .. } => "var_limit_exceeded",
            RejectionReason::LeverageExceeded { .. } => "leverage_exceeded",
            RejectionReason::ConcentrationExceeded { .. } => "concentration_exceeded",
            RejectionReason::DailyVolumeExceeded { .. } => "daily_volume_exceeded",
        }
    }
}

/// Pre-trade risk gate (§4.G): rejects a proposed order when *any* configured
/// limit would be violated post-trade. Checks run in the fixed order named
/// in the spec so the first violation encountered is always the one
/// reported — callers should not rely on every simultaneous violation being
/// enumerated.
pub struct PreTradeGate {
    pub limits: RiskLimits,
}

impl PreTradeGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn evaluate(&self, portfolio: &PortfolioSnapshot, order: &ProposedOrder) -> Result<(), RejectionReason> {
        let delta = order.signed_notional();

        let existing_value = portfolio
            .positions
            .iter()
            .find(|p| p.symbol == order.symbol)
            .map(|p| p.market_value)
            .unwrap_or(Decimal::ZERO);
        let new_position_value = existing_value + delta;
        let total_value = portfolio.total_value;

        if total_value > Decimal::ZERO {
            let weight = (new_position_value / total_value).abs();
            if weight > self.limits.max_position_weight {
                return Err(RejectionReason::PositionWeightExceeded { weight, limit: self.limits.max_position_weight });
            }
        }

        let var_pct = value_at_risk(&portfolio.returns, 0.95);
        if var_pct > self.limits.var_limit {
            return Err(RejectionReason::VarLimitExceeded { var_pct, limit: self.limits.var_limit });
        }

        if total_value > Decimal::ZERO {
            let gross_exposure: Decimal = portfolio
                .positions
                .iter()
                .map(|p| if p.symbol == order.symbol { (p.market_value + delta).abs() } else { p.market_value.abs() })
                .sum();
            let leverage = gross_exposure / total_value;
            if leverage > self.limits.max_leverage {
                return Err(RejectionReason::LeverageExceeded { leverage, limit: self.limits.max_leverage });
            }

            let tags: Vec<&AssetClass> =
                order.asset_classes.iter().chain(portfolio.positions.iter().flat_map(|p| p.asset_classes.iter())).collect();
            for tag in tags {
                let concentration: Decimal = portfolio
                    .positions
                    .iter()
                    .filter(|p| p.asset_classes.contains(tag))
                    .map(|p| if p.symbol == order.symbol { (p.market_value + delta).abs() } else { p.market_value.abs() })
                    .sum::<Decimal>()
                    / total_value;
                if concentration > self.limits.max_concentration {
                    return Err(RejectionReason::ConcentrationExceeded { concentration, limit: self.limits.max_concentration });
                }
            }
        }

        let volume_after = portfolio.daily_traded_notional + delta.abs();
        if volume_after > self.limits.max_daily_volume {
            return Err(RejectionReason::DailyVolumeExceeded { volume: volume_after, limit: self.limits.max_daily_volume });
        }

        Ok(())
    }
}
