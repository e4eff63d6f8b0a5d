#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Risk Engine (§4.G): return-series metrics, Kelly position sizing, a
//! pre-trade gate, named stress scenarios, and the exposure/drawdown/
//! correlation/position trackers the gate consults for running state.

pub mod alert;
pub mod correlation;
pub mod drawdown;
pub mod exposure;
pub mod gate;
pub mod metrics;
pub mod position_tracker;
pub mod sizing;
pub mod stress;

pub use alert::{RiskAlertHook, RiskViolation};
pub use correlation::CorrelationMatrix;
pub use drawdown::DrawdownTracker;
pub use exposure::ExposureTracker;
pub use metrics::{conditional_value_at_risk, expected_shortfall, max_drawdown, sharpe_ratio, sortino_ratio, value_at_risk};
pub use position_tracker::PositionTracker;
pub use sizing::{kelly_fraction, shares_from_fraction};
pub use gate::{PortfolioSnapshot, PositionSnapshot, PreTradeGate, ProposedOrder, RejectionReason, RiskLimits};
pub use stress::{apply_scenario, predefined_scenarios, AssetClass, StressResult, StressScenario, TaggedPosition};
pub use tradecore_instrument::Side;
