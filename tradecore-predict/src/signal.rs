use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tradecore_instrument::{PredictorId, SignalId, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

/// `{id, predictor_id, symbol, ts, direction, strength, confidence,
/// horizon_bars, target_price?, stop_loss?, expires_at}` per §3. Emitted by
/// the Prediction Dispatcher, consumed by the Risk Engine, persisted for
/// audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub predictor_id: PredictorId,
    pub symbol: Symbol,
    pub ts: DateTime<Utc>,
    pub direction: Direction,
    pub strength: f64,
    pub confidence: f64,
    pub horizon_bars: u32,
    pub target_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub expires_at: DateTime<Utc>,
}

/// Default direction threshold `θ` (§4.E): predicted change beyond ±1% of
/// the current close is a directional call, otherwise `hold`.
pub const DEFAULT_THETA: f64 = 0.01;

/// Direction from a predicted percentage change, using `θ`.
pub fn direction_from_change(pct_change: f64, theta: f64) -> Direction {
    if pct_change > theta {
        Direction::Buy
    } else if pct_change < -theta {
        Direction::Sell
    } else {
        Direction::Hold
    }
}

/// Piecewise monotone strength mapping from §4.E: `|Δ|>5% → 1.0`,
/// `>3% → 0.8`, `>1% → 0.6`, `>0 → 0.4`, else `0`.
pub fn strength_from_change(pct_change: f64) -> f64 {
    let magnitude = pct_change.abs();
    if magnitude > 0.05 {
        1.0
    } else if magnitude > 0.03 {
        0.8
    } else if magnitude > 0.01 {
        0.6
    } else if magnitude > 0.0 {
        0.4
    } else {
        0.0
    }
}

/// Combine a model [`Signal`] with a technical signal per the ensemble rule
/// (§4.E / §9): agreement averages strengths, disagreement emits `hold`
/// with `strength = 0`. Confidence is carried from the model signal since
/// the technical signal has no learned uncertainty estimate.
pub fn ensemble(prediction: &Signal, technical: &Signal) -> Signal {
    let mut combined = prediction.clone();
    if prediction.direction == technical.direction {
        combined.strength = (prediction.strength + technical.strength) / 2.0;
    } else {
        combined.direction = Direction::Hold;
        combined.strength = 0.0;
    }
    combined
}
