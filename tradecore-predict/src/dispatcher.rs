use crate::artifact::PredictorStatus;
use crate::error::PredictError;
use crate::registry::PredictorRegistry;
use crate::runtime::RuntimeLoader;
use crate::signal::{direction_from_change, ensemble, strength_from_change, Direction, Signal, DEFAULT_THETA};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::debug;
use tradecore_data::{MarketDataHub, RangeSpec};
use tradecore_instrument::{PredictorId, SignalId, Symbol, Timeframe};
use tradecore_ta::{compute_feature_set, Features};

/// Minimum bars needed to clear warmup for the slowest indicator in the
/// feature set (Ichimoku's 52-period leading span).
const MIN_LOOKBACK_BARS: i64 = 120;

/// A sentinel identity for the technical (SMA-crossover) half of ensemble
/// signals — it isn't backed by a registry entry.
pub const TECHNICAL_PREDICTOR_ID: PredictorId = PredictorId(uuid::Uuid::nil());

/// Feature fetch → scale → invoke → inverse-scale → [`Signal`] (§4.E).
/// Per-predictor invocations are serialized to bound memory; invocations
/// for different predictors run in parallel up to `worker_pool_size`.
pub struct PredictionDispatcher {
    hub: Arc<MarketDataHub>,
    registry: Arc<PredictorRegistry>,
    loader: Arc<dyn RuntimeLoader>,
    worker_pool: Arc<Semaphore>,
    per_predictor_locks: AsyncMutex<HashMap<PredictorId, Arc<AsyncMutex<()>>>>,
}

impl PredictionDispatcher {
    pub fn new(
        hub: Arc<MarketDataHub>,
        registry: Arc<PredictorRegistry>,
        loader: Arc<dyn RuntimeLoader>,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            hub,
            registry,
            loader,
            worker_pool: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            per_predictor_locks: AsyncMutex::new(HashMap::new()),
        }
    }

    pub async fn predict(
        &self,
        predictor_id: PredictorId,
        symbol: &Symbol,
        timeframe: Timeframe,
        horizon_bars: u32,
    ) -> Result<Signal, PredictError> {
        let _worker_permit = self.worker_pool.acquire().await.expect("semaphore not closed");
        let predictor_lock = self.predictor_lock(predictor_id).await;
        let _predictor_guard = predictor_lock.lock().await;

        let artifact = self.registry.get(&predictor_id).ok_or(PredictError::NotFound(predictor_id))?;
        if artifact.status != PredictorStatus::Trained {
            return Err(PredictError::NotTrained(predictor_id));
        }
        let scaler = artifact.scaler_params.clone().ok_or(PredictError::NotTrained(predictor_id))?;

        let step = timeframe.duration();
        let end = Utc::now();
        let start = end - step * MIN_LOOKBACK_BARS as i32;
        let (bars, _has_gaps) = self.hub.get_bars(symbol, timeframe, RangeSpec::new(start, end)).await?;
        if (bars.len() as i64) < MIN_LOOKBACK_BARS {
            return Err(PredictError::InsufficientBars {
                needed: MIN_LOOKBACK_BARS as usize,
                available: bars.len(),
            });
        }

        let features = compute_feature_set(&bars).latest();
        let raw: Vec<f64> = artifact
            .feature_list
            .iter()
            .map(|name| feature_value(&features, name).ok_or_else(|| PredictError::Runtime(format!("unknown feature: {name}"))))
            .collect::<Result<_, _>>()?;

        let scaled = scaler.scale_features(&raw);
        let runtime = self.loader.load(&artifact).await?;
        let scaled_output = runtime.predict(&scaled)?;
        let pct_change = scaler.inverse_scale_target(scaled_output);

        let direction = direction_from_change(pct_change, DEFAULT_THETA);
        let strength = strength_from_change(pct_change);
        let confidence = artifact
            .metrics
            .get("validation_rmse_normalized")
            .map(|rmse| (1.0 - rmse).clamp(0.0, 1.0))
            .unwrap_or(0.5);

        let last_bar = bars.last().expect("checked len above");
        let current_close = last_bar.close.to_f64().unwrap_or(f64::NAN);
        let target_price = if direction != Direction::Hold {
            rust_decimal::Decimal::try_from(current_close * (1.0 + pct_change)).ok()
        } else {
            None
        };

        debug!(%predictor_id, %symbol, ?direction, strength, pct_change, "prediction dispatched");

        Ok(Signal {
            id: SignalId::random(),
            predictor_id,
            symbol: symbol.clone(),
            ts: end,
            direction,
            strength,
            confidence,
            horizon_bars,
            target_price,
            stop_loss: None,
            expires_at: last_bar.ts + step * horizon_bars as i32,
        })
    }

    /// SMA(10)/SMA(30) crossover, expressed with the same direction/strength
    /// rules as model predictions so it can feed [`ensemble`].
    pub async fn technical_signal(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        horizon_bars: u32,
    ) -> Result<Signal, PredictError> {
        let step = timeframe.duration();
        let end = Utc::now();
        let start = end - step * MIN_LOOKBACK_BARS as i32;
        let (bars, _has_gaps) = self.hub.get_bars(symbol, timeframe, RangeSpec::new(start, end)).await?;
        if (bars.len() as i64) < MIN_LOOKBACK_BARS {
            return Err(PredictError::InsufficientBars {
                needed: MIN_LOOKBACK_BARS as usize,
                available: bars.len(),
            });
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close.to_f64().unwrap_or(f64::NAN)).collect();
        let short = tradecore_ta::indicators::sma(&closes, 10);
        let long = tradecore_ta::indicators::sma(&closes, 30);
        let (short_last, long_last) = (*short.last().unwrap(), *long.last().unwrap());
        let pct_change = if long_last == 0.0 { 0.0 } else { (short_last - long_last) / long_last };

        let direction = direction_from_change(pct_change, DEFAULT_THETA);
        let strength = strength_from_change(pct_change);
        let last_bar = bars.last().expect("checked len above");

        Ok(Signal {
            id: SignalId::random(),
            predictor_id: TECHNICAL_PREDICTOR_ID,
            symbol: symbol.clone(),
            ts: end,
            direction,
            strength,
            confidence: 0.5,
            horizon_bars,
            target_price: None,
            stop_loss: None,
            expires_at: last_bar.ts + step * horizon_bars as i32,
        })
    }

    /// Ensemble mode: combine a model prediction with the technical signal
    /// per the agreement rule in §4.E/§9.
    pub async fn predict_ensemble(
        &self,
        predictor_id: PredictorId,
        symbol: &Symbol,
        timeframe: Timeframe,
        horizon_bars: u32,
    ) -> Result<Signal, PredictError> {
        let prediction = self.predict(predictor_id, symbol, timeframe, horizon_bars).await?;
        let technical = self.technical_signal(symbol, timeframe, horizon_bars).await?;
        Ok(ensemble(&prediction, &technical))
    }

    async fn predictor_lock(&self, predictor_id: PredictorId) -> Arc<AsyncMutex<()>> {
        self.per_predictor_locks
            .lock()
            .await
            .entry(predictor_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn feature_value(features: &Features, name: &str) -> Option<f64> {
    Some(match name {
        "sma_20" => features.sma_20,
        "ema_20" => features.ema_20,
        "rsi_14" => features.rsi_14,
        "macd_line" => features.macd_line,
        "macd_signal" => features.macd_signal,
        "macd_histogram" => features.macd_histogram,
        "bollinger_upper" => features.bollinger_upper,
        "bollinger_middle" => features.bollinger_middle,
        "bollinger_lower" => features.bollinger_lower,
        "atr_14" => features.atr_14,
        "obv" => features.obv,
        "roc_10" => features.roc_10,
        "stoch_k" => features.stoch_k,
        "stoch_d" => features.stoch_d,
        "williams_r_14" => features.williams_r_14,
        "adx_14" => features.adx_14,
        "cci_14" => features.cci_14,
        "aroon_up" => features.aroon_up,
        "aroon_down" => features.aroon_down,
        "ichimoku_conversion" => features.ichimoku_conversion,
        "ichimoku_base" => features.ichimoku_base,
        "ichimoku_span_a" => features.ichimoku_span_a,
        "ichimoku_span_b" => features.ichimoku_span_b,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{PredictorKind, ScalerParams};
    use crate::runtime::{LinearPredictorRuntime, LinearRuntimeLoader};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::num::NonZeroUsize;
    use tradecore_data::Bar;
    use tradecore_instrument::symbol::ProviderId;

    fn seed_bars(symbol: &str, n: i64) -> Vec<Bar> {
        let t0 = Utc::now() - Duration::days(n);
        (0..n)
            .map(|i| Bar {
                symbol: Symbol::from(symbol),
                timeframe: Timeframe::D1,
                ts: t0 + Duration::days(i),
                open: dec!(100),
                high: dec!(101),
                low: dec!(99),
                close: rust_decimal::Decimal::try_from(100.0 + i as f64 * 0.1).unwrap(),
                volume: dec!(1000),
                source: ProviderId::Mock,
                received_at: t0,
            })
            .collect()
    }

    #[tokio::test]
    async fn predict_assembles_a_signal_from_a_trained_artifact() {
        let adapter = Arc::new(tradecore_data::provider::InMemoryProviderAdapter::new(
            ProviderId::Mock,
            seed_bars("AAPL", 150),
        ));
        let hub = Arc::new(MarketDataHub::new(vec![adapter], NonZeroUsize::new(16).unwrap()));

        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(PredictorRegistry::open(dir.path().join("registry.json")).await.unwrap());
        let artifact = registry
            .create(PredictorKind::Lstm, vec!["sma_20".into(), "rsi_14".into()], vec![2])
            .await
            .unwrap();
        registry.start_training(&artifact.id).await.unwrap();

        let mut loader = LinearRuntimeLoader::new();
        loader.put_blob("sha256:test", LinearPredictorRuntime { weights: vec![0.5, 0.1], bias: 0.0 });
        let loader = Arc::new(loader);

        registry
            .mark_trained(
                &artifact.id,
                ScalerParams {
                    feature_mean: vec![0.0, 0.0],
                    feature_std: vec![1.0, 1.0],
                    target_mean: 0.0,
                    target_std: 0.001,
                },
                "sha256:test".into(),
                HashMap::new(),
            )
            .await
            .unwrap();

        let dispatcher = PredictionDispatcher::new(hub, registry, loader, 4);
        let signal = dispatcher
            .predict(artifact.id, &Symbol::from("AAPL"), Timeframe::D1, 5)
            .await
            .unwrap();
        assert!(signal.strength >= 0.0 && signal.strength <= 1.0);
        assert!(signal.confidence >= 0.0 && signal.confidence <= 1.0);
    }

    #[test]
    fn ensemble_disagreement_yields_hold_with_zero_strength() {
        let base = Signal {
            id: SignalId::random(),
            predictor_id: PredictorId::random(),
            symbol: Symbol::from("AAPL"),
            ts: Utc::now(),
            direction: Direction::Buy,
            strength: 0.8,
            confidence: 0.7,
            horizon_bars: 5,
            target_price: None,
            stop_loss: None,
            expires_at: Utc::now(),
        };
        let mut technical = base.clone();
        technical.direction = Direction::Sell;
        technical.strength = 0.6;

        let combined = ensemble(&base, &technical);
        assert_eq!(combined.direction, Direction::Hold);
        assert_eq!(combined.strength, 0.0);
    }
}
