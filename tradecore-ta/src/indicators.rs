use rust_decimal::prelude::ToPrimitive;
use std::collections::VecDeque;
use tradecore_data::Bar;

/// Sentinel for an indicator value that isn't yet defined (insufficient
/// warmup bars), per §4.C. `NAN != NAN`, so callers must use `.is_nan()`
/// rather than equality to detect it.
pub const UNDEFINED: f64 = f64::NAN;

fn decimal_series(bars: &[Bar], pick: impl Fn(&Bar) -> rust_decimal::Decimal) -> Vec<f64> {
    bars.iter().map(|b| pick(b).to_f64().unwrap_or(UNDEFINED)).collect()
}

fn closes(bars: &[Bar]) -> Vec<f64> {
    decimal_series(bars, |b| b.close)
}

/// Simple moving average over `period` closes.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![UNDEFINED; values.len()];
    if period == 0 {
        return out;
    }
    let mut window: VecDeque<f64> = VecDeque::with_capacity(period);
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        window.push_back(v);
        sum += v;
        if window.len() > period {
            sum -= window.pop_front().unwrap();
        }
        if window.len() == period {
            out[i] = sum / period as f64;
        }
    }
    out
}

/// Exponential moving average, seeded once `period` samples are available
/// (the first value is the SMA of the first `period` points).
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![UNDEFINED; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let mut prev = seed;
    for i in period..values.len() {
        let next = (values[i] - prev) * multiplier + prev;
        out[i] = next;
        prev = next;
    }
    out
}

/// Wilder's RSI(`period`), default period 14.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![UNDEFINED; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let delta = values[i] - values[i - 1];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    out[period] = rsi_from_averages(avg_gain, avg_loss);

    for i in (period + 1)..values.len() {
        let delta = values[i] - values[i - 1];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = rsi_from_averages(avg_gain, avg_loss);
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// MACD(fast, slow, signal): the MACD line is `EMA(fast) - EMA(slow)`, the
/// signal line is `EMA(signal)` of the MACD line, and the histogram is their
/// difference.
#[derive(Debug, Clone)]
pub struct Macd {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| {
            if f.is_nan() || s.is_nan() {
                UNDEFINED
            } else {
                f - s
            }
        })
        .collect();

    let defined: Vec<f64> = macd_line.iter().copied().filter(|v| !v.is_nan()).collect();
    let signal_on_defined = ema(&defined, signal);
    let mut signal_line = vec![UNDEFINED; macd_line.len()];
    let first_defined = macd_line.iter().position(|v| !v.is_nan());
    if let Some(start) = first_defined {
        for (offset, value) in signal_on_defined.into_iter().enumerate() {
            signal_line[start + offset] = value;
        }
    }

    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| if m.is_nan() || s.is_nan() { UNDEFINED } else { m - s })
        .collect();

    Macd { macd_line, signal_line, histogram }
}

/// Bollinger Bands(period, num_std): middle band is the SMA, upper/lower are
/// offset by `num_std` standard deviations of the same window.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(values: &[f64], period: usize, num_std: f64) -> BollingerBands {
    let middle = sma(values, period);
    let mut upper = vec![UNDEFINED; values.len()];
    let mut lower = vec![UNDEFINED; values.len()];
    if period == 0 {
        return BollingerBands { upper, middle, lower };
    }
    for i in 0..values.len() {
        if middle[i].is_nan() {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        let mean = middle[i];
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let stddev = variance.sqrt();
        upper[i] = mean + num_std * stddev;
        lower[i] = mean - num_std * stddev;
    }
    BollingerBands { upper, middle, lower }
}

/// Average True Range(period), Wilder-smoothed.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let highs = decimal_series(bars, |b| b.high);
    let lows = decimal_series(bars, |b| b.low);
    let close = closes(bars);
    let mut true_range = vec![UNDEFINED; bars.len()];
    for i in 0..bars.len() {
        true_range[i] = if i == 0 {
            highs[i] - lows[i]
        } else {
            (highs[i] - lows[i])
                .max((highs[i] - close[i - 1]).abs())
                .max((lows[i] - close[i - 1]).abs())
        };
    }

    let mut out = vec![UNDEFINED; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }
    let seed = true_range[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let mut prev = seed;
    for i in period..bars.len() {
        let next = (prev * (period as f64 - 1.0) + true_range[i]) / period as f64;
        out[i] = next;
        prev = next;
    }
    out
}

/// On-Balance Volume: a running sum of signed volume, cumulative from the
/// first bar (defined everywhere, no warmup).
pub fn obv(bars: &[Bar]) -> Vec<f64> {
    let close = closes(bars);
    let volume = decimal_series(bars, |b| b.volume);
    let mut out = vec![0.0; bars.len()];
    for i in 1..bars.len() {
        let direction = if close[i] > close[i - 1] {
            1.0
        } else if close[i] < close[i - 1] {
            -1.0
        } else {
            0.0
        };
        out[i] = out[i - 1] + direction * volume[i];
    }
    out
}

/// Rate of change over `period` bars, as a percentage.
pub fn roc(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![UNDEFINED; values.len()];
    for i in period..values.len() {
        let past = values[i - period];
        if past != 0.0 {
            out[i] = (values[i] - past) / past * 100.0;
        }
    }
    out
}

/// Stochastic oscillator: `%K` over `k_period`, smoothed by `k_smooth`, with
/// `%D` the `d_period`-SMA of smoothed `%K`.
#[derive(Debug, Clone)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic(bars: &[Bar], k_period: usize, k_smooth: usize, d_period: usize) -> Stochastic {
    let highs = decimal_series(bars, |b| b.high);
    let lows = decimal_series(bars, |b| b.low);
    let close = closes(bars);

    let mut raw_k = vec![UNDEFINED; bars.len()];
    for i in (k_period - 1)..bars.len() {
        let window_high = highs[i + 1 - k_period..=i].iter().cloned().fold(f64::MIN, f64::max);
        let window_low = lows[i + 1 - k_period..=i].iter().cloned().fold(f64::MAX, f64::min);
        let range = window_high - window_low;
        raw_k[i] = if range == 0.0 { 50.0 } else { (close[i] - window_low) / range * 100.0 };
    }

    let defined: Vec<f64> = raw_k.iter().copied().filter(|v| !v.is_nan()).collect();
    let smoothed = sma(&defined, k_smooth);
    let mut k = vec![UNDEFINED; bars.len()];
    if let Some(start) = raw_k.iter().position(|v| !v.is_nan()) {
        for (offset, value) in smoothed.into_iter().enumerate() {
            k[start + offset] = value;
        }
    }

    let defined_k: Vec<f64> = k.iter().copied().filter(|v| !v.is_nan()).collect();
    let d_series = sma(&defined_k, d_period);
    let mut d = vec![UNDEFINED; bars.len()];
    if let Some(start) = k.iter().position(|v| !v.is_nan()) {
        for (offset, value) in d_series.into_iter().enumerate() {
            d[start + offset] = value;
        }
    }

    Stochastic { k, d }
}

/// Williams %R(period): an inverted stochastic, ranging `[-100, 0]`.
pub fn williams_r(bars: &[Bar], period: usize) -> Vec<f64> {
    let highs = decimal_series(bars, |b| b.high);
    let lows = decimal_series(bars, |b| b.low);
    let close = closes(bars);
    let mut out = vec![UNDEFINED; bars.len()];
    for i in (period - 1)..bars.len() {
        let window_high = highs[i + 1 - period..=i].iter().cloned().fold(f64::MIN, f64::max);
        let window_low = lows[i + 1 - period..=i].iter().cloned().fold(f64::MAX, f64::min);
        let range = window_high - window_low;
        out[i] = if range == 0.0 { -50.0 } else { (window_high - close[i]) / range * -100.0 };
    }
    out
}

/// Average Directional Index(period), Wilder-smoothed +DI/-DI feeding the
/// DX average.
pub fn adx(bars: &[Bar], period: usize) -> Vec<f64> {
    let highs = decimal_series(bars, |b| b.high);
    let lows = decimal_series(bars, |b| b.low);
    let true_range_input = atr_true_range(bars);

    let mut plus_dm = vec![0.0; bars.len()];
    let mut minus_dm = vec![0.0; bars.len()];
    for i in 1..bars.len() {
        let up_move = highs[i] - highs[i - 1];
        let down_move = lows[i - 1] - lows[i];
        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_tr = wilder_smooth(&true_range_input, period);
    let smoothed_plus = wilder_smooth(&plus_dm, period);
    let smoothed_minus = wilder_smooth(&minus_dm, period);

    let mut dx = vec![UNDEFINED; bars.len()];
    for i in 0..bars.len() {
        if smoothed_tr[i].is_nan() || smoothed_tr[i] == 0.0 {
            continue;
        }
        let plus_di = 100.0 * smoothed_plus[i] / smoothed_tr[i];
        let minus_di = 100.0 * smoothed_minus[i] / smoothed_tr[i];
        let sum = plus_di + minus_di;
        if sum != 0.0 {
            dx[i] = (plus_di - minus_di).abs() / sum * 100.0;
        }
    }

    let defined: Vec<f64> = dx.iter().copied().filter(|v| !v.is_nan()).collect();
    let adx_on_defined = sma(&defined, period);
    let mut out = vec![UNDEFINED; bars.len()];
    if let Some(start) = dx.iter().position(|v| !v.is_nan()) {
        for (offset, value) in adx_on_defined.into_iter().enumerate() {
            out[start + offset] = value;
        }
    }
    out
}

fn atr_true_range(bars: &[Bar]) -> Vec<f64> {
    let highs = decimal_series(bars, |b| b.high);
    let lows = decimal_series(bars, |b| b.low);
    let close = closes(bars);
    (0..bars.len())
        .map(|i| {
            if i == 0 {
                highs[i] - lows[i]
            } else {
                (highs[i] - lows[i])
                    .max((highs[i] - close[i - 1]).abs())
                    .max((lows[i] - close[i - 1]).abs())
            }
        })
        .collect()
}

fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![UNDEFINED; values.len()];
    if values.len() < period {
        return out;
    }
    let seed: f64 = values[..period].iter().sum();
    out[period - 1] = seed;
    let mut prev = seed;
    for i in period..values.len() {
        let next = prev - (prev / period as f64) + values[i];
        out[i] = next;
        prev = next;
    }
    out
}

/// Commodity Channel Index(period): `(typical_price - SMA) / (0.015 * mean
/// absolute deviation)`.
pub fn cci(bars: &[Bar], period: usize) -> Vec<f64> {
    let highs = decimal_series(bars, |b| b.high);
    let lows = decimal_series(bars, |b| b.low);
    let close = closes(bars);
    let typical: Vec<f64> = (0..bars.len()).map(|i| (highs[i] + lows[i] + close[i]) / 3.0).collect();
    let typical_sma = sma(&typical, period);

    let mut out = vec![UNDEFINED; bars.len()];
    for i in 0..bars.len() {
        if typical_sma[i].is_nan() {
            continue;
        }
        let window = &typical[i + 1 - period..=i];
        let mean = typical_sma[i];
        let mean_deviation = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
        out[i] = if mean_deviation == 0.0 {
            0.0
        } else {
            (typical[i] - mean) / (0.015 * mean_deviation)
        };
    }
    out
}

/// Aroon(period): `Up` and `Down` measure bars since the period's high/low.
#[derive(Debug, Clone)]
pub struct Aroon {
    pub up: Vec<f64>,
    pub down: Vec<f64>,
}

pub fn aroon(bars: &[Bar], period: usize) -> Aroon {
    let highs = decimal_series(bars, |b| b.high);
    let lows = decimal_series(bars, |b| b.low);
    let mut up = vec![UNDEFINED; bars.len()];
    let mut down = vec![UNDEFINED; bars.len()];
    for i in period..bars.len() {
        let window_high_idx = (i + 1 - period..=i)
            .max_by(|&a, &b| highs[a].partial_cmp(&highs[b]).unwrap())
            .unwrap();
        let window_low_idx = (i + 1 - period..=i)
            .min_by(|&a, &b| lows[a].partial_cmp(&lows[b]).unwrap())
            .unwrap();
        up[i] = (period - (i - window_high_idx)) as f64 / period as f64 * 100.0;
        down[i] = (period - (i - window_low_idx)) as f64 / period as f64 * 100.0;
    }
    Aroon { up, down }
}

/// Ichimoku Cloud(conversion, base, span_b): conversion and base lines are
/// midpoints of their respective high/low windows; leading spans A/B are
/// plotted `base` periods ahead in charting convention but returned here
/// aligned to the bar they're computed from (no forward shift).
#[derive(Debug, Clone)]
pub struct Ichimoku {
    pub conversion_line: Vec<f64>,
    pub base_line: Vec<f64>,
    pub leading_span_a: Vec<f64>,
    pub leading_span_b: Vec<f64>,
}

pub fn ichimoku(bars: &[Bar], conversion: usize, base: usize, span_b: usize) -> Ichimoku {
    let highs = decimal_series(bars, |b| b.high);
    let lows = decimal_series(bars, |b| b.low);

    let midpoint = |period: usize| -> Vec<f64> {
        let mut out = vec![UNDEFINED; bars.len()];
        for i in (period - 1)..bars.len() {
            let window_high = highs[i + 1 - period..=i].iter().cloned().fold(f64::MIN, f64::max);
            let window_low = lows[i + 1 - period..=i].iter().cloned().fold(f64::MAX, f64::min);
            out[i] = (window_high + window_low) / 2.0;
        }
        out
    };

    let conversion_line = midpoint(conversion);
    let base_line = midpoint(base);
    let leading_span_b = midpoint(span_b);
    let leading_span_a: Vec<f64> = conversion_line
        .iter()
        .zip(base_line.iter())
        .map(|(c, b)| if c.is_nan() || b.is_nan() { UNDEFINED } else { (c + b) / 2.0 })
        .collect();

    Ichimoku { conversion_line, base_line, leading_span_a, leading_span_b }
}

/// The full set of indicator series over a window of bars, computed with
/// the conventional defaults named in §4.C.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub sma_20: Vec<f64>,
    pub ema_20: Vec<f64>,
    pub rsi_14: Vec<f64>,
    pub macd: Macd,
    pub bollinger_20_2: BollingerBands,
    pub atr_14: Vec<f64>,
    pub obv: Vec<f64>,
    pub roc_10: Vec<f64>,
    pub stoch_5_3_3: Stochastic,
    pub williams_r_14: Vec<f64>,
    pub adx_14: Vec<f64>,
    pub cci_14: Vec<f64>,
    pub aroon_14: Aroon,
    pub ichimoku_9_26_52: Ichimoku,
}

/// A single-row snapshot of [`FeatureSet`] at its most recent bar, shaped
/// for feeding a predictor's scaler and model blob (§4.E).
#[derive(Debug, Clone, Copy)]
pub struct Features {
    pub sma_20: f64,
    pub ema_20: f64,
    pub rsi_14: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub atr_14: f64,
    pub obv: f64,
    pub roc_10: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub williams_r_14: f64,
    pub adx_14: f64,
    pub cci_14: f64,
    pub aroon_up: f64,
    pub aroon_down: f64,
    pub ichimoku_conversion: f64,
    pub ichimoku_base: f64,
    pub ichimoku_span_a: f64,
    pub ichimoku_span_b: f64,
}

/// Compute every indicator in §4.C over `bars` with conventional defaults.
/// Pure and stateless: safely callable from many concurrent workers.
pub fn compute_feature_set(bars: &[Bar]) -> FeatureSet {
    let close = closes(bars);
    FeatureSet {
        sma_20: sma(&close, 20),
        ema_20: ema(&close, 20),
        rsi_14: rsi(&close, 14),
        macd: macd(&close, 12, 26, 9),
        bollinger_20_2: bollinger(&close, 20, 2.0),
        atr_14: atr(bars, 14),
        obv: obv(bars),
        roc_10: roc(&close, 10),
        stoch_5_3_3: stochastic(bars, 5, 3, 3),
        williams_r_14: williams_r(bars, 14),
        adx_14: adx(bars, 14),
        cci_14: cci(bars, 14),
        aroon_14: aroon(bars, 14),
        ichimoku_9_26_52: ichimoku(bars, 9, 26, 52),
    }
}

impl FeatureSet {
    /// Snapshot the most recent row as a scalar [`Features`] vector. Any
    /// indicator still in warmup at the last bar surfaces as `NaN`.
    pub fn latest(&self) -> Features {
        let last = |v: &[f64]| v.last().copied().unwrap_or(UNDEFINED);
        Features {
            sma_20: last(&self.sma_20),
            ema_20: last(&self.ema_20),
            rsi_14: last(&self.rsi_14),
            macd_line: last(&self.macd.macd_line),
            macd_signal: last(&self.macd.signal_line),
            macd_histogram: last(&self.macd.histogram),
            bollinger_upper: last(&self.bollinger_20_2.upper),
            bollinger_middle: last(&self.bollinger_20_2.middle),
            bollinger_lower: last(&self.bollinger_20_2.lower),
            atr_14: last(&self.atr_14),
            obv: last(&self.obv),
            roc_10: last(&self.roc_10),
            stoch_k: last(&self.stoch_5_3_3.k),
            stoch_d: last(&self.stoch_5_3_3.d),
            williams_r_14: last(&self.williams_r_14),
            adx_14: last(&self.adx_14),
            cci_14: last(&self.cci_14),
            aroon_up: last(&self.aroon_14.up),
            aroon_down: last(&self.aroon_14.down),
            ichimoku_conversion: last(&self.ichimoku_9_26_52.conversion_line),
            ichimoku_base: last(&self.ichimoku_9_26_52.base_line),
            ichimoku_span_a: last(&self.ichimoku_9_26_52.leading_span_a),
            ichimoku_span_b: last(&self.ichimoku_9_26_52.leading_span_b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use tradecore_instrument::symbol::ProviderId;
    use tradecore_instrument::{Symbol, Timeframe};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc::now();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                symbol: Symbol::from("AAPL"),
                timeframe: Timeframe::D1,
                ts: t0 + Duration::days(i as i64),
                open: rust_decimal::Decimal::try_from(c).unwrap(),
                high: rust_decimal::Decimal::try_from(c + 1.0).unwrap(),
                low: rust_decimal::Decimal::try_from(c - 1.0).unwrap(),
                close: rust_decimal::Decimal::try_from(c).unwrap(),
                volume: dec!(1000),
                source: ProviderId::Mock,
                received_at: t0,
            })
            .collect()
    }

    #[test]
    fn sma_warms_up_then_tracks_average() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&values, 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(out[4], 4.0);
    }

    #[test]
    fn ema_seeds_with_sma_then_recurses() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = ema(&values, 3);
        assert!(out[0].is_nan());
        assert_eq!(out[2], 2.0);
        assert!(out[4] > out[2]);
    }

    #[test]
    fn rsi_is_100_when_no_losses_in_window() {
        let values: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let out = rsi(&values, 14);
        assert_eq!(out[14], 100.0);
    }

    #[test]
    fn compute_feature_set_produces_defined_latest_row_given_enough_bars() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.1).sin() * 5.0 + i as f64 * 0.05).collect();
        let bars = bars(&closes);
        let features = compute_feature_set(&bars);
        let latest = features.latest();
        assert!(!latest.sma_20.is_nan());
        assert!(!latest.rsi_14.is_nan());
        assert!(!latest.macd_histogram.is_nan());
    }

    #[test]
    fn obv_is_defined_from_the_first_bar_with_no_warmup() {
        let bars = bars(&[1.0, 2.0, 1.0, 3.0]);
        let out = obv(&bars);
        assert!(!out.iter().any(|v| v.is_nan()));
    }
}
