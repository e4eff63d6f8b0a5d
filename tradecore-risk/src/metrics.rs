//! Return-series risk metrics (§4.G). Every function takes a return series
//! `r[]` (fractional, e.g. `0.012` for +1.2%) and is pure — no shared state,
//! safe to call from anywhere. Formulas and the `floor`-style tail index are
//! confirmed verbatim against
//! `original_source/backend/risk_service/risk_calculator.py`.

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (`ddof=0`, matching `numpy.std`'s default).
fn population_stdev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn sorted_ascending(r: &[f64]) -> Vec<f64> {
    let mut sorted = r.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    sorted
}

/// `index = floor(n * (1 - confidence_level))`, shared by VaR/CVaR/ES so the
/// tail boundary can't drift between them.
fn tail_index(n: usize, confidence_level: f64) -> usize {
    ((n as f64) * (1.0 - confidence_level)) as usize
}

/// Value at Risk: `-sort(r)[floor((1-alpha)*n)]`.
pub fn value_at_risk(r: &[f64], confidence_level: f64) -> f64 {
    if r.is_empty() {
        return 0.0;
    }
    let sorted = sorted_ascending(r);
    let index = tail_index(sorted.len(), confidence_level).min(sorted.len() - 1);
    -sorted[index]
}

/// Conditional Value at Risk: mean of the tail losses below the VaR index.
/// `>= VaR` by construction (it's an average over losses at least as bad).
pub fn conditional_value_at_risk(r: &[f64], confidence_level: f64) -> f64 {
    if r.is_empty() {
        return 0.0;
    }
    let sorted = sorted_ascending(r);
    let index = tail_index(sorted.len(), confidence_level).min(sorted.len());
    if index == 0 {
        return -sorted[0];
    }
    -mean(&sorted[..index])
}

/// Synonym for [`conditional_value_at_risk`] (§4.G: "Expected Shortfall:
/// synonym for CVaR; same computation").
pub fn expected_shortfall(r: &[f64], confidence_level: f64) -> f64 {
    conditional_value_at_risk(r, confidence_level)
}

/// `mean(r - rf) / stdev(r - rf)`, optionally annualized by `sqrt(periods)`.
pub fn sharpe_ratio(r: &[f64], risk_free_rate: f64, annualization_periods: Option<f64>) -> f64 {
    let excess: Vec<f64> = r.iter().map(|v| v - risk_free_rate).collect();
    let stdev = population_stdev(&excess);
    let raw = if stdev == 0.0 { 0.0 } else { mean(&excess) / stdev };
    match annualization_periods {
        Some(periods) => raw * periods.sqrt(),
        None => raw,
    }
}

/// `mean(r - rf) / stdev(min(r - rf, 0))`. Falls back to a small epsilon
/// downside deviation when there are no down periods, matching the source's
/// guard against division by zero.
pub fn sortino_ratio(r: &[f64], risk_free_rate: f64, annualization_periods: Option<f64>) -> f64 {
    let excess: Vec<f64> = r.iter().map(|v| v - risk_free_rate).collect();
    let downside: Vec<f64> = excess.iter().copied().filter(|v| *v < 0.0).collect();
    let downside_deviation = if downside.is_empty() { 0.0001 } else { population_stdev(&downside) };
    let raw = mean(&excess) / downside_deviation;
    match annualization_periods {
        Some(periods) => raw * periods.sqrt(),
        None => raw,
    }
}

/// `max_t (running_max(c)[t] - c[t]) / running_max(c)[t]` where `c` is the
/// cumulative-return curve `cumprod(1 + r)`.
pub fn max_drawdown(r: &[f64]) -> f64 {
    if r.is_empty() {
        return 0.0;
    }
    let mut cumulative = 1.0;
    let mut running_max = f64::MIN;
    let mut worst = 0.0;
    for &ret in r {
        cumulative *= 1.0 + ret;
        running_max = running_max.max(cumulative);
        if running_max > 0.0 {
            let drawdown = (running_max - cumulative) / running_max;
            worst = worst.max(drawdown);
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_returns() -> Vec<f64> {
        vec![0.02, -0.01, 0.03, -0.05, 0.01, 0.015, -0.02, 0.005, -0.01, 0.04]
    }

    #[test]
    fn cvar_is_at_least_var() {
        let r = sample_returns();
        let var = value_at_risk(&r, 0.95);
        let cvar = conditional_value_at_risk(&r, 0.95);
        assert!(cvar >= var - 1e-9);
    }

    #[test]
    fn expected_shortfall_matches_cvar() {
        let r = sample_returns();
        assert_eq!(expected_shortfall(&r, 0.9), conditional_value_at_risk(&r, 0.9));
    }

    #[test]
    fn max_drawdown_is_nonnegative_and_bounded() {
        let r = vec![0.1, -0.2, 0.05, -0.3, 0.5];
        let dd = max_drawdown(&r);
        assert!(dd >= 0.0 && dd <= 1.0);
    }

    #[test]
    fn sortino_uses_epsilon_when_no_downside() {
        let r = vec![0.01, 0.02, 0.015];
        let sortino = sortino_ratio(&r, 0.0, None);
        assert!(sortino.is_finite());
    }
}
