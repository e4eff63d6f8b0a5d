use crate::order::{ExecutionStrategy, Order, OrderType, TimeInForce};
use rust_decimal::Decimal;
use std::time::Duration;
use tradecore_instrument::{PortfolioId, Side, Symbol};

/// A single decomposed child of a parent order (§4.I): `market`/`limit`
/// children only, scheduled relative to the parent's `t0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildSpec {
    pub qty: Decimal,
    pub submit_after: Duration,
    pub limit_price: Option<Decimal>,
}

/// Decompose a parent order's strategy into its child schedule (§4.I). Pure
/// and non-mutating: callers submit each [`ChildSpec`] as its `submit_after`
/// elapses, tracking live children and cancellation themselves (the
/// per-order engine, not this function, owns that state).
pub fn decompose(strategy: &ExecutionStrategy, qty: Decimal) -> Vec<ChildSpec> {
    match strategy {
        ExecutionStrategy::Market | ExecutionStrategy::Limit => {
            vec![ChildSpec { qty, submit_after: Duration::ZERO, limit_price: None }]
        }
        ExecutionStrategy::Twap { duration_secs, interval_secs } => {
            twap_slices(qty, *duration_secs, *interval_secs)
        }
        ExecutionStrategy::Vwap { duration_secs, interval_secs, volume_profile } => match volume_profile {
            Some(profile) if !profile.is_empty() => vwap_slices(qty, *interval_secs, profile),
            _ => twap_slices(qty, *duration_secs, *interval_secs),
        },
        // Iceberg and POV are adaptive (the next child depends on fills/volume
        // observed at runtime), so they don't have a static schedule; the
        // engine computes each child just-in-time via `next_iceberg_child`/
        // `next_pov_child`.
        ExecutionStrategy::Iceberg { .. } | ExecutionStrategy::Pov { .. } => Vec::new(),
    }
}

/// Split `qty` into `ceil(duration/interval)` equal slices, one every
/// `interval` starting at `t0` (§4.I).
fn twap_slices(qty: Decimal, duration_secs: u64, interval_secs: u64) -> Vec<ChildSpec> {
    let interval_secs = interval_secs.max(1);
    let slice_count = duration_secs.div_ceil(interval_secs).max(1);
    let each = qty / Decimal::from(slice_count);
    let mut slices = vec![ChildSpec { qty: each, submit_after: Duration::ZERO, limit_price: None }; slice_count as usize];
    for (i, slice) in slices.iter_mut().enumerate() {
        slice.submit_after = Duration::from_secs(interval_secs * i as u64);
    }
    // Rounding remainder goes to the last slice so Σ child qty == parent qty.
    let allocated: Decimal = slices.iter().map(|s| s.qty).sum();
    if let Some(last) = slices.last_mut() {
        last.qty += qty - allocated;
    }
    slices
}

/// Split `qty` across a supplied volume profile: each slice is
/// `qty * profile[i] / Σprofile`, one per `interval` (§4.I).
fn vwap_slices(qty: Decimal, interval_secs: u64, profile: &[Decimal]) -> Vec<ChildSpec> {
    let interval_secs = interval_secs.max(1);
    let total: Decimal = profile.iter().sum();
    if total.is_zero() {
        return twap_slices(qty, interval_secs * profile.len() as u64, interval_secs);
    }
    let mut slices: Vec<ChildSpec> = profile
        .iter()
        .enumerate()
        .map(|(i, weight)| ChildSpec {
            qty: qty * weight / total,
            submit_after: Duration::from_secs(interval_secs * i as u64),
            limit_price: None,
        })
        .collect();
    let allocated: Decimal = slices.iter().map(|s| s.qty).sum();
    if let Some(last) = slices.last_mut() {
        last.qty += qty - allocated;
    }
    slices
}

/// Iceberg's next child (§4.I): at most `display_size` live at once; call
/// again once the live child terminates to submit the next slice.
pub fn next_iceberg_child(remaining_qty: Decimal, display_size: Decimal, limit_price: Decimal) -> Option<ChildSpec> {
    if remaining_qty <= Decimal::ZERO {
        return None;
    }
    let qty = remaining_qty.min(display_size);
    Some(ChildSpec { qty, submit_after: Duration::ZERO, limit_price: Some(limit_price) })
}

/// POV's next child (§4.I): `pov_target · Δvolume − already_filled_this_interval`,
/// clamped to `≥ 0` and to whatever remains of the parent.
pub fn next_pov_child(pov_target: f64, delta_volume: Decimal, already_filled_this_interval: Decimal, remaining_qty: Decimal) -> Decimal {
    let target = delta_volume * Decimal::try_from(pov_target).unwrap_or(Decimal::ZERO);
    let qty = (target - already_filled_this_interval).max(Decimal::ZERO);
    qty.min(remaining_qty)
}

/// Build the parent/child [`Order`] pair for a decomposed strategy slice:
/// the child inherits portfolio/symbol/side/type/tif from the parent and is
/// always `market` unless a limit price is supplied (§4.I).
pub fn child_order(parent: &Order, portfolio_id: PortfolioId, symbol: Symbol, side: Side, spec: &ChildSpec) -> Order {
    let order_type = if spec.limit_price.is_some() { OrderType::Limit } else { OrderType::Market };
    let mut child = Order::new(portfolio_id, symbol, side, order_type, spec.qty, parent.tif, ExecutionStrategy::Market);
    child.parent_id = Some(parent.id);
    child.limit_price = spec.limit_price;
    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn twap_splits_into_equal_slices_summing_to_parent_qty() {
        let slices = decompose(&ExecutionStrategy::Twap { duration_secs: 300, interval_secs: 100 }, dec!(100));
        assert_eq!(slices.len(), 3);
        let total: Decimal = slices.iter().map(|s| s.qty).sum();
        assert_eq!(total, dec!(100));
        assert_eq!(slices[1].submit_after, Duration::from_secs(100));
    }

    #[test]
    fn twap_remainder_lands_on_last_slice() {
        let slices = decompose(&ExecutionStrategy::Twap { duration_secs: 300, interval_secs: 100 }, dec!(10));
        let total: Decimal = slices.iter().map(|s| s.qty).sum();
        assert_eq!(total, dec!(10));
    }

    #[test]
    fn vwap_with_no_profile_falls_back_to_twap() {
        let vwap = decompose(&ExecutionStrategy::Vwap { duration_secs: 300, interval_secs: 100, volume_profile: None }, dec!(90));
        let twap = decompose(&ExecutionStrategy::Twap { duration_secs: 300, interval_secs: 100 }, dec!(90));
        assert_eq!(vwap, twap);
    }

    #[test]
    fn vwap_weights_slices_by_profile() {
        let slices = decompose(
            &ExecutionStrategy::Vwap { duration_secs: 0, interval_secs: 60, volume_profile: Some(vec![dec!(1), dec!(3)]) },
            dec!(100),
        );
        assert_eq!(slices[0].qty, dec!(25));
        assert_eq!(slices[1].qty, dec!(75));
    }

    #[test]
    fn iceberg_caps_live_child_at_display_size() {
        let child = next_iceberg_child(dec!(500), dec!(100), dec!(150)).unwrap();
        assert_eq!(child.qty, dec!(100));
        let last = next_iceberg_child(dec!(50), dec!(100), dec!(150)).unwrap();
        assert_eq!(last.qty, dec!(50));
        assert!(next_iceberg_child(dec!(0), dec!(100), dec!(150)).is_none());
    }

    #[test]
    fn pov_clamps_to_zero_and_remaining_qty() {
        let qty = next_pov_child(0.1, dec!(1000), dec!(90), dec!(1000));
        assert_eq!(qty, dec!(10));
        let clamped = next_pov_child(0.1, dec!(100), dec!(50), dec!(1000));
        assert_eq!(clamped, Decimal::ZERO);
        let capped = next_pov_child(0.5, dec!(1000), dec!(0), dec!(100));
        assert_eq!(capped, dec!(100));
    }
}
