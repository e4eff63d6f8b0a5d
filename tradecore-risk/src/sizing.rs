use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Kelly-variant position sizing (§4.G), confirmed verbatim against
/// `original_source/backend/risk_service/position_sizing.py`:
/// `adjusted_signal = 0.5 + 0.5 * signal_strength`,
/// `edge = adjusted_signal - 0.5`,
/// `f* = clamp((edge / volatility) * risk_tolerance, 0.01, 0.5)`.
pub fn kelly_fraction(signal_strength: Decimal, volatility: Decimal, risk_tolerance: Decimal) -> Decimal {
    if volatility.is_zero() {
        return dec!(0.01);
    }
    let adjusted_signal = dec!(0.5) + dec!(0.5) * signal_strength;
    let edge = adjusted_signal - dec!(0.5);
    let raw = (edge / volatility) * risk_tolerance;
    raw.clamp(dec!(0.01), dec!(0.5))
}

/// Translate a Kelly fraction into whole shares: `floor(portfolio_value *
/// f* / price)`.
pub fn shares_from_fraction(portfolio_value: Decimal, fraction: Decimal, price: Decimal) -> u64 {
    if price.is_zero() {
        return 0;
    }
    let shares = (portfolio_value * fraction / price).floor();
    shares.to_u64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn kelly_fraction_clamps_to_minimum_for_weak_signal() {
        let f = kelly_fraction(dec!(0.0), dec!(0.2), dec!(1.0));
        assert_eq!(f, dec!(0.01));
    }

    #[test]
    fn kelly_fraction_clamps_to_maximum_for_strong_signal_low_volatility() {
        let f = kelly_fraction(dec!(1.0), dec!(0.01), dec!(1.0));
        assert_eq!(f, dec!(0.5));
    }

    #[test]
    fn kelly_fraction_matches_hand_computed_midpoint() {
        // adjusted_signal = 0.5 + 0.5*0.4 = 0.7, edge = 0.2
        // f* = (0.2 / 0.25) * 0.5 = 0.4
        let f = kelly_fraction(dec!(0.4), dec!(0.25), dec!(0.5));
        assert_eq!(f, dec!(0.4));
    }

    #[test]
    fn shares_from_fraction_floors_to_whole_shares() {
        let shares = shares_from_fraction(dec!(10_000), dec!(0.3), dec!(29.99));
        assert_eq!(shares, 100);
    }
}
