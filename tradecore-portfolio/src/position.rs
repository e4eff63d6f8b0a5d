use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tradecore_instrument::Symbol;

/// `{symbol, quantity, avg_cost, realized_pl, last_mark, opened_at,
/// updated_at}` per §3. `quantity` is signed: negative means short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    pub realized_pl: Decimal,
    pub last_mark: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn flat(symbol: Symbol, ts: DateTime<Utc>) -> Self {
        Self {
            symbol,
            quantity: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
            realized_pl: Decimal::ZERO,
            last_mark: None,
            opened_at: ts,
            updated_at: ts,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn market_value(&self) -> Decimal {
        self.quantity * self.last_mark.unwrap_or(self.avg_cost)
    }

    /// Fold a signed fill quantity (positive = buy, negative = sell) at
    /// `price` into this position (§4.F): weighted-average cost when the
    /// fill adds to the existing direction, realized P/L taken at the
    /// current `avg_cost` when it reduces or reverses it.
    pub fn apply_fill(&mut self, signed_qty: Decimal, price: Decimal, ts: DateTime<Utc>) {
        let same_direction = self.quantity.is_zero()
            || (self.quantity.is_sign_positive() && signed_qty.is_sign_positive())
            || (self.quantity.is_sign_negative() && signed_qty.is_sign_negative());

        if same_direction {
            let new_quantity = self.quantity + signed_qty;
            if !new_quantity.is_zero() {
                self.avg_cost = ((self.avg_cost * self.quantity) + (price * signed_qty)) / new_quantity;
            }
            self.quantity = new_quantity;
        } else {
            let closing_qty = signed_qty.abs().min(self.quantity.abs());
            let realized = closing_qty * (price - self.avg_cost) * self.quantity.signum();
            self.realized_pl += realized;
            self.quantity += signed_qty;

            // The fill crossed through flat into the opposite direction:
            // whatever remains opens a fresh position at this fill's price.
            if self.quantity.signum() != Decimal::ZERO && self.quantity.signum() == signed_qty.signum() {
                self.avg_cost = price;
            } else if self.quantity.is_zero() {
                self.avg_cost = Decimal::ZERO;
            }
        }
        self.updated_at = ts;
    }

    pub fn mark(&mut self, price: Decimal, ts: DateTime<Utc>) {
        self.last_mark = Some(price);
        self.updated_at = ts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn apply_fill_adds_with_weighted_average_cost() {
        let mut pos = Position::flat(Symbol::from("AAPL"), now());
        pos.apply_fill(dec!(100), dec!(150), now());
        pos.apply_fill(dec!(50), dec!(160), now());
        assert_eq!(pos.quantity, dec!(150));
        // (100*150 + 50*160) / 150 = 153.333...
        assert_eq!(pos.avg_cost, dec!(153.3333333333333333333333333));
    }

    #[test]
    fn apply_fill_realizes_pl_on_reduction() {
        let mut pos = Position::flat(Symbol::from("AAPL"), now());
        pos.apply_fill(dec!(100), dec!(150), now());
        pos.apply_fill(dec!(-40), dec!(160), now());
        assert_eq!(pos.quantity, dec!(60));
        assert_eq!(pos.realized_pl, dec!(400));
        assert_eq!(pos.avg_cost, dec!(150));
    }

    #[test]
    fn apply_fill_reversing_through_flat_opens_fresh_position() {
        let mut pos = Position::flat(Symbol::from("AAPL"), now());
        pos.apply_fill(dec!(100), dec!(150), now());
        pos.apply_fill(dec!(-150), dec!(160), now());
        assert_eq!(pos.quantity, dec!(-50));
        assert_eq!(pos.avg_cost, dec!(160));
        assert_eq!(pos.realized_pl, dec!(1000));
    }
}
