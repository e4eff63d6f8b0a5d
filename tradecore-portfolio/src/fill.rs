use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tradecore_instrument::{OrderId, Side, Symbol};

/// An immutable execution applied against a [`crate::Portfolio`] (§3's
/// `Execution`/`Fill`): `{id, order_id, symbol, side, qty, price, ts,
/// venue?, broker_exec_id, fees?, commission?}`. `qty` is always positive;
/// `side` carries the sign applied to the position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: uuid::Uuid,
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub ts: DateTime<Utc>,
    pub venue: Option<String>,
    pub broker_exec_id: String,
    pub fees: Option<Decimal>,
    pub commission: Option<Decimal>,
}

impl Fill {
    /// The signed quantity to fold into a [`crate::Position`]: positive for
    /// a buy, negative for a sell.
    pub fn signed_qty(&self) -> Decimal {
        self.qty * Decimal::from(self.side.sign())
    }

    pub fn gross_cost(&self) -> Decimal {
        self.qty * self.price + self.fees.unwrap_or(Decimal::ZERO) + self.commission.unwrap_or(Decimal::ZERO)
    }
}
