use chrono::{DateTime, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tradecore_instrument::{OrderId, PortfolioId, Side, Symbol};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
}

/// How a parent order's `qty` is decomposed into child orders (§4.I).
/// `Market`/`Limit` are single-child; the rest schedule a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Market,
    Limit,
    Twap { duration_secs: u64, interval_secs: u64 },
    Vwap { duration_secs: u64, interval_secs: u64, volume_profile: Option<Vec<Decimal>> },
    Iceberg { display_size: Decimal, limit_price: Decimal },
    Pov { pov_target: f64, duration_secs: u64, interval_secs: u64 },
}

/// `status` per §4.H's transition table. `Cancelling` sits between the
/// active states and `Cancelled` so a fill racing a cancel request can
/// still land on `PartiallyFilled`/`Filled` instead of being dropped.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartiallyFilled,
    Cancelling,
    Filled,
    Cancelled,
    Rejected,
    Expired,
    Error,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired | OrderStatus::Error
        )
    }
}

/// `{id, parent_id?, portfolio_id, symbol, side, type, qty, limit_price?,
/// stop_price?, tif, strategy, strategy_params, status, filled_qty,
/// avg_fill_price?, broker_id?, broker_order_id?, created_at, submitted_at?,
/// terminal_at?, error?}` per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub parent_id: Option<OrderId>,
    pub portfolio_id: PortfolioId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub tif: TimeInForce,
    pub strategy: ExecutionStrategy,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub broker_id: Option<String>,
    pub broker_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Deduplicated `broker_exec_id`s already folded into `filled_qty`,
    /// per §4.H's `Fill` dedup requirement.
    pub applied_fills: Vec<String>,
}

impl Order {
    pub fn new(
        portfolio_id: PortfolioId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        qty: Decimal,
        tif: TimeInForce,
        strategy: ExecutionStrategy,
    ) -> Self {
        Self {
            id: OrderId::random(),
            parent_id: None,
            portfolio_id,
            symbol,
            side,
            order_type,
            qty,
            limit_price: None,
            stop_price: None,
            tif,
            strategy,
            status: OrderStatus::Pending,
            filled_qty: Decimal::ZERO,
            avg_fill_price: None,
            broker_id: None,
            broker_order_id: None,
            created_at: Utc::now(),
            submitted_at: None,
            terminal_at: None,
            error: None,
            applied_fills: Vec::new(),
        }
    }

    pub fn remaining_qty(&self) -> Decimal {
        self.qty - self.filled_qty
    }

    /// `idempotency_key = order.id` (§4.H): the value adapters dedupe
    /// `Submit` retries against.
    pub fn idempotency_key(&self) -> String {
        self.id.to_string()
    }

    fn set_terminal(&mut self, status: OrderStatus, ts: DateTime<Utc>) {
        self.status = status;
        self.terminal_at = Some(ts);
    }

    /// `Submit` transition (§4.H): `Pending -[risk gate passes]-> Submitted`
    /// or `Pending -[risk gate fails]-> Rejected`.
    pub fn submit(&mut self, risk_passed: bool, rejection_reason: Option<String>, ts: DateTime<Utc>) -> Result<(), super::error::ExecutionError> {
        if self.status != OrderStatus::Pending {
            return Err(invalid(self, "Submit"));
        }
        if risk_passed {
            self.status = OrderStatus::Submitted;
            self.submitted_at = Some(ts);
        } else {
            self.error = rejection_reason;
            self.set_terminal(OrderStatus::Rejected, ts);
        }
        Ok(())
    }

    pub fn broker_ack(&mut self, broker_order_id: String) -> Result<(), super::error::ExecutionError> {
        if self.status != OrderStatus::Submitted {
            return Err(invalid(self, "BrokerAck"));
        }
        self.broker_order_id = Some(broker_order_id);
        Ok(())
    }

    /// `Fill(q,p)` transition. Deduplicates by `broker_exec_id`; updates
    /// `filled_qty` monotonically and `avg_fill_price` as a running
    /// weighted average; a fill completing `qty` transitions to `Filled`
    /// even from `Cancelling` (the broker-race case in the transition
    /// table).
    pub fn apply_fill(&mut self, broker_exec_id: &str, qty: Decimal, price: Decimal, ts: DateTime<Utc>) -> Result<(), super::error::ExecutionError> {
        if self.status.is_terminal() {
            return Err(invalid(self, "Fill"));
        }
        if !matches!(self.status, OrderStatus::Submitted | OrderStatus::PartiallyFilled | OrderStatus::Cancelling) {
            return Err(invalid(self, "Fill"));
        }
        if self.applied_fills.iter().any(|id| id == broker_exec_id) {
            return Ok(()); // already applied; broker retried the event
        }
        let qty = qty.min(self.remaining_qty());
        if qty <= Decimal::ZERO {
            return Ok(());
        }

        let prior_notional = self.avg_fill_price.unwrap_or(Decimal::ZERO) * self.filled_qty;
        self.filled_qty += qty;
        self.avg_fill_price = Some((prior_notional + price * qty) / self.filled_qty);
        self.applied_fills.push(broker_exec_id.to_string());

        if self.filled_qty >= self.qty {
            self.set_terminal(OrderStatus::Filled, ts);
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
        Ok(())
    }

    /// `CancelRequest` transition: any non-terminal, non-pending order may
    /// move to `Cancelling`.
    pub fn request_cancel(&mut self) -> Result<(), super::error::ExecutionError> {
        if self.status.is_terminal() || self.status == OrderStatus::Pending {
            return Err(invalid(self, "CancelRequest"));
        }
        self.status = OrderStatus::Cancelling;
        Ok(())
    }

    pub fn cancel_ack(&mut self, ts: DateTime<Utc>) -> Result<(), super::error::ExecutionError> {
        if self.status != OrderStatus::Cancelling {
            return Err(invalid(self, "CancelAck"));
        }
        self.set_terminal(OrderStatus::Cancelled, ts);
        Ok(())
    }

    pub fn expire(&mut self, ts: DateTime<Utc>) -> Result<(), super::error::ExecutionError> {
        if self.status.is_terminal() {
            return Err(invalid(self, "Timeout"));
        }
        self.set_terminal(OrderStatus::Expired, ts);
        Ok(())
    }

    pub fn broker_error(&mut self, reason: String, ts: DateTime<Utc>) -> Result<(), super::error::ExecutionError> {
        if self.status.is_terminal() {
            return Err(invalid(self, "BrokerError"));
        }
        self.error = Some(reason);
        self.set_terminal(OrderStatus::Error, ts);
        Ok(())
    }
}

fn invalid(order: &Order, event: &str) -> super::error::ExecutionError {
    super::error::ExecutionError::InvalidTransition {
        order: order.id,
        event: event.to_string(),
        from: order.status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tradecore_instrument::Currency;

    fn order() -> Order {
        let _ = Currency::Usd;
        Order::new(
            PortfolioId::random(),
            Symbol::from("AAPL"),
            Side::Buy,
            OrderType::Market,
            dec!(100),
            TimeInForce::Day,
            ExecutionStrategy::Market,
        )
    }

    #[test]
    fn submit_passes_risk_gate_to_submitted() {
        let mut o = order();
        o.submit(true, None, Utc::now()).unwrap();
        assert_eq!(o.status, OrderStatus::Submitted);
    }

    #[test]
    fn submit_failing_risk_gate_is_rejected() {
        let mut o = order();
        o.submit(false, Some("leverage breach".into()), Utc::now()).unwrap();
        assert_eq!(o.status, OrderStatus::Rejected);
        assert_eq!(o.error.as_deref(), Some("leverage breach"));
    }

    #[test]
    fn partial_fills_accumulate_weighted_average_price() {
        let mut o = order();
        o.submit(true, None, Utc::now()).unwrap();
        o.apply_fill("exec-1", dec!(40), dec!(100), Utc::now()).unwrap();
        assert_eq!(o.status, OrderStatus::PartiallyFilled);
        o.apply_fill("exec-2", dec!(60), dec!(110), Utc::now()).unwrap();
        assert_eq!(o.status, OrderStatus::Filled);
        assert_eq!(o.filled_qty, dec!(100));
        // (40*100 + 60*110) / 100 = 106
        assert_eq!(o.avg_fill_price, Some(dec!(106)));
    }

    #[test]
    fn duplicate_broker_exec_id_is_ignored() {
        let mut o = order();
        o.submit(true, None, Utc::now()).unwrap();
        o.apply_fill("exec-1", dec!(40), dec!(100), Utc::now()).unwrap();
        o.apply_fill("exec-1", dec!(40), dec!(100), Utc::now()).unwrap();
        assert_eq!(o.filled_qty, dec!(40));
    }

    #[test]
    fn fill_never_exceeds_remaining_qty() {
        let mut o = order();
        o.submit(true, None, Utc::now()).unwrap();
        o.apply_fill("exec-1", dec!(150), dec!(100), Utc::now()).unwrap();
        assert_eq!(o.filled_qty, dec!(100));
        assert_eq!(o.status, OrderStatus::Filled);
    }

    #[test]
    fn cancel_ack_requires_cancelling_state() {
        let mut o = order();
        assert!(o.cancel_ack(Utc::now()).is_err());
        o.submit(true, None, Utc::now()).unwrap();
        o.request_cancel().unwrap();
        o.cancel_ack(Utc::now()).unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
    }

    #[test]
    fn fill_can_race_ahead_of_cancel_ack() {
        let mut o = order();
        o.submit(true, None, Utc::now()).unwrap();
        o.request_cancel().unwrap();
        o.apply_fill("exec-1", dec!(100), dec!(100), Utc::now()).unwrap();
        assert_eq!(o.status, OrderStatus::Filled);
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let mut o = order();
        o.submit(true, None, Utc::now()).unwrap();
        o.apply_fill("exec-1", dec!(100), dec!(100), Utc::now()).unwrap();
        assert!(o.apply_fill("exec-2", dec!(1), dec!(100), Utc::now()).is_err());
        assert!(o.request_cancel().is_err());
    }
}
