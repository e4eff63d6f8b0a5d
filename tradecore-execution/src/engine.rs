use crate::broker::{BrokerAdapter, BrokerEvent, PollStatus};
use crate::error::ExecutionError;
use crate::order::Order;
use crate::strategy;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tradecore_audit::{AuditLog, NewAuditRecord};
use tradecore_instrument::OrderId;
use tradecore_integration::snapshot::Snapshot;
use tradecore_integration::Unrecoverable;

/// Reconciliation poll cadence for `Submitted` orders the adapter couldn't
/// immediately confirm (§4.H): every 5s, up to a 10 minute window.
pub const RECONCILE_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const RECONCILE_WINDOW: Duration = Duration::from_secs(600);

/// Owns every live [`Order`] behind its own lock (one single-worker event
/// queue per order, per §5's "per-order event queue processed by a single
/// worker at a time"), dispatches broker events by `idempotency_key`, and
/// runs the reconciliation poll for orders whose `Submit` outcome the
/// adapter couldn't confirm.
pub struct OrderEngine {
    orders: AsyncMutex<HashMap<OrderId, Arc<AsyncMutex<Order>>>>,
    broker: Arc<dyn BrokerAdapter>,
    audit: Arc<dyn AuditLog>,
}

impl OrderEngine {
    pub fn new(broker: Arc<dyn BrokerAdapter>, audit: Arc<dyn AuditLog>) -> Self {
        Self { orders: AsyncMutex::new(HashMap::new()), broker, audit }
    }

    fn stream(order_id: OrderId) -> String {
        format!("order-{}", order_id.0)
    }

    async fn handle(&self, order_id: OrderId) -> Result<Arc<AsyncMutex<Order>>, ExecutionError> {
        self.orders.lock().await.get(&order_id).cloned().ok_or(ExecutionError::NotFound(order_id))
    }

    /// `Submit` (§4.H): records the order, transitions `Pending` ->
    /// `Submitted`/`Rejected` per the risk-gate outcome decided by the
    /// caller. `Market`/`Limit` orders submit directly to the broker under
    /// their idempotency key here; orders using a scheduled strategy
    /// (`Twap`/`Vwap`/`Iceberg`/`Pov`) are only recorded — their children
    /// are what actually reach the broker, one at a time, via
    /// [`Self::run_strategy`].
    pub async fn submit_order(&self, mut order: Order, risk_passed: bool, rejection_reason: Option<String>) -> Result<Snapshot<Order>, ExecutionError> {
        let now = Utc::now();
        order.submit(risk_passed, rejection_reason, now)?;
        let id = order.id;

        self.audit
            .append(
                &Self::stream(id),
                NewAuditRecord::new("system", "submit", "order", id.to_string())
                    .with_new_values(json!({"status": order.status.to_string(), "qty": order.qty.to_string()})),
            )
            .await?;

        let submits_directly = matches!(order.strategy, crate::order::ExecutionStrategy::Market | crate::order::ExecutionStrategy::Limit);
        if order.status == crate::order::OrderStatus::Submitted && submits_directly {
            match self
                .broker
                .submit(&order.idempotency_key(), order.symbol.as_str(), order.side, order.qty, order.order_type, order.limit_price, order.tif)
                .await
            {
                Ok(broker_order_id) => {
                    order.broker_id = Some(self.broker.id().to_string());
                    order.broker_ack(broker_order_id)?;
                }
                Err(err) if err.is_unrecoverable() => {
                    order.broker_error(err.to_string(), Utc::now())?;
                }
                Err(err) => {
                    warn!(%err, order_id = %id, "broker submit indeterminate, will reconcile");
                }
            }
        }

        let snapshot = Snapshot(order.clone());
        self.orders.lock().await.insert(id, Arc::new(AsyncMutex::new(order)));
        Ok(snapshot)
    }

    /// Decompose `parent`'s strategy and submit each child in turn on its
    /// own schedule (§4.I). Cancelling the parent mid-schedule stops further
    /// children from being submitted.
    pub async fn run_strategy(self: &Arc<Self>, parent_id: OrderId) -> Result<(), ExecutionError> {
        let handle = self.handle(parent_id).await?;
        let (strategy, portfolio_id, symbol, side, qty) = {
            let order = handle.lock().await;
            (order.strategy.clone(), order.portfolio_id, order.symbol.clone(), order.side, order.qty)
        };

        for spec in strategy::decompose(&strategy, qty) {
            tokio::time::sleep(spec.submit_after).await;
            let still_active = {
                let order = handle.lock().await;
                !order.status.is_terminal() && order.status != crate::order::OrderStatus::Cancelling
            };
            if !still_active {
                info!(%parent_id, "parent cancelled or terminal, stopping strategy schedule");
                break;
            }
            let child = {
                let order = handle.lock().await;
                strategy::child_order(&order, portfolio_id, symbol.clone(), side, &spec)
            };
            self.submit_order(child, true, None).await?;
        }
        Ok(())
    }

    /// `CancelRequest` (§4.H). Propagates to the broker if a
    /// `broker_order_id` has been assigned.
    pub async fn request_cancel(&self, order_id: OrderId) -> Result<(), ExecutionError> {
        let handle = self.handle(order_id).await?;
        let broker_order_id = {
            let mut order = handle.lock().await;
            order.request_cancel()?;
            order.broker_order_id.clone()
        };
        if let Some(broker_order_id) = broker_order_id {
            self.broker.cancel(&broker_order_id).await.map_err(|err| ExecutionError::Broker(err.to_string()))?;
        }
        Ok(())
    }

    /// Apply one canonical [`BrokerEvent`] to the order it names, matched by
    /// `idempotency_key` (§4.H: "events for the same order are processed in
    /// the order received"). Writes one audit record per applied event.
    pub async fn apply_event(&self, event: BrokerEvent) -> Result<(), ExecutionError> {
        let order_id: OrderId = event
            .idempotency_key()
            .parse::<uuid::Uuid>()
            .map(OrderId)
            .map_err(|_| ExecutionError::Broker(format!("unparseable idempotency_key {}", event.idempotency_key())))?;
        let handle = self.handle(order_id).await?;
        let mut order = handle.lock().await;

        match &event {
            BrokerEvent::Ack { broker_order_id, .. } => {
                if order.broker_order_id.is_none() {
                    order.broker_ack(broker_order_id.clone())?;
                }
            }
            BrokerEvent::Fill { broker_exec_id, qty, price, ts, .. } => {
                order.apply_fill(broker_exec_id, *qty, *price, *ts)?;
            }
            BrokerEvent::Cancelled { ts, .. } => {
                if order.status == crate::order::OrderStatus::Cancelling {
                    order.cancel_ack(*ts)?;
                }
            }
            BrokerEvent::Rejected { reason, ts, .. } => {
                order.error = Some(reason.clone());
                if !order.status.is_terminal() {
                    order.broker_error(reason.clone(), *ts)?;
                }
            }
            BrokerEvent::Expired { ts, .. } => {
                order.expire(*ts)?;
            }
            BrokerEvent::Error { reason, ts, .. } => {
                order.broker_error(reason.clone(), *ts)?;
            }
        }

        self.audit
            .append(
                &Self::stream(order_id),
                NewAuditRecord::new("broker", "apply_event", "order", order_id.to_string())
                    .with_new_values(json!({"status": order.status.to_string(), "filled_qty": order.filled_qty.to_string()})),
            )
            .await?;
        Ok(())
    }

    /// Drain the broker's event stream forever, applying each event as it
    /// arrives. Intended to run as a long-lived background task.
    pub async fn run_event_loop(self: Arc<Self>) {
        let mut events = self.broker.events().await;
        while let Some(event) = events.next().await {
            if let Err(err) = self.apply_event(event).await {
                error!(%err, "failed to apply broker event");
            }
        }
    }

    /// Reconciliation poll (§4.H) for an order stuck `Submitted` without a
    /// confirmed `broker_order_id`: poll every [`RECONCILE_POLL_INTERVAL`]
    /// up to [`RECONCILE_WINDOW`]; transition to `Error` if the broker never
    /// confirms the order exists.
    pub async fn reconcile(&self, order_id: OrderId) -> Result<(), ExecutionError> {
        let handle = self.handle(order_id).await?;
        let idempotency_key = handle.lock().await.idempotency_key();
        let deadline = tokio::time::Instant::now() + RECONCILE_WINDOW;

        loop {
            if tokio::time::Instant::now() >= deadline {
                let mut order = handle.lock().await;
                if !order.status.is_terminal() {
                    order.broker_error("reconciliation window expired with no broker confirmation".to_string(), Utc::now())?;
                    self.audit
                        .append(
                            &Self::stream(order_id),
                            NewAuditRecord::new("system", "reconcile_timeout", "order", order_id.to_string()),
                        )
                        .await?;
                }
                return Ok(());
            }

            {
                let order = handle.lock().await;
                if order.status.is_terminal() {
                    return Ok(());
                }
                if let Some(broker_order_id) = order.broker_order_id.clone() {
                    drop(order);
                    match self.broker.poll(&broker_order_id).await {
                        Ok(PollStatus::Open | PollStatus::Filled | PollStatus::Cancelled) => return Ok(()),
                        Ok(PollStatus::Rejected) => {
                            let mut order = handle.lock().await;
                            order.broker_error("broker reports order rejected".to_string(), Utc::now())?;
                            return Ok(());
                        }
                        Ok(PollStatus::Unknown) | Err(_) => {}
                    }
                } else {
                    warn!(%idempotency_key, "polling broker by idempotency key while awaiting broker_order_id assignment");
                }
            }

            tokio::time::sleep(RECONCILE_POLL_INTERVAL).await;
        }
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Snapshot<Order>, ExecutionError> {
        let handle = self.handle(order_id).await?;
        Ok(Snapshot(handle.lock().await.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerAdapter;
    use crate::order::{ExecutionStrategy, OrderStatus, OrderType, TimeInForce};
    use rust_decimal_macros::dec;
    use tradecore_audit::InMemoryAuditLog;
    use tradecore_instrument::{PortfolioId, Side, Symbol};

    fn market_order() -> Order {
        Order::new(PortfolioId::random(), Symbol::from("AAPL"), Side::Buy, OrderType::Market, dec!(100), TimeInForce::Day, ExecutionStrategy::Market)
    }

    #[tokio::test]
    async fn happy_path_market_order_reaches_filled() {
        let broker = Arc::new(MockBrokerAdapter::new("mock"));
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = Arc::new(OrderEngine::new(broker.clone(), audit.clone()));

        let loop_handle = tokio::spawn(engine.clone().run_event_loop());

        let order = market_order();
        let key = order.idempotency_key();
        let snapshot = engine.submit_order(order, true, None).await.unwrap();
        assert_eq!(snapshot.0.status, OrderStatus::Submitted);

        broker.fill(&key, dec!(100), dec!(150)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let final_order = engine.get(snapshot.0.id).await.unwrap().into_inner();
        assert_eq!(final_order.status, OrderStatus::Filled);
        assert_eq!(final_order.filled_qty, dec!(100));
        assert_eq!(final_order.avg_fill_price, Some(dec!(150)));

        loop_handle.abort();
    }

    #[tokio::test]
    async fn risk_rejected_order_never_reaches_the_broker() {
        let broker = Arc::new(MockBrokerAdapter::new("mock"));
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = OrderEngine::new(broker, audit);

        let order = market_order();
        let snapshot = engine.submit_order(order, false, Some("leverage breach".into())).await.unwrap();
        assert_eq!(snapshot.0.status, OrderStatus::Rejected);
        assert!(snapshot.0.broker_order_id.is_none());
    }

    #[tokio::test]
    async fn partial_fill_then_broker_cancel_lands_on_partially_filled_then_cancelled() {
        let broker = Arc::new(MockBrokerAdapter::new("mock"));
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = Arc::new(OrderEngine::new(broker.clone(), audit));
        let loop_handle = tokio::spawn(engine.clone().run_event_loop());

        let order = market_order();
        let key = order.idempotency_key();
        let snapshot = engine.submit_order(order, true, None).await.unwrap();

        broker.fill(&key, dec!(40), dec!(100)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.get(snapshot.0.id).await.unwrap().0.status, OrderStatus::PartiallyFilled);

        engine.request_cancel(snapshot.0.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.get(snapshot.0.id).await.unwrap().0.status, OrderStatus::Cancelled);

        loop_handle.abort();
    }
}
