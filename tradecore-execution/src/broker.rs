use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use tradecore_instrument::Side;
use tradecore_integration::rate_limit::{Priority, RateLimiter};
use tradecore_integration::retry::{with_retry, BackoffPolicy};
use tradecore_integration::Unrecoverable;

use crate::order::{Order, OrderType, TimeInForce};

/// Canonical broker event (§4.J): every adapter maps its broker-specific
/// wire format onto this set before it reaches the order engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BrokerEvent {
    Ack { idempotency_key: String, broker_order_id: String, ts: DateTime<Utc> },
    Fill { idempotency_key: String, broker_exec_id: String, qty: Decimal, price: Decimal, ts: DateTime<Utc> },
    Cancelled { idempotency_key: String, ts: DateTime<Utc> },
    Rejected { idempotency_key: String, reason: String, ts: DateTime<Utc> },
    Expired { idempotency_key: String, ts: DateTime<Utc> },
    Error { idempotency_key: String, reason: String, ts: DateTime<Utc> },
}

impl BrokerEvent {
    pub fn idempotency_key(&self) -> &str {
        match self {
            BrokerEvent::Ack { idempotency_key, .. }
            | BrokerEvent::Fill { idempotency_key, .. }
            | BrokerEvent::Cancelled { idempotency_key, .. }
            | BrokerEvent::Rejected { idempotency_key, .. }
            | BrokerEvent::Expired { idempotency_key, .. }
            | BrokerEvent::Error { idempotency_key, .. } => idempotency_key,
        }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            BrokerEvent::Ack { ts, .. }
            | BrokerEvent::Fill { ts, .. }
            | BrokerEvent::Cancelled { ts, .. }
            | BrokerEvent::Rejected { ts, .. }
            | BrokerEvent::Expired { ts, .. }
            | BrokerEvent::Error { ts, .. } => *ts,
        }
    }
}

/// Maximum tolerated skew between a broker event's timestamp and now (§4.J).
pub const MAX_CLOCK_SKEW: ChronoDuration = ChronoDuration::seconds(60);

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("client error: {0}")]
    Client(String),
    #[error("transient error: {0}")]
    Transient(String),
    #[error("broker event timestamp skewed beyond tolerance: {0}")]
    ClockSkew(DateTime<Utc>),
}

impl Unrecoverable for BrokerError {
    fn is_unrecoverable(&self) -> bool {
        !matches!(self, BrokerError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Open,
    Filled,
    Cancelled,
    Rejected,
    Unknown,
}

/// Uniform broker contract (§4.J): `Submit`/`Cancel`/`Poll`/`Events`.
/// Submit is keyed by `idempotency_key` so retries never double-submit.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    fn id(&self) -> &str;

    async fn submit(
        &self,
        idempotency_key: &str,
        symbol: &str,
        side: Side,
        qty: Decimal,
        order_type: OrderType,
        limit_price: Option<Decimal>,
        tif: TimeInForce,
    ) -> Result<String, BrokerError>;

    async fn cancel(&self, broker_order_id: &str) -> Result<(), BrokerError>;

    async fn poll(&self, broker_order_id: &str) -> Result<PollStatus, BrokerError>;

    /// A live stream of [`BrokerEvent`]s for orders submitted through this
    /// adapter. Events with a timestamp more than [`MAX_CLOCK_SKEW`] in the
    /// future are filtered out before `events` returns.
    async fn events(&self) -> ReceiverStream<BrokerEvent>;
}

fn within_clock_skew(ts: DateTime<Utc>) -> bool {
    ts - Utc::now() <= MAX_CLOCK_SKEW
}

struct MockOrderState {
    broker_order_id: String,
    cancelled: bool,
}

/// Deterministic, in-process broker used by the S1-S6 test scenarios and
/// `tradecore serve --broker=mock`. `fill()`/`reject()`/`cancel_ack()` let a
/// test drive the broker side of a scenario explicitly instead of racing a
/// background scheduler.
pub struct MockBrokerAdapter {
    id: String,
    orders: Mutex<HashMap<String, MockOrderState>>,
    events_tx: mpsc::Sender<BrokerEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<BrokerEvent>>>,
}

impl MockBrokerAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        Self {
            id: id.into(),
            orders: Mutex::new(HashMap::new()),
            events_tx: tx,
            events_rx: Mutex::new(Some(rx)),
        }
    }

    async fn emit(&self, event: BrokerEvent) {
        if !within_clock_skew(event.ts()) {
            warn!(key = event.idempotency_key(), "dropping broker event with skewed clock");
            return;
        }
        let _ = self.events_tx.send(event).await;
    }

    /// Drive a fill for a previously submitted order.
    pub async fn fill(&self, idempotency_key: &str, qty: Decimal, price: Decimal) {
        self.emit(BrokerEvent::Fill {
            idempotency_key: idempotency_key.to_string(),
            broker_exec_id: uuid::Uuid::new_v4().to_string(),
            qty,
            price,
            ts: Utc::now(),
        })
        .await;
    }

    pub async fn reject(&self, idempotency_key: &str, reason: impl Into<String>) {
        self.emit(BrokerEvent::Rejected { idempotency_key: idempotency_key.to_string(), reason: reason.into(), ts: Utc::now() }).await;
    }

    pub async fn cancel_ack(&self, idempotency_key: &str) {
        self.emit(BrokerEvent::Cancelled { idempotency_key: idempotency_key.to_string(), ts: Utc::now() }).await;
    }
}

#[async_trait]
impl BrokerAdapter for MockBrokerAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn submit(
        &self,
        idempotency_key: &str,
        _symbol: &str,
        _side: Side,
        _qty: Decimal,
        _order_type: OrderType,
        _limit_price: Option<Decimal>,
        _tif: TimeInForce,
    ) -> Result<String, BrokerError> {
        let mut orders = self.orders.lock().await;
        if let Some(existing) = orders.get(idempotency_key) {
            debug!(idempotency_key, "duplicate submit deduplicated by idempotency key");
            return Ok(existing.broker_order_id.clone());
        }
        let broker_order_id = format!("mock-{}", uuid::Uuid::new_v4());
        orders.insert(idempotency_key.to_string(), MockOrderState { broker_order_id: broker_order_id.clone(), cancelled: false });
        drop(orders);
        self.emit(BrokerEvent::Ack { idempotency_key: idempotency_key.to_string(), broker_order_id: broker_order_id.clone(), ts: Utc::now() }).await;
        Ok(broker_order_id)
    }

    async fn cancel(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        let mut orders = self.orders.lock().await;
        let Some((key, state)) = orders.iter_mut().find(|(_, s)| s.broker_order_id == broker_order_id) else {
            return Err(BrokerError::Client(format!("unknown broker_order_id {broker_order_id}")));
        };
        state.cancelled = true;
        let key = key.clone();
        drop(orders);
        self.cancel_ack(&key).await;
        Ok(())
    }

    async fn poll(&self, broker_order_id: &str) -> Result<PollStatus, BrokerError> {
        let orders = self.orders.lock().await;
        match orders.values().find(|s| s.broker_order_id == broker_order_id) {
            Some(s) if s.cancelled => Ok(PollStatus::Cancelled),
            Some(_) => Ok(PollStatus::Open),
            None => Ok(PollStatus::Unknown),
        }
    }

    async fn events(&self) -> ReceiverStream<BrokerEvent> {
        let rx = self.events_rx.lock().await.take().expect("events() called more than once on a MockBrokerAdapter");
        ReceiverStream::new(rx)
    }
}

#[derive(serde::Deserialize)]
struct SubmitResponse {
    broker_order_id: String,
    #[allow(dead_code)]
    status: String,
}

/// REST broker adapter over the wire contract in §6: `POST /orders`,
/// `DELETE /orders/{id}`, `GET /orders/{id}`; same timeout/backoff posture
/// as `tradecore-data::RestProviderAdapter`.
pub struct HttpBrokerAdapter {
    id: String,
    base_url: url::Url,
    http: reqwest::Client,
    limiter: RateLimiter,
    backoff: BackoffPolicy,
    events_tx: mpsc::Sender<BrokerEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<BrokerEvent>>>,
}

impl HttpBrokerAdapter {
    pub fn new(id: impl Into<String>, base_url: url::Url, limiter: RateLimiter) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        Self {
            id: id.into(),
            base_url,
            http: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(3))
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("reqwest client builds with static config"),
            limiter,
            backoff: BackoffPolicy::default(),
            events_tx: tx,
            events_rx: Mutex::new(Some(rx)),
        }
    }

    /// Feed a frame received on the broker's streaming endpoint (§6) into
    /// this adapter's `events()` channel, dropping clock-skewed frames.
    pub async fn ingest_stream_frame(&self, event: BrokerEvent) {
        if !within_clock_skew(event.ts()) {
            warn!(key = event.idempotency_key(), "dropping broker stream frame with skewed clock");
            return;
        }
        let _ = self.events_tx.send(event).await;
    }
}

#[async_trait]
impl BrokerAdapter for HttpBrokerAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn submit(
        &self,
        idempotency_key: &str,
        symbol: &str,
        side: Side,
        qty: Decimal,
        order_type: OrderType,
        limit_price: Option<Decimal>,
        tif: TimeInForce,
    ) -> Result<String, BrokerError> {
        let url = self.base_url.join("orders").map_err(|e| BrokerError::Client(e.to_string()))?;
        let body = serde_json::json!({
            "idempotency_key": idempotency_key,
            "symbol": symbol,
            "side": side,
            "qty": qty,
            "type": order_type,
            "limit_price": limit_price,
            "tif": tif,
        });

        let response = with_retry(self.backoff, || async {
            self.limiter.acquire(Priority::Normal).await;
            let res = self
                .http
                .post(url.clone())
                .json(&body)
                .send()
                .await
                .map_err(|e| BrokerError::Transient(e.to_string()))?;
            let status = res.status();
            if status.is_client_error() {
                return Err(BrokerError::Client(format!("HTTP {status}")));
            }
            if status.is_server_error() {
                return Err(BrokerError::Transient(format!("HTTP {status}")));
            }
            res.json::<SubmitResponse>().await.map_err(|e| BrokerError::Transient(e.to_string()))
        })
        .await?;

        Ok(response.broker_order_id)
    }

    async fn cancel(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        let url = self.base_url.join(&format!("orders/{broker_order_id}")).map_err(|e| BrokerError::Client(e.to_string()))?;
        self.limiter.acquire(Priority::High).await;
        let res = self.http.delete(url).send().await.map_err(|e| BrokerError::Transient(e.to_string()))?;
        if res.status().is_client_error() {
            return Err(BrokerError::Client(format!("HTTP {}", res.status())));
        }
        Ok(())
    }

    async fn poll(&self, broker_order_id: &str) -> Result<PollStatus, BrokerError> {
        let url = self.base_url.join(&format!("orders/{broker_order_id}")).map_err(|e| BrokerError::Client(e.to_string()))?;
        self.limiter.acquire(Priority::Low).await;
        let res = self.http.get(url).send().await.map_err(|e| BrokerError::Transient(e.to_string()))?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(PollStatus::Unknown);
        }
        #[derive(serde::Deserialize)]
        struct PollResponse {
            status: String,
        }
        let parsed: PollResponse = res.json().await.map_err(|e| BrokerError::Transient(e.to_string()))?;
        Ok(match parsed.status.as_str() {
            "filled" => PollStatus::Filled,
            "cancelled" => PollStatus::Cancelled,
            "rejected" => PollStatus::Rejected,
            "open" => PollStatus::Open,
            _ => PollStatus::Unknown,
        })
    }

    async fn events(&self) -> ReceiverStream<BrokerEvent> {
        let rx = self.events_rx.lock().await.take().expect("events() called more than once on an HttpBrokerAdapter");
        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn mock_broker_dedupes_submit_by_idempotency_key() {
        let broker = MockBrokerAdapter::new("mock");
        let id1 = broker.submit("key-1", "AAPL", Side::Buy, dec!(10), OrderType::Market, None, TimeInForce::Day).await.unwrap();
        let id2 = broker.submit("key-1", "AAPL", Side::Buy, dec!(10), OrderType::Market, None, TimeInForce::Day).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn mock_broker_emits_ack_then_fill() {
        let broker = Arc::new(MockBrokerAdapter::new("mock"));
        let mut events = broker.events().await;
        broker.submit("key-1", "AAPL", Side::Buy, dec!(10), OrderType::Market, None, TimeInForce::Day).await.unwrap();
        broker.fill("key-1", dec!(10), dec!(100)).await;

        let ack = events.next().await.unwrap();
        assert!(matches!(ack, BrokerEvent::Ack { .. }));
        let fill = events.next().await.unwrap();
        assert!(matches!(fill, BrokerEvent::Fill { .. }));
    }

    #[test]
    fn clock_skew_beyond_tolerance_is_rejected() {
        let far_future = Utc::now() + ChronoDuration::seconds(120);
        assert!(!within_clock_skew(far_future));
        assert!(within_clock_skew(Utc::now()));
    }
}
