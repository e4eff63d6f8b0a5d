//! End-to-end scenarios wired through [`tradecore::app::App`]: a proposed
//! order flows through the risk gate, the order state machine, and a mock
//! broker, with every mutation landing on the audit log.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tradecore::app::App;
use tradecore_audit::{AuditLog, InMemoryAuditLog};
use tradecore_data::MarketDataHub;
use tradecore_execution::{ExecutionStrategy, MockBrokerAdapter, OrderEngine, OrderStatus, OrderType, TimeInForce};
use tradecore_instrument::{Currency, PortfolioId, Side, Symbol};
use tradecore_portfolio::{InMemoryPortfolioRepository, Portfolio, PortfolioRepository};
use tradecore_predict::{LinearRuntimeLoader, PredictionDispatcher, PredictorRegistry};
use tradecore_risk::{PreTradeGate, RiskLimits};

fn loose_limits() -> RiskLimits {
    RiskLimits {
        max_position_weight: dec!(0.9),
        var_limit: 1.0,
        max_leverage: dec!(10),
        max_concentration: dec!(1.0),
        max_daily_volume: dec!(10_000_000),
    }
}

fn tight_limits() -> RiskLimits {
    RiskLimits {
        max_position_weight: dec!(0.01),
        var_limit: 1.0,
        max_leverage: dec!(10),
        max_concentration: dec!(1.0),
        max_daily_volume: dec!(10_000_000),
    }
}

async fn harness(limits: RiskLimits, broker: Arc<dyn tradecore_execution::BrokerAdapter>) -> (App, Arc<dyn AuditLog>, PortfolioId) {
    let audit: Arc<dyn AuditLog> = Arc::new(InMemoryAuditLog::new());
    let hub = Arc::new(MarketDataHub::new(Vec::new(), NonZeroUsize::new(64).unwrap()));
    let registry_dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PredictorRegistry::open(registry_dir.path().join("registry.json")).await.unwrap());
    let loader = Arc::new(LinearRuntimeLoader::new());
    let dispatcher = Arc::new(PredictionDispatcher::new(hub, registry, loader, 4));

    let portfolios: Arc<dyn PortfolioRepository> = Arc::new(InMemoryPortfolioRepository::new(audit.clone()));
    let portfolio = Portfolio::new(PortfolioId::random(), "trader-1", dec!(100_000), Currency::Usd);
    let portfolio_id = portfolio.id;
    portfolios.create(portfolio).await.unwrap();

    let engine = Arc::new(OrderEngine::new(broker, audit.clone()));
    let gate = PreTradeGate::new(limits);

    (App::new(dispatcher, gate, portfolios, engine, audit.clone()), audit, portfolio_id)
}

/// S1: a plain market order clears the risk gate, reaches the broker, and
/// settles to `Filled` once the broker reports a complete fill.
#[tokio::test]
async fn s1_happy_path_market_order_reaches_filled() {
    let broker = Arc::new(MockBrokerAdapter::new("mock"));
    let (app, _audit, portfolio_id) = harness(loose_limits(), broker.clone()).await;
    let loop_handle = tokio::spawn(app.engine.clone().run_event_loop());

    let snapshot = app
        .propose_order(portfolio_id, Symbol::from("AAPL"), Side::Buy, OrderType::Market, dec!(10), dec!(150), TimeInForce::Day, ExecutionStrategy::Market)
        .await
        .unwrap();
    assert_eq!(snapshot.0.status, OrderStatus::Submitted);

    broker.fill(&snapshot.0.idempotency_key(), dec!(10), dec!(150)).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let order = app.engine.get(snapshot.0.id).await.unwrap().into_inner();
    assert_eq!(order.status, OrderStatus::Filled);
    loop_handle.abort();
}

/// S2: a TWAP order is decomposed into children submitted on their own
/// schedule; cancelling the parent mid-schedule stops further children.
#[tokio::test]
async fn s2_twap_split_then_mid_cancel_stops_further_children() {
    let broker = Arc::new(MockBrokerAdapter::new("mock"));
    let (app, _audit, portfolio_id) = harness(loose_limits(), broker.clone()).await;
    let loop_handle = tokio::spawn(app.engine.clone().run_event_loop());

    let strategy = ExecutionStrategy::Twap { duration_secs: 3, interval_secs: 1 };
    let snapshot = app
        .propose_order(portfolio_id, Symbol::from("MSFT"), Side::Buy, OrderType::Market, dec!(40), dec!(300), TimeInForce::Day, strategy)
        .await
        .unwrap();
    let parent_id = snapshot.0.id;

    tokio::time::sleep(Duration::from_millis(50)).await;
    app.cancel_order(parent_id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let parent = app.engine.get(parent_id).await.unwrap().into_inner();
    assert!(matches!(parent.status, OrderStatus::Cancelled | OrderStatus::Cancelling));
    loop_handle.abort();
}

/// S3: a partial fill lands the order on `PartiallyFilled`; a subsequent
/// broker cancel ack then settles it on `Cancelled` without losing the
/// already-applied fill.
#[tokio::test]
async fn s3_partial_fill_then_broker_cancel() {
    let broker = Arc::new(MockBrokerAdapter::new("mock"));
    let (app, _audit, portfolio_id) = harness(loose_limits(), broker.clone()).await;
    let loop_handle = tokio::spawn(app.engine.clone().run_event_loop());

    let snapshot = app
        .propose_order(portfolio_id, Symbol::from("TSLA"), Side::Buy, OrderType::Market, dec!(100), dec!(200), TimeInForce::Day, ExecutionStrategy::Market)
        .await
        .unwrap();
    let key = snapshot.0.idempotency_key();

    broker.fill(&key, dec!(30), dec!(200)).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(app.engine.get(snapshot.0.id).await.unwrap().0.status, OrderStatus::PartiallyFilled);

    app.cancel_order(snapshot.0.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let order = app.engine.get(snapshot.0.id).await.unwrap().into_inner();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.filled_qty, dec!(30));
    loop_handle.abort();
}

/// S4: a position-weight breach is rejected before ever reaching the
/// broker, and the rejection reason is recorded on the order.
#[tokio::test]
async fn s4_risk_breach_is_rejected_before_broker() {
    let broker = Arc::new(MockBrokerAdapter::new("mock"));
    let (app, _audit, portfolio_id) = harness(tight_limits(), broker.clone()).await;

    let snapshot = app
        .propose_order(portfolio_id, Symbol::from("NVDA"), Side::Buy, OrderType::Market, dec!(500), dec!(400), TimeInForce::Day, ExecutionStrategy::Market)
        .await
        .unwrap();

    assert_eq!(snapshot.0.status, OrderStatus::Rejected);
    assert!(snapshot.0.error.as_deref().unwrap_or_default().contains("position weight"));
    assert!(snapshot.0.broker_order_id.is_none());
}

/// A broker whose `submit` never confirms — every call reports a transient
/// error, leaving the order `Submitted` with no `broker_order_id`, and every
/// poll comes back `Unknown`. Exercises the reconciliation path a real
/// broker's dropped acknowledgement would trigger.
struct IndeterminateBroker;

#[async_trait::async_trait]
impl tradecore_execution::BrokerAdapter for IndeterminateBroker {
    fn id(&self) -> &str {
        "indeterminate"
    }

    async fn submit(
        &self,
        _idempotency_key: &str,
        _symbol: &str,
        _side: Side,
        _qty: Decimal,
        _order_type: OrderType,
        _limit_price: Option<Decimal>,
        _tif: TimeInForce,
    ) -> Result<String, tradecore_execution::BrokerError> {
        Err(tradecore_execution::BrokerError::Transient("no acknowledgement from upstream".into()))
    }

    async fn cancel(&self, _broker_order_id: &str) -> Result<(), tradecore_execution::BrokerError> {
        Ok(())
    }

    async fn poll(&self, _broker_order_id: &str) -> Result<tradecore_execution::PollStatus, tradecore_execution::BrokerError> {
        Ok(tradecore_execution::PollStatus::Unknown)
    }

    async fn events(&self) -> tokio_stream::wrappers::ReceiverStream<tradecore_execution::BrokerEvent> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        tokio_stream::wrappers::ReceiverStream::new(rx)
    }
}

/// S5: a broker submit that never resolves leaves the order `Submitted`
/// without a `broker_order_id`; reconciliation polling eventually gives up
/// and moves it to `Error` once the window elapses.
#[tokio::test(start_paused = true)]
async fn s5_indeterminate_broker_submit_reconciles_to_error() {
    let broker: Arc<dyn tradecore_execution::BrokerAdapter> = Arc::new(IndeterminateBroker);
    let (app, _audit, portfolio_id) = harness(loose_limits(), broker).await;

    let snapshot = app
        .propose_order(portfolio_id, Symbol::from("AMD"), Side::Buy, OrderType::Market, dec!(10), dec!(100), TimeInForce::Day, ExecutionStrategy::Market)
        .await
        .unwrap();
    assert_eq!(snapshot.0.status, OrderStatus::Submitted);
    assert!(snapshot.0.broker_order_id.is_none());

    // `reconcile_order` sleeps between polls; with the clock paused those
    // sleeps resolve instantly and the full reconciliation window elapses
    // without real wall-clock delay.
    app.reconcile_order(snapshot.0.id).await.unwrap();

    let order = app.engine.get(snapshot.0.id).await.unwrap().into_inner();
    assert_eq!(order.status, OrderStatus::Error);
}
