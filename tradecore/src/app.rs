use crate::error::AppError;
use rust_decimal::Decimal;
use std::sync::Arc;
use tradecore_audit::AuditLog;
use tradecore_execution::{ExecutionStrategy, Order, OrderEngine, OrderType, TimeInForce};
use tradecore_instrument::{OrderId, PortfolioId, Side, Symbol};
use tradecore_integration::snapshot::Snapshot;
use tradecore_portfolio::PortfolioRepository;
use tradecore_predict::PredictionDispatcher;
use tradecore_risk::{PortfolioSnapshot, PositionSnapshot, PreTradeGate, ProposedOrder};

/// The wiring for component L (§4): owns `Arc` handles to every other
/// component and translates between their crate-local types at the seams
/// `spec.md`'s flow diagram draws between them — a proposed order becomes a
/// [`ProposedOrder`]/[`PortfolioSnapshot`] pair for the risk gate, whose
/// verdict becomes the `(risk_passed, rejection_reason)` pair
/// [`OrderEngine::submit_order`] expects.
pub struct App {
    pub dispatcher: Arc<PredictionDispatcher>,
    pub gate: PreTradeGate,
    pub portfolios: Arc<dyn PortfolioRepository>,
    pub engine: Arc<OrderEngine>,
    pub audit: Arc<dyn AuditLog>,
}

impl App {
    pub fn new(
        dispatcher: Arc<PredictionDispatcher>,
        gate: PreTradeGate,
        portfolios: Arc<dyn PortfolioRepository>,
        engine: Arc<OrderEngine>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self { dispatcher, gate, portfolios, engine, audit }
    }

    /// Build a [`PortfolioSnapshot`] from the current state of `portfolio_id`
    /// (§4.G's gate input). Asset-class tags aren't part of the Portfolio
    /// Store's own schema (§3), so positions carry no tags here; a deployment
    /// that wants concentration limits enforced per asset class supplies them
    /// by tagging the incoming [`ProposedOrder`] instead.
    async fn portfolio_snapshot(&self, portfolio_id: PortfolioId) -> Result<PortfolioSnapshot, AppError> {
        let portfolio = self.portfolios.get(portfolio_id).await?.into_inner();
        let total_value = portfolio.total_value();
        let positions = portfolio
            .positions
            .values()
            .map(|p| PositionSnapshot { symbol: p.symbol.clone(), quantity: p.quantity, market_value: p.market_value(), asset_classes: Vec::new() })
            .collect();
        Ok(PortfolioSnapshot {
            portfolio_id,
            cash: portfolio.cash,
            total_value,
            positions,
            daily_traded_notional: Decimal::ZERO,
            returns: Vec::new(),
        })
    }

    /// `CheckRisk` + `SubmitOrder` (§6): evaluate the pre-trade gate against
    /// the portfolio's current state, then hand the verdict to the Order
    /// Engine regardless of outcome — a rejected order still gets recorded
    /// (`Pending -> Rejected`) with its reason on the audit trail (§7).
    #[allow(clippy::too_many_arguments)]
    pub async fn propose_order(
        &self,
        portfolio_id: PortfolioId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        qty: Decimal,
        reference_price: Decimal,
        tif: TimeInForce,
        strategy: ExecutionStrategy,
    ) -> Result<Snapshot<Order>, AppError> {
        let snapshot = self.portfolio_snapshot(portfolio_id).await?;
        let proposed = ProposedOrder { symbol: symbol.clone(), side, quantity: qty, price: reference_price, asset_classes: Vec::new() };

        let (risk_passed, rejection_reason) = match self.gate.evaluate(&snapshot, &proposed) {
            Ok(()) => (true, None),
            Err(reason) => (false, Some(reason.to_string())),
        };

        let order = Order::new(portfolio_id, symbol, side, order_type, qty, tif, strategy);
        let is_scheduled = matches!(
            order.strategy,
            ExecutionStrategy::Twap { .. } | ExecutionStrategy::Vwap { .. } | ExecutionStrategy::Iceberg { .. } | ExecutionStrategy::Pov { .. }
        );

        let result = self.engine.submit_order(order, risk_passed, rejection_reason).await?;

        if risk_passed && is_scheduled {
            let engine = self.engine.clone();
            let order_id = result.0.id;
            tokio::spawn(async move {
                if let Err(err) = engine.run_strategy(order_id).await {
                    tracing::error!(%err, %order_id, "execution strategy schedule aborted");
                }
            });
        }

        Ok(result)
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<(), AppError> {
        self.engine.request_cancel(order_id).await.map_err(Into::into)
    }

    /// Drive the reconciliation poll for an order stuck indeterminate after
    /// `Submit` (§4.H), used by the `reconcile` CLI subcommand and by a
    /// background task for orders whose broker submit call timed out.
    pub async fn reconcile_order(&self, order_id: OrderId) -> Result<(), AppError> {
        self.engine.reconcile(order_id).await.map_err(Into::into)
    }

    /// Replay and verify a portfolio's audit chain (`replay-audit` CLI
    /// subcommand). Returns the first broken link, if any (§7).
    pub async fn replay_audit(&self, stream: &str) -> Result<Vec<tradecore_audit::AuditRecord>, AppError> {
        self.audit.verify(stream).await?;
        Ok(self.audit.records(stream).await)
    }
}
