use crate::error::PortfolioError;
use crate::fill::Fill;
use crate::portfolio::{Portfolio, PortfolioStatus};
use crate::position::Position;
use crate::repository::PortfolioRepository;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tradecore_audit::{AuditLog, NewAuditRecord};
use tradecore_instrument::{PortfolioId, Symbol};
use tradecore_integration::snapshot::Snapshot;
use tracing::warn;

/// Authoritative, in-process [`PortfolioRepository`] (§4.F). Each portfolio
/// gets its own lock so mutations to different portfolios never contend;
/// every mutation appends one [`tradecore_audit::AuditRecord`] to that
/// portfolio's stream before releasing the lock, so a reader can never
/// observe a state change without its corresponding audit entry.
pub struct InMemoryPortfolioRepository {
    portfolios: AsyncMutex<HashMap<PortfolioId, Arc<AsyncMutex<Portfolio>>>>,
    audit: Arc<dyn AuditLog>,
}

impl InMemoryPortfolioRepository {
    pub fn new(audit: Arc<dyn AuditLog>) -> Self {
        Self {
            portfolios: AsyncMutex::new(HashMap::new()),
            audit,
        }
    }

    async fn handle(&self, portfolio_id: PortfolioId) -> Result<Arc<AsyncMutex<Portfolio>>, PortfolioError> {
        self.portfolios
            .lock()
            .await
            .get(&portfolio_id)
            .cloned()
            .ok_or(PortfolioError::NotFound(portfolio_id))
    }

    fn stream(portfolio_id: PortfolioId) -> String {
        portfolio_id.0.to_string()
    }
}

#[async_trait]
impl PortfolioRepository for InMemoryPortfolioRepository {
    async fn create(&self, portfolio: Portfolio) -> Result<Snapshot<Portfolio>, PortfolioError> {
        let id = portfolio.id;
        self.portfolios.lock().await.insert(id, Arc::new(AsyncMutex::new(portfolio.clone())));
        self.audit
            .append(
                &Self::stream(id),
                NewAuditRecord::new("system", "create", "portfolio", id.to_string())
                    .with_new_values(json!({"owner_id": portfolio.owner_id, "cash": portfolio.cash.to_string()})),
            )
            .await?;
        Ok(Snapshot(portfolio))
    }

    async fn get(&self, portfolio_id: PortfolioId) -> Result<Snapshot<Portfolio>, PortfolioError> {
        let handle = self.handle(portfolio_id).await?;
        Ok(Snapshot(handle.lock().await.clone()))
    }

    async fn apply_fill(&self, portfolio_id: PortfolioId, fill: Fill) -> Result<Snapshot<Portfolio>, PortfolioError> {
        let handle = self.handle(portfolio_id).await?;
        let mut portfolio = handle.lock().await;

        if portfolio.status == PortfolioStatus::Halted {
            return Err(PortfolioError::Halted(portfolio_id));
        }

        let prev_values = portfolio
            .positions
            .get(&fill.symbol)
            .map(|p| json!({"quantity": p.quantity.to_string(), "avg_cost": p.avg_cost.to_string()}));

        let now = Utc::now();
        let position = portfolio
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position::flat(fill.symbol.clone(), now));
        position.apply_fill(fill.signed_qty(), fill.price, fill.ts);

        let retain = !position.is_flat();
        if !retain {
            portfolio.positions.shift_remove(&fill.symbol);
        }

        portfolio.cash -= fill.signed_qty() * fill.price
            + fill.fees.unwrap_or(Decimal::ZERO)
            + fill.commission.unwrap_or(Decimal::ZERO);

        let new_values = json!({
            "symbol": fill.symbol.as_str(),
            "fill_qty": fill.qty.to_string(),
            "fill_price": fill.price.to_string(),
            "broker_exec_id": fill.broker_exec_id,
            "cash_after": portfolio.cash.to_string(),
        });

        self.audit
            .append(
                &Self::stream(portfolio_id),
                NewAuditRecord::new("system", "apply_fill", "portfolio", portfolio_id.to_string())
                    .with_new_values(new_values)
                    .with_prev_values(prev_values.unwrap_or(serde_json::Value::Null)),
            )
            .await?;

        Ok(Snapshot(portfolio.clone()))
    }

    async fn mark(&self, portfolio_id: PortfolioId, symbol: &Symbol, price: Decimal) -> Result<Snapshot<Portfolio>, PortfolioError> {
        let handle = self.handle(portfolio_id).await?;
        let mut portfolio = handle.lock().await;
        match portfolio.positions.get_mut(symbol) {
            Some(position) => position.mark(price, Utc::now()),
            None => warn!(%symbol, "mark received for a symbol with no open position"),
        }
        Ok(Snapshot(portfolio.clone()))
    }

    async fn get_positions(&self, portfolio_id: PortfolioId) -> Result<Vec<Position>, PortfolioError> {
        let handle = self.handle(portfolio_id).await?;
        Ok(handle.lock().await.positions.values().cloned().collect())
    }

    async fn halt(&self, portfolio_id: PortfolioId) -> Result<(), PortfolioError> {
        let handle = self.handle(portfolio_id).await?;
        let mut portfolio = handle.lock().await;
        portfolio.status = PortfolioStatus::Halted;
        self.audit
            .append(
                &Self::stream(portfolio_id),
                NewAuditRecord::new("system", "halt", "portfolio", portfolio_id.to_string()),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tradecore_audit::InMemoryAuditLog;
    use tradecore_instrument::{Currency, Side};

    fn fill(order_id: tradecore_instrument::OrderId, symbol: &str, side: Side, qty: Decimal, price: Decimal) -> Fill {
        Fill {
            id: uuid::Uuid::new_v4(),
            order_id,
            symbol: Symbol::from(symbol),
            side,
            qty,
            price,
            ts: Utc::now(),
            venue: None,
            broker_exec_id: uuid::Uuid::new_v4().to_string(),
            fees: None,
            commission: None,
        }
    }

    #[tokio::test]
    async fn apply_fill_updates_position_and_cash_and_writes_audit() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let repo = InMemoryPortfolioRepository::new(audit.clone());
        let id = PortfolioId::random();
        repo.create(Portfolio::new(id, "user-1", dec!(100_000), Currency::Usd)).await.unwrap();

        let order_id = tradecore_instrument::OrderId::random();
        let snapshot = repo
            .apply_fill(id, fill(order_id, "AAPL", Side::Buy, dec!(166), dec!(150.10)))
            .await
            .unwrap();

        let portfolio = snapshot.into_inner();
        assert_eq!(portfolio.positions[&Symbol::from("AAPL")].quantity, dec!(166));
        assert_eq!(portfolio.cash, dec!(100_000) - dec!(166) * dec!(150.10));

        let records = audit.records(&id.0.to_string()).await;
        assert_eq!(records.len(), 2); // create + apply_fill
        assert!(audit.verify(&id.0.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn applying_the_same_sequence_of_fills_is_order_independent_of_interleaved_reads() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let repo = InMemoryPortfolioRepository::new(audit);
        let id = PortfolioId::random();
        repo.create(Portfolio::new(id, "user-1", dec!(100_000), Currency::Usd)).await.unwrap();
        let order_id = tradecore_instrument::OrderId::random();

        for _ in 0..5 {
            repo.apply_fill(id, fill(order_id, "AAPL", Side::Buy, dec!(10), dec!(100))).await.unwrap();
            let _ = repo.get(id).await.unwrap(); // interleaved read must not disturb the running total
        }

        let positions = repo.get_positions(id).await.unwrap();
        assert_eq!(positions[0].quantity, dec!(50));
    }

    #[tokio::test]
    async fn halted_portfolio_refuses_further_fills() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let repo = InMemoryPortfolioRepository::new(audit);
        let id = PortfolioId::random();
        repo.create(Portfolio::new(id, "user-1", dec!(100_000), Currency::Usd)).await.unwrap();
        repo.halt(id).await.unwrap();

        let order_id = tradecore_instrument::OrderId::random();
        let err = repo.apply_fill(id, fill(order_id, "AAPL", Side::Buy, dec!(10), dec!(100))).await.unwrap_err();
        assert!(matches!(err, PortfolioError::Halted(_)));
    }
}
