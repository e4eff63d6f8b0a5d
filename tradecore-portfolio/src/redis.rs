//! Redis-backed [`PortfolioRepository`] (§4.F/§4.M), gated behind the
//! `redis-backend` feature. Each portfolio is a single JSON blob under key
//! `portfolio:{id}`; mutations go through the same in-process per-portfolio
//! lock as [`crate::InMemoryPortfolioRepository`] before being written back,
//! so two writers in the *same process* never race. This does not protect
//! against two separate processes writing the same key concurrently — a
//! production deployment would need Redis `WATCH`/`MULTI` or a Lua script for
//! that, noted as an open gap rather than implemented here.
use crate::error::PortfolioError;
use crate::fill::Fill;
use crate::portfolio::{Portfolio, PortfolioStatus};
use crate::position::Position;
use crate::repository::PortfolioRepository;
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tradecore_audit::{AuditLog, NewAuditRecord};
use tradecore_instrument::{PortfolioId, Symbol};
use tradecore_integration::snapshot::Snapshot;
use tracing::warn;

fn key(portfolio_id: PortfolioId) -> String {
    format!("portfolio:{}", portfolio_id.0)
}

/// Connection settings for [`RedisPortfolioRepository::connect`], mirroring
/// the teacher's `portfolio::repository::redis::Config`.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct Config {
    pub uri: String,
}

pub struct RedisPortfolioRepository {
    client: redis::Client,
    locks: AsyncMutex<HashMap<PortfolioId, Arc<AsyncMutex<()>>>>,
    audit: Arc<dyn AuditLog>,
}

impl RedisPortfolioRepository {
    pub fn connect(cfg: Config, audit: Arc<dyn AuditLog>) -> Result<Self, PortfolioError> {
        let client = redis::Client::open(cfg.uri).map_err(|err| PortfolioError::Backend(err.to_string()))?;
        Ok(Self {
            client,
            locks: AsyncMutex::new(HashMap::new()),
            audit,
        })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, PortfolioError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| PortfolioError::Backend(err.to_string()))
    }

    async fn lock_for(&self, portfolio_id: PortfolioId) -> Arc<AsyncMutex<()>> {
        self.locks.lock().await.entry(portfolio_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    async fn read(&self, portfolio_id: PortfolioId) -> Result<Portfolio, PortfolioError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key(portfolio_id)).await.map_err(|err| PortfolioError::Backend(err.to_string()))?;
        let raw = raw.ok_or(PortfolioError::NotFound(portfolio_id))?;
        serde_json::from_str(&raw).map_err(|err| PortfolioError::Backend(err.to_string()))
    }

    async fn write(&self, portfolio: &Portfolio) -> Result<(), PortfolioError> {
        let mut conn = self.conn().await?;
        let raw = serde_json::to_string(portfolio).map_err(|err| PortfolioError::Backend(err.to_string()))?;
        conn.set::<_, _, ()>(key(portfolio.id), raw).await.map_err(|err| PortfolioError::Backend(err.to_string()))?;
        Ok(())
    }

    fn stream(portfolio_id: PortfolioId) -> String {
        portfolio_id.0.to_string()
    }
}

#[async_trait]
impl PortfolioRepository for RedisPortfolioRepository {
    async fn create(&self, portfolio: Portfolio) -> Result<Snapshot<Portfolio>, PortfolioError> {
        self.write(&portfolio).await?;
        self.audit
            .append(
                &Self::stream(portfolio.id),
                NewAuditRecord::new("system", "create", "portfolio", portfolio.id.to_string())
                    .with_new_values(json!({"owner_id": portfolio.owner_id, "cash": portfolio.cash.to_string()})),
            )
            .await?;
        Ok(Snapshot(portfolio))
    }

    async fn get(&self, portfolio_id: PortfolioId) -> Result<Snapshot<Portfolio>, PortfolioError> {
        Ok(Snapshot(self.read(portfolio_id).await?))
    }

    async fn apply_fill(&self, portfolio_id: PortfolioId, fill: Fill) -> Result<Snapshot<Portfolio>, PortfolioError> {
        let lock = self.lock_for(portfolio_id).await;
        let _guard = lock.lock().await;

        let mut portfolio = self.read(portfolio_id).await?;
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
        if position.is_flat() {
            portfolio.positions.shift_remove(&fill.symbol);
        }

        portfolio.cash -= fill.signed_qty() * fill.price
            + fill.fees.unwrap_or(Decimal::ZERO)
            + fill.commission.unwrap_or(Decimal::ZERO);

        self.write(&portfolio).await?;

        self.audit
            .append(
                &Self::stream(portfolio_id),
                NewAuditRecord::new("system", "apply_fill", "portfolio", portfolio_id.to_string())
                    .with_new_values(json!({
                        "symbol": fill.symbol.as_str(),
                        "fill_qty": fill.qty.to_string(),
                        "fill_price": fill.price.to_string(),
                        "broker_exec_id": fill.broker_exec_id,
                        "cash_after": portfolio.cash.to_string(),
                    }))
                    .with_prev_values(prev_values.unwrap_or(serde_json::Value::Null)),
            )
            .await?;

        Ok(Snapshot(portfolio))
    }

    async fn mark(&self, portfolio_id: PortfolioId, symbol: &Symbol, price: Decimal) -> Result<Snapshot<Portfolio>, PortfolioError> {
        let lock = self.lock_for(portfolio_id).await;
        let _guard = lock.lock().await;
        let mut portfolio = self.read(portfolio_id).await?;
        match portfolio.positions.get_mut(symbol) {
            Some(position) => position.mark(price, Utc::now()),
            None => warn!(%symbol, "mark received for a symbol with no open position"),
        }
        self.write(&portfolio).await?;
        Ok(Snapshot(portfolio))
    }

    async fn get_positions(&self, portfolio_id: PortfolioId) -> Result<Vec<Position>, PortfolioError> {
        Ok(self.read(portfolio_id).await?.positions.values().cloned().collect())
    }

    async fn halt(&self, portfolio_id: PortfolioId) -> Result<(), PortfolioError> {
        let lock = self.lock_for(portfolio_id).await;
        let _guard = lock.lock().await;
        let mut portfolio = self.read(portfolio_id).await?;
        portfolio.status = PortfolioStatus::Halted;
        self.write(&portfolio).await?;
        self.audit
            .append(
                &Self::stream(portfolio_id),
                NewAuditRecord::new("system", "halt", "portfolio", portfolio_id.to_string()),
            )
            .await?;
        Ok(())
    }
}
