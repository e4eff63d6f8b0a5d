use crate::error::PortfolioError;
use crate::fill::Fill;
use crate::portfolio::Portfolio;
use crate::position::Position;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tradecore_instrument::{PortfolioId, Symbol};
use tradecore_integration::snapshot::Snapshot;

/// Portfolio Store contract (§4.F): `Get`, `ApplyFill`, `Mark`,
/// `GetPositions`. Every mutation is transactional — a fill updates
/// `quantity`/`avg_cost`/`realized_pl` and writes an audit record as one
/// atomic step — and is serialized per portfolio so concurrent writers to
/// the same portfolio never interleave; reads return a [`Snapshot`].
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    async fn create(&self, portfolio: Portfolio) -> Result<Snapshot<Portfolio>, PortfolioError>;

    async fn get(&self, portfolio_id: PortfolioId) -> Result<Snapshot<Portfolio>, PortfolioError>;

    async fn apply_fill(&self, portfolio_id: PortfolioId, fill: Fill) -> Result<Snapshot<Portfolio>, PortfolioError>;

    async fn mark(&self, portfolio_id: PortfolioId, symbol: &Symbol, price: Decimal) -> Result<Snapshot<Portfolio>, PortfolioError>;

    async fn get_positions(&self, portfolio_id: PortfolioId) -> Result<Vec<Position>, PortfolioError>;

    /// Set [`crate::portfolio::PortfolioStatus::Halted`] — the `ErrIntegrity`
    /// response to a broken audit chain (§7): writes to this portfolio are
    /// refused until cleared.
    async fn halt(&self, portfolio_id: PortfolioId) -> Result<(), PortfolioError>;
}
