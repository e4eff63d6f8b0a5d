//! Canonical identifiers shared across the tradecore workspace: tradable
//! [`Symbol`]s, the fixed [`Timeframe`] set, [`Currency`], and small newtype
//! ids used to key entities without resorting to untyped strings.

/// Tradable symbol and its owning source/timeframe identifiers.
pub mod symbol;

/// The canonical timeframe enum and its string mapping rules.
pub mod timeframe;

/// Currency enum used by portfolio cash balances.
pub mod currency;

/// Small `Uuid`-backed newtype identifiers (`PortfolioId`, `OrderId`, ...).
pub mod ids;

/// Buy/sell direction shared by the risk, portfolio and execution crates.
pub mod side;

pub use currency::Currency;
pub use ids::{OrderId, PortfolioId, PredictorId, SignalId};
pub use side::Side;
pub use symbol::Symbol;
pub use timeframe::{Timeframe, TimeframeError};
