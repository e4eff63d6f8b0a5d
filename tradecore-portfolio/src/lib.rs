#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Portfolio Store (§4.F): the source of truth for positions and cash,
//! applying fills transactionally and writing one audit record per mutation.

pub mod error;
pub mod fill;
pub mod in_memory;
pub mod portfolio;
pub mod position;
pub mod repository;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use error::PortfolioError;
pub use fill::Fill;
pub use in_memory::InMemoryPortfolioRepository;
pub use portfolio::{Portfolio, PortfolioStatus};
pub use position::Position;
pub use repository::PortfolioRepository;

#[cfg(feature = "redis-backend")]
pub use redis::RedisPortfolioRepository;
