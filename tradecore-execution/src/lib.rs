#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Order state machine, execution-strategy decomposition, and broker
//! adapters (§4.H/§4.I/§4.J): the path from an accepted order to broker
//! fills and back into a settled terminal state.

pub mod broker;
pub mod engine;
pub mod error;
pub mod order;
pub mod strategy;

pub use broker::{BrokerAdapter, BrokerError, BrokerEvent, HttpBrokerAdapter, MockBrokerAdapter, PollStatus};
pub use engine::OrderEngine;
pub use error::ExecutionError;
pub use order::{ExecutionStrategy, Order, OrderStatus, OrderType, TimeInForce};
