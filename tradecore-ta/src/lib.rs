#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Feature Engine (§4.C): pure, deterministic transformations from a window
//! of bars to labeled indicator series. Every function here is a free
//! function with no shared state — safe to call concurrently from any
//! number of workers, and trivially testable in isolation.

pub mod indicators;

pub use indicators::{compute_feature_set, Features, FeatureSet};
