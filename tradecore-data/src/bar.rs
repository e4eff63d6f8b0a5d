use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use tradecore_instrument::symbol::ProviderId;
use tradecore_instrument::{Symbol, Timeframe};

/// A single OHLCV sample. Immutable once written: the Market-Data Hub never
/// mutates a [`Bar`] after caching it, only appends or supersedes it under
/// the preferred-source resolution rule (§3).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub source: ProviderId,
    /// Wall-clock time this bar was received, used to resolve duplicate
    /// `(symbol, timeframe, ts, source)` keys by keeping the latest arrival.
    pub received_at: DateTime<Utc>,
}

impl Bar {
    /// Primary key per §3: `(symbol, timeframe, ts, source)`.
    pub fn key(&self) -> (Symbol, Timeframe, DateTime<Utc>, ProviderId) {
        (self.symbol.clone(), self.timeframe, self.ts, self.source)
    }
}

/// An inclusive-start, exclusive-end time range used to request or describe
/// bar coverage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RangeSpec {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RangeSpec {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Deduplication key for the Market-Data Hub's single-flight fetch map
/// (§4.B, Property 6): concurrent `GetBars` calls for the same
/// `(symbol, timeframe, range)` share one upstream fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub range: RangeSpec,
}

impl Fingerprint {
    pub fn new(symbol: Symbol, timeframe: Timeframe, range: RangeSpec) -> Self {
        Self {
            symbol,
            timeframe,
            range,
        }
    }
}

// Manual Hash/PartialEq carve-out note: Symbol/Timeframe/RangeSpec already
// derive Hash+Eq, so the derive above is sufficient; kept explicit here
// because Fingerprint is the one type this crate relies on being a correct
// HashMap key end to end (single-flight correctness depends on it).
impl Hash for Bar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}
