use crate::bar::{Bar, RangeSpec};
use crate::error::DataError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use tradecore_instrument::symbol::ProviderId;
use tradecore_instrument::{Symbol, Timeframe};
use tradecore_integration::rate_limit::{Priority, RateLimiter};
use tradecore_integration::retry::{with_retry, BackoffPolicy};
use tradecore_integration::Unrecoverable;

/// Upstream market-data vendor contract (§4.A). Implementors map native
/// timeframes onto the canonical set, rate-limit themselves, retry
/// transient failures, and hand back UTC-normalized [`Bar`]s with duplicate
/// timestamps collapsed to the latest `received_at`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: RangeSpec,
    ) -> Result<Vec<Bar>, DataError>;
}

/// Collapse duplicate `(symbol, timeframe, ts)` entries to the one with the
/// latest `received_at`, per §4.A. Shared by every adapter so the rule
/// can't drift between implementations.
pub fn collapse_duplicates(mut bars: Vec<Bar>) -> Vec<Bar> {
    let mut latest: BTreeMap<DateTime<Utc>, Bar> = BTreeMap::new();
    bars.sort_by_key(|b| b.received_at);
    for bar in bars.drain(..) {
        latest
            .entry(bar.ts)
            .and_modify(|existing| {
                if bar.received_at >= existing.received_at {
                    *existing = bar.clone();
                }
            })
            .or_insert(bar);
    }
    latest.into_values().collect()
}

#[derive(Debug, Error)]
enum HttpFetchError {
    #[error("client error: {0}")]
    Client(String),
    #[error("transient error: {0}")]
    Transient(String),
}

impl Unrecoverable for HttpFetchError {
    fn is_unrecoverable(&self) -> bool {
        matches!(self, HttpFetchError::Client(_))
    }
}

#[derive(Debug, Deserialize)]
struct WireBar {
    t: DateTime<Utc>,
    o: Decimal,
    h: Decimal,
    l: Decimal,
    c: Decimal,
    v: Decimal,
}

/// Polling REST provider adapter, grounded on the Alpha-Vantage/IEX-style
/// integration in `original_source/backend/data_service/market_data.py`:
/// a single `GET` against `{base_url}/bars` with `symbol`/`timeframe`/
/// `start`/`end` query parameters, returning a JSON array of OHLCV points.
pub struct RestProviderAdapter {
    id: ProviderId,
    base_url: url::Url,
    http: reqwest::Client,
    limiter: RateLimiter,
    backoff: BackoffPolicy,
}

impl RestProviderAdapter {
    pub fn new(id: ProviderId, base_url: url::Url, limiter: RateLimiter) -> Self {
        Self {
            id,
            base_url,
            http: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(3))
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("reqwest client builds with static config"),
            limiter,
            backoff: BackoffPolicy::default(),
        }
    }

    async fn fetch_once(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: RangeSpec,
    ) -> Result<Vec<WireBar>, HttpFetchError> {
        self.limiter.acquire(Priority::Normal).await;

        let mut url = self.base_url.join("bars").map_err(|e| HttpFetchError::Client(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol.as_str())
            .append_pair("timeframe", &timeframe.to_string())
            .append_pair("start", &range.start.to_rfc3339())
            .append_pair("end", &range.end.to_rfc3339());

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| HttpFetchError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(HttpFetchError::Client(format!("HTTP {status}")));
        }
        if status.is_server_error() {
            return Err(HttpFetchError::Transient(format!("HTTP {status}")));
        }

        response
            .json::<Vec<WireBar>>()
            .await
            .map_err(|e| HttpFetchError::Transient(e.to_string()))
    }
}

#[async_trait]
impl ProviderAdapter for RestProviderAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: RangeSpec,
    ) -> Result<Vec<Bar>, DataError> {
        if range.end <= range.start {
            return Err(DataError::InvalidRange(
                range.start.to_rfc3339(),
                range.end.to_rfc3339(),
            ));
        }

        let wire_bars = with_retry(self.backoff, || self.fetch_once(symbol, timeframe, range))
            .await
            .map_err(|e| DataError::Upstream(e.to_string()))?;

        let now = Utc::now();
        let bars = wire_bars
            .into_iter()
            .map(|w| Bar {
                symbol: symbol.clone(),
                timeframe,
                ts: w.t,
                open: w.o,
                high: w.h,
                low: w.l,
                close: w.c,
                volume: w.v,
                source: self.id,
                received_at: now,
            })
            .collect();

        Ok(collapse_duplicates(bars))
    }
}

/// In-memory fixture adapter used by tests, `replay-audit`-style tooling,
/// and local development. Bars are pre-seeded; `fetch_bars` simply filters
/// by range, with no network I/O and no rate limiting.
#[derive(Clone)]
pub struct InMemoryProviderAdapter {
    id: ProviderId,
    bars: Arc<Mutex<Vec<Bar>>>,
}

impl InMemoryProviderAdapter {
    pub fn new(id: ProviderId, seed: Vec<Bar>) -> Self {
        Self {
            id,
            bars: Arc::new(Mutex::new(seed)),
        }
    }

    pub async fn push(&self, bar: Bar) {
        self.bars.lock().await.push(bar);
    }
}

#[async_trait]
impl ProviderAdapter for InMemoryProviderAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: RangeSpec,
    ) -> Result<Vec<Bar>, DataError> {
        if range.end <= range.start {
            return Err(DataError::InvalidRange(
                range.start.to_rfc3339(),
                range.end.to_rfc3339(),
            ));
        }
        debug!(%symbol, ?timeframe, "serving fixture bars");
        let bars = self.bars.lock().await;
        let matched = bars
            .iter()
            .filter(|b| &b.symbol == symbol && b.timeframe == timeframe && range.contains(b.ts))
            .cloned()
            .collect::<Vec<_>>();
        if matched.is_empty() {
            warn!(%symbol, ?timeframe, "no fixture bars matched requested range");
        }
        Ok(collapse_duplicates(matched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(ts: DateTime<Utc>, received_at: DateTime<Utc>, close: Decimal) -> Bar {
        Bar {
            symbol: Symbol::from("AAPL"),
            timeframe: Timeframe::D1,
            ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(100),
            source: ProviderId::Mock,
            received_at,
        }
    }

    #[test]
    fn collapse_keeps_latest_received_at() {
        let t0 = Utc::now();
        let older = bar(t0, t0, dec!(100));
        let newer = bar(t0, t0 + chrono::Duration::seconds(5), dec!(101));
        let result = collapse_duplicates(vec![older, newer]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].close, dec!(101));
    }

    #[tokio::test]
    async fn in_memory_adapter_filters_by_range() {
        let t0 = Utc::now();
        let adapter = InMemoryProviderAdapter::new(
            ProviderId::Mock,
            vec![bar(t0, t0, dec!(100)), bar(t0 + chrono::Duration::days(1), t0, dec!(101))],
        );
        let result = adapter
            .fetch_bars(
                &Symbol::from("AAPL"),
                Timeframe::D1,
                RangeSpec::new(t0, t0 + chrono::Duration::hours(1)),
            )
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }
}
