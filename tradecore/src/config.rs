use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    pub key: Option<String>,
    pub secret: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    pub key: Option<String>,
}

/// Typed configuration assembled from environment variables and an
/// optional TOML file (§6). Environment variables always win over the file
/// so an operator can override a single setting at deploy time without
/// editing the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub db_url: Option<String>,
    pub data_store_path: Option<PathBuf>,
    pub model_blob_path: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub brokers: BTreeMap<String, BrokerConfig>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load from an optional TOML file, then let environment variables
    /// override any field the file set.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
                toml::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?
            }
            None => AppConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = AppConfig::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("DB_URL") {
            self.db_url = Some(v);
        }
        if let Ok(v) = std::env::var("DATA_STORE_PATH") {
            self.data_store_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("MODEL_BLOB_PATH") {
            self.model_blob_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("JWT_SECRET") {
            self.jwt_secret = Some(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log_level = v;
        }

        for (key, value) in std::env::vars() {
            if let Some(rest) = key.strip_prefix("BROKER_") {
                if let Some((id, field)) = rest.rsplit_once('_') {
                    let entry = self.brokers.entry(id.to_lowercase()).or_default();
                    match field {
                        "KEY" => entry.key = Some(value),
                        "SECRET" => entry.secret = Some(value),
                        "ENDPOINT" => entry.endpoint = Some(value),
                        _ => {}
                    }
                }
            } else if let Some(rest) = key.strip_prefix("PROVIDER_") {
                if let Some(id) = rest.strip_suffix("_KEY") {
                    self.providers.entry(id.to_lowercase()).or_default().key = Some(value);
                }
            }
        }
    }

    pub fn data_store_path(&self) -> PathBuf {
        self.data_store_path.clone().unwrap_or_else(|| PathBuf::from("./data"))
    }

    pub fn model_blob_path(&self) -> PathBuf {
        self.model_blob_path.clone().unwrap_or_else(|| PathBuf::from("./models"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn env_vars_populate_broker_and_provider_tables() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("BROKER_ALPACA_KEY", "k");
        std::env::set_var("BROKER_ALPACA_SECRET", "s");
        std::env::set_var("PROVIDER_IEX_KEY", "p");

        let config = AppConfig::from_env();
        assert_eq!(config.brokers.get("alpaca").unwrap().key.as_deref(), Some("k"));
        assert_eq!(config.brokers.get("alpaca").unwrap().secret.as_deref(), Some("s"));
        assert_eq!(config.providers.get("iex").unwrap().key.as_deref(), Some("p"));

        std::env::remove_var("BROKER_ALPACA_KEY");
        std::env::remove_var("BROKER_ALPACA_SECRET");
        std::env::remove_var("PROVIDER_IEX_KEY");
    }

    #[test]
    fn env_overrides_file_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradecore.toml");
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();

        std::env::set_var("LOG_LEVEL", "debug");
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.log_level, "debug");
        std::env::remove_var("LOG_LEVEL");
    }
}
