//! Configuration module for the friendbot
//!
//! Configuration is loaded once at startup from a TOML file, then overridden
//! by environment variables (a `.env` file is honored), then validated.
//! Zero values for the pool settings fall back to their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bootstrap::BootstrapSettings;
use crate::ledger::PollConfig;
use crate::types::parse_amount;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// `S...` seed of the funding account
    #[serde(default)]
    pub friendbot_secret: String,

    #[serde(default)]
    pub network_passphrase: String,

    #[serde(default)]
    pub horizon_url: String,

    /// When set, the RPC backend is used instead of Horizon
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Amount sent to each destination, e.g. "10000.00"
    #[serde(default)]
    pub starting_balance: String,

    #[serde(default = "default_num_minions")]
    pub num_minions: usize,

    #[serde(default = "default_minion_batch_size")]
    pub minion_batch_size: usize,

    #[serde(default = "default_submit_tx_retries_allowed")]
    pub submit_tx_retries_allowed: usize,

    /// Starting balance of each channel account
    #[serde(default = "default_minion_balance")]
    pub minion_balance: String,

    /// Per-operation inclusion fee in stroops
    #[serde(default = "default_base_fee")]
    pub base_fee: u32,

    /// HTTP request timeout towards the ledger backend
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Delay between bootstrap batch retries
    #[serde(default = "default_bootstrap_retry_delay_ms")]
    pub bootstrap_retry_delay_ms: u64,

    #[serde(default)]
    pub rpc_poll: RpcPollSettings,
}

/// Polling schedule for the RPC backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcPollSettings {
    #[serde(default = "default_poll_initial_ms")]
    pub initial_interval_ms: u64,

    #[serde(default = "default_poll_max_ms")]
    pub max_interval_ms: u64,

    #[serde(default = "default_poll_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for RpcPollSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_poll_initial_ms(),
            max_interval_ms: default_poll_max_ms(),
            deadline_secs: default_poll_deadline_secs(),
        }
    }
}

// Default value functions
fn default_port() -> u16 { 8004 }
fn default_num_minions() -> usize { 1000 }
fn default_minion_batch_size() -> usize { 50 }
fn default_submit_tx_retries_allowed() -> usize { 5 }
fn default_minion_balance() -> String { "101.00".to_string() }
fn default_base_fee() -> u32 { 100 }
fn default_request_timeout_secs() -> u64 { 60 }
fn default_bootstrap_retry_delay_ms() -> u64 { 1000 }
fn default_poll_initial_ms() -> u64 { 500 }
fn default_poll_max_ms() -> u64 { 4000 }
fn default_poll_deadline_secs() -> u64 { 30 }

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            friendbot_secret: String::new(),
            network_passphrase: String::new(),
            horizon_url: String::new(),
            rpc_url: None,
            starting_balance: String::new(),
            num_minions: default_num_minions(),
            minion_batch_size: default_minion_batch_size(),
            submit_tx_retries_allowed: default_submit_tx_retries_allowed(),
            minion_balance: default_minion_balance(),
            base_fee: default_base_fee(),
            request_timeout_secs: default_request_timeout_secs(),
            bootstrap_retry_delay_ms: default_bootstrap_retry_delay_ms(),
            rpc_poll: RpcPollSettings::default(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load from `path` (or defaults when absent), apply `.env` and process
    /// environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using environment only");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Override settings from `lookup`, keyed by upper-case variable name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |field: &'static str, value: String| -> Result<usize, ConfigError> {
            value.trim().parse().map_err(|e| ConfigError::Invalid {
                field,
                reason: format!("{value:?}: {e}"),
            })
        };

        if let Some(v) = lookup("FRIENDBOT_SECRET") {
            self.friendbot_secret = v;
        }
        if let Some(v) = lookup("NETWORK_PASSPHRASE") {
            self.network_passphrase = v;
        }
        if let Some(v) = lookup("HORIZON_URL") {
            self.horizon_url = v;
        }
        if let Some(v) = lookup("RPC_URL") {
            self.rpc_url = Some(v).filter(|url| !url.trim().is_empty());
        }
        if let Some(v) = lookup("STARTING_BALANCE") {
            self.starting_balance = v;
        }
        if let Some(v) = lookup("NUM_MINIONS") {
            self.num_minions = parse("num_minions", v)?;
        }
        if let Some(v) = lookup("MINION_BATCH_SIZE") {
            self.minion_batch_size = parse("minion_batch_size", v)?;
        }
        if let Some(v) = lookup("SUBMIT_TX_RETRIES_ALLOWED") {
            self.submit_tx_retries_allowed = parse("submit_tx_retries_allowed", v)?;
        }
        if let Some(v) = lookup("BASE_FEE") {
            let fee = parse("base_fee", v)?;
            self.base_fee = u32::try_from(fee).map_err(|e| ConfigError::Invalid {
                field: "base_fee",
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = lookup("PORT") {
            let port = parse("port", v)?;
            self.port = u16::try_from(port).map_err(|e| ConfigError::Invalid {
                field: "port",
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Replace zero pool settings with their defaults
    pub fn normalize(&mut self) {
        if self.num_minions == 0 {
            self.num_minions = default_num_minions();
        }
        if self.minion_batch_size == 0 {
            self.minion_batch_size = default_minion_batch_size();
        }
        if self.submit_tx_retries_allowed == 0 {
            self.submit_tx_retries_allowed = default_submit_tx_retries_allowed();
        }
        if self.minion_balance.trim().is_empty() {
            self.minion_balance = default_minion_balance();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.friendbot_secret.trim().is_empty() {
            return Err(ConfigError::Missing("friendbot_secret"));
        }
        if self.network_passphrase.trim().is_empty() {
            return Err(ConfigError::Missing("network_passphrase"));
        }
        if self.horizon_url.trim().is_empty() && self.rpc_url.is_none() {
            return Err(ConfigError::Missing("horizon_url or rpc_url"));
        }
        if self.starting_balance.trim().is_empty() {
            return Err(ConfigError::Missing("starting_balance"));
        }
        if self.starting_balance_stroops()? == 0 {
            return Err(ConfigError::Invalid {
                field: "starting_balance",
                reason: "must be positive".into(),
            });
        }
        self.minion_balance_stroops()?;
        if self.rpc_poll.initial_interval_ms == 0 || self.rpc_poll.deadline_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "rpc_poll",
                reason: "intervals and deadline must be positive".into(),
            });
        }
        if self.rpc_poll.max_interval_ms < self.rpc_poll.initial_interval_ms {
            return Err(ConfigError::Invalid {
                field: "rpc_poll",
                reason: format!(
                    "max_interval_ms {} is below initial_interval_ms {}",
                    self.rpc_poll.max_interval_ms, self.rpc_poll.initial_interval_ms
                ),
            });
        }
        Ok(())
    }

    pub fn starting_balance_stroops(&self) -> Result<i64, ConfigError> {
        parse_amount(&self.starting_balance).map_err(|e| ConfigError::Invalid {
            field: "starting_balance",
            reason: e.to_string(),
        })
    }

    pub fn minion_balance_stroops(&self) -> Result<i64, ConfigError> {
        parse_amount(&self.minion_balance).map_err(|e| ConfigError::Invalid {
            field: "minion_balance",
            reason: e.to_string(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            initial_interval: Duration::from_millis(self.rpc_poll.initial_interval_ms),
            max_interval: Duration::from_millis(self.rpc_poll.max_interval_ms),
            deadline: Duration::from_secs(self.rpc_poll.deadline_secs),
            jitter_factor: 0.0,
        }
    }

    pub fn bootstrap_settings(&self) -> Result<BootstrapSettings, ConfigError> {
        Ok(BootstrapSettings {
            num_minions: self.num_minions,
            batch_size: self.minion_batch_size,
            submit_retries: self.submit_tx_retries_allowed,
            minion_balance: self.minion_balance_stroops()?,
            retry_delay: Duration::from_millis(self.bootstrap_retry_delay_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
        port = 8004
        friendbot_secret = "SCWNLYELENPBXN46FHYXETT5LJCYBZD5VUQQVW4KZPHFO2YTQJUWT4D5"
        network_passphrase = "Test SDF Network ; September 2015"
        horizon_url = "https://horizon-testnet.stellar.org"
        starting_balance = "10000.00"
        num_minions = 1000
        base_fee = 100000
        minion_batch_size = 50
        submit_tx_retries_allowed = 5
    "#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.base_fee, 100_000);
        assert_eq!(config.minion_balance, "101.00");
        assert_eq!(config.starting_balance_stroops().unwrap(), 100_000_000_000);
        assert!(config.rpc_url.is_none());
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let mut config = Config::from_toml(
            "num_minions = 0\nminion_batch_size = 0\nsubmit_tx_retries_allowed = 0",
        )
        .unwrap();
        config.normalize();
        assert_eq!(config.num_minions, 1000);
        assert_eq!(config.minion_batch_size, 50);
        assert_eq!(config.submit_tx_retries_allowed, 5);
    }

    #[test]
    fn test_missing_required_settings() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("friendbot_secret"))
        ));

        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.horizon_url.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
        config.rpc_url = Some("http://localhost:8000/soroban/rpc".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RPC_URL", "http://localhost:8000/rpc"),
            ("NUM_MINIONS", "8"),
            ("STARTING_BALANCE", "50"),
        ]);
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.rpc_url.as_deref(), Some("http://localhost:8000/rpc"));
        assert_eq!(config.num_minions, 8);
        assert_eq!(config.starting_balance_stroops().unwrap(), 500_000_000);

        let err = config
            .apply_overrides(|k| (k == "PORT").then(|| "99999".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "port", .. }));
    }

    #[test]
    fn test_invalid_starting_balance() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.starting_balance = "ten".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "starting_balance", .. })
        ));
    }

    #[test]
    fn test_poll_cap_below_initial_interval_rejected() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.rpc_poll.initial_interval_ms = 500;
        config.rpc_poll.max_interval_ms = 100;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "rpc_poll", .. }));
        assert!(err.to_string().contains("max_interval_ms 100"));

        config.rpc_poll.max_interval_ms = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.port, 8004);

        let settings = config.bootstrap_settings().unwrap();
        assert_eq!(settings.minion_balance, 1_010_000_000);
        assert_eq!(settings.batch_size, 50);
    }
}
