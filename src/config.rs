//! Engine settings
//!
//! Settings come from a JSON file or from environment variables (a `.env`
//! file is honoured). Unset market limits fall back to the selected network
//! preset.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::engine::DEFAULT_EVENT_CAPACITY;
use crate::models::{AssetId, FeeConfig, MarketConfig, TokenConfig, TraderId, BPS_DENOMINATOR};
use crate::oracle::OracleConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Deployment profile with its default market limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPreset {
    Base,
    BaseGoerli,
    #[default]
    Localhost,
}

/// Order size and price band limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketLimits {
    pub min_order_size: Decimal,
    pub max_order_size: Decimal,
    pub max_price_deviation_bps: u32,
}

impl NetworkPreset {
    pub fn limits(&self) -> MarketLimits {
        match self {
            NetworkPreset::Base => MarketLimits {
                min_order_size: dec!(0.1),
                max_order_size: dec!(1000),
                max_price_deviation_bps: 1000,
            },
            NetworkPreset::BaseGoerli => MarketLimits {
                min_order_size: dec!(0.01),
                max_order_size: dec!(100),
                max_price_deviation_bps: 2000,
            },
            NetworkPreset::Localhost => MarketLimits {
                min_order_size: dec!(0.001),
                max_order_size: dec!(1000),
                max_price_deviation_bps: 5000,
            },
        }
    }
}

impl FromStr for NetworkPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(NetworkPreset::Base),
            "base_goerli" | "basegoerli" | "base-goerli" => Ok(NetworkPreset::BaseGoerli),
            "localhost" | "local" => Ok(NetworkPreset::Localhost),
            _ => Err(ConfigError::InvalidValue {
                key: "ORDERBOOK_NETWORK".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Everything needed to stand up an oracle and an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub network: NetworkPreset,

    /// Identity allowed to run administrative operations
    #[serde(default = "default_admin")]
    pub admin: TraderId,

    #[serde(default)]
    pub oracle: OracleConfig,

    /// Overrides for the preset limits
    #[serde(default)]
    pub min_order_size: Option<Decimal>,
    #[serde(default)]
    pub max_order_size: Option<Decimal>,
    #[serde(default)]
    pub max_price_deviation_bps: Option<u32>,

    #[serde(default = "default_fee")]
    pub fee: FeeConfig,

    #[serde(default)]
    pub tokens: HashMap<AssetId, TokenConfig>,

    /// Capacity of the live audit event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_admin() -> TraderId {
    TraderId::new("admin")
}

fn default_fee() -> FeeConfig {
    FeeConfig::new(0, 0, TraderId::new("treasury"))
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            network: NetworkPreset::default(),
            admin: default_admin(),
            oracle: OracleConfig::default(),
            min_order_size: None,
            max_order_size: None,
            max_price_deviation_bps: None,
            fee: default_fee(),
            tokens: HashMap::new(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineSettings {
    /// Load settings from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup, using environment variable names
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(network) = lookup("ORDERBOOK_NETWORK") {
            settings.network = network.parse()?;
        }
        if let Some(admin) = lookup("ORDERBOOK_ADMIN") {
            settings.admin = TraderId::new(admin);
        }
        settings.min_order_size = parse_var(&lookup, "ORDERBOOK_MIN_ORDER_SIZE")?;
        settings.max_order_size = parse_var(&lookup, "ORDERBOOK_MAX_ORDER_SIZE")?;
        settings.max_price_deviation_bps = parse_var(&lookup, "ORDERBOOK_MAX_PRICE_DEVIATION_BPS")?;
        if let Some(age) = parse_var(&lookup, "ORACLE_MAX_PRICE_AGE_SECS")? {
            settings.oracle.max_price_age_secs = age;
        }
        if let Some(confidence) = parse_var(&lookup, "ORACLE_MIN_CONFIDENCE")? {
            settings.oracle.min_confidence = confidence;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Preset limits with any explicit overrides applied
    pub fn limits(&self) -> MarketLimits {
        let preset = self.network.limits();
        MarketLimits {
            min_order_size: self.min_order_size.unwrap_or(preset.min_order_size),
            max_order_size: self.max_order_size.unwrap_or(preset.max_order_size),
            max_price_deviation_bps: self
                .max_price_deviation_bps
                .unwrap_or(preset.max_price_deviation_bps),
        }
    }

    /// Initial market configuration for the engine
    pub fn market_config(&self) -> MarketConfig {
        let limits = self.limits();
        let mut config = MarketConfig::new(
            self.fee.clone(),
            limits.min_order_size,
            limits.max_order_size,
            limits.max_price_deviation_bps,
        );
        config.tokens = self.tokens.clone();
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.oracle
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let limits = self.limits();
        if limits.min_order_size < Decimal::ZERO || limits.min_order_size > limits.max_order_size {
            return Err(ConfigError::Invalid(format!(
                "order size limits must satisfy 0 <= min <= max, got [{}, {}]",
                limits.min_order_size, limits.max_order_size
            )));
        }
        if self.fee.base_bps > BPS_DENOMINATOR || self.fee.discount_bps > BPS_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "fee rates must not exceed {} bps",
                BPS_DENOMINATOR
            )));
        }
        for (asset, token) in &self.tokens {
            if token.min_size < Decimal::ZERO || token.min_size > token.max_size {
                return Err(ConfigError::Invalid(format!(
                    "token {} bounds must satisfy 0 <= min <= max",
                    asset
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_preset_limits() {
        let settings = EngineSettings {
            network: NetworkPreset::Base,
            ..Default::default()
        };
        let config = settings.market_config();
        assert_eq!(config.min_order_size, dec!(0.1));
        assert_eq!(config.max_order_size, dec!(1000));
        assert_eq!(config.max_price_deviation_bps, 1000);
        assert_eq!(NetworkPreset::BaseGoerli.limits().max_price_deviation_bps, 2000);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ORDERBOOK_NETWORK", "base-goerli"),
            ("ORDERBOOK_MAX_ORDER_SIZE", "50"),
            ("ORACLE_MIN_CONFIDENCE", "90"),
        ]
        .into_iter()
        .collect();

        let settings =
            EngineSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.network, NetworkPreset::BaseGoerli);
        assert_eq!(settings.oracle.min_confidence, 90);
        assert_eq!(settings.oracle.max_price_age_secs, 3600);

        let limits = settings.limits();
        assert_eq!(limits.min_order_size, dec!(0.01));
        assert_eq!(limits.max_order_size, dec!(50));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = EngineSettings::from_lookup(|k| {
            (k == "ORDERBOOK_MAX_PRICE_DEVIATION_BPS").then(|| "ten".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ORDERBOOK_MAX_PRICE_DEVIATION_BPS"));

        let err = EngineSettings::from_lookup(|k| {
            (k == "ORACLE_MIN_CONFIDENCE").then(|| "101".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "network": "base",
                "admin": "ops",
                "fee": {{ "base_bps": 30, "discount_bps": 5, "recipient": "vault" }},
                "tokens": {{
                    "WETH": {{ "enabled": true, "min_size": "0.1", "max_size": "100" }},
                    "USDC": {{ "enabled": true, "min_size": "1", "max_size": "100000", "decimals": 6 }}
                }}
            }}"#
        )
        .unwrap();

        let settings = EngineSettings::from_json_file(file.path()).unwrap();
        assert_eq!(settings.admin, TraderId::new("ops"));
        assert_eq!(settings.event_capacity, DEFAULT_EVENT_CAPACITY);

        let config = settings.market_config();
        assert_eq!(config.fee.effective_bps(), 25);
        assert_eq!(config.decimals(&AssetId::new("USDC")), 6);
        assert_eq!(config.decimals(&AssetId::new("WETH")), 18);
        assert!(config.is_enabled(&AssetId::new("WETH")));
        assert_eq!(config.min_order_size, dec!(0.1));
    }

    #[test]
    fn test_from_json_file_errors() {
        let missing = EngineSettings::from_json_file("/nonexistent/settings.json").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "min_order_size": "10", "max_order_size": "1" }}"#).unwrap();
        assert!(matches!(
            EngineSettings::from_json_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
