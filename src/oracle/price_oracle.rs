//! Latest-quote price oracle
//!
//! Holds one quote per asset pair and decides whether it can be trusted.
//! Only authorized feeders may publish; every publish overwrites the
//! previous observation for that pair.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{AssetPair, TraderId};

use super::clock::Clock;

/// Highest confidence score a feeder may report
pub const MAX_CONFIDENCE: u8 = 100;

/// Oracle trust thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Quotes older than this are stale
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: i64,

    /// Quotes below this confidence are unusable
    #[serde(default = "default_min_confidence")]
    pub min_confidence: u8,
}

fn default_max_price_age() -> i64 {
    3600
}

fn default_min_confidence() -> u8 {
    80
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_price_age_secs: default_max_price_age(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl OracleConfig {
    pub fn validate(&self) -> Result<(), OracleError> {
        if self.max_price_age_secs <= 0 {
            return Err(OracleError::InvalidConfig(format!(
                "max price age must be positive, got: {}",
                self.max_price_age_secs
            )));
        }
        if self.min_confidence > MAX_CONFIDENCE {
            return Err(OracleError::InvalidConfidence(self.min_confidence));
        }
        Ok(())
    }
}

/// A single price observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Decimal,
    pub confidence: u8,
    pub timestamp: DateTime<Utc>,
}

/// Why a quote can or cannot be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuoteUsability {
    Usable,
    Stale { age_secs: i64 },
    LowConfidence { confidence: u8, minimum: u8 },
}

/// Quote as seen by a reader at a given instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteView {
    pub pair: AssetPair,
    pub price: Decimal,
    pub confidence: u8,
    pub timestamp: DateTime<Utc>,
    pub usability: QuoteUsability,
}

impl QuoteView {
    pub fn is_usable(&self) -> bool {
        self.usability == QuoteUsability::Usable
    }
}

/// Read side of the oracle, the only part the validator depends on
pub trait QuoteSource: Send + Sync {
    /// `None` if no quote was ever recorded for the pair
    fn get_quote(&self, pair: &AssetPair) -> Option<QuoteView>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("Caller {0} is not authorized")]
    Unauthorized(TraderId),

    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),

    #[error("Confidence {0} exceeds {MAX_CONFIDENCE}")]
    InvalidConfidence(u8),

    #[error("Quote timestamp {timestamp} is ahead of oracle time {now}")]
    FutureTimestamp {
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Invalid oracle config: {0}")]
    InvalidConfig(String),
}

/// Thread-safe price oracle
pub struct PriceOracle {
    admin: TraderId,
    feeders: RwLock<HashSet<TraderId>>,
    config: RwLock<OracleConfig>,
    quotes: DashMap<AssetPair, PriceQuote>,
    clock: Arc<dyn Clock>,
}

impl PriceOracle {
    /// Create an oracle. The admin is also the first authorized feeder.
    pub fn new(
        admin: TraderId,
        config: OracleConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OracleError> {
        config.validate()?;
        let mut feeders = HashSet::new();
        feeders.insert(admin.clone());
        Ok(Self {
            admin,
            feeders: RwLock::new(feeders),
            config: RwLock::new(config),
            quotes: DashMap::new(),
            clock,
        })
    }

    fn ensure_admin(&self, caller: &TraderId) -> Result<(), OracleError> {
        if *caller != self.admin {
            return Err(OracleError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    pub fn authorize_feeder(&self, caller: &TraderId, feeder: TraderId) -> Result<(), OracleError> {
        self.ensure_admin(caller)?;
        tracing::info!(feeder = %feeder, "oracle feeder authorized");
        self.feeders.write().insert(feeder);
        Ok(())
    }

    pub fn revoke_feeder(&self, caller: &TraderId, feeder: &TraderId) -> Result<(), OracleError> {
        self.ensure_admin(caller)?;
        tracing::info!(feeder = %feeder, "oracle feeder revoked");
        self.feeders.write().remove(feeder);
        Ok(())
    }

    pub fn is_feeder(&self, who: &TraderId) -> bool {
        self.feeders.read().contains(who)
    }

    pub fn update_config(&self, caller: &TraderId, config: OracleConfig) -> Result<(), OracleError> {
        self.ensure_admin(caller)?;
        config.validate()?;
        tracing::info!(
            max_price_age_secs = config.max_price_age_secs,
            min_confidence = config.min_confidence,
            "oracle config updated"
        );
        *self.config.write() = config;
        Ok(())
    }

    pub fn config(&self) -> OracleConfig {
        self.config.read().clone()
    }

    /// Publish the latest observation for a pair, replacing any previous one
    pub fn set_quote(
        &self,
        feeder: &TraderId,
        pair: AssetPair,
        price: Decimal,
        confidence: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<(), OracleError> {
        if !self.is_feeder(feeder) {
            return Err(OracleError::Unauthorized(feeder.clone()));
        }
        if price <= Decimal::ZERO {
            return Err(OracleError::InvalidPrice(price));
        }
        if confidence > MAX_CONFIDENCE {
            return Err(OracleError::InvalidConfidence(confidence));
        }
        let now = self.clock.now();
        if timestamp > now {
            return Err(OracleError::FutureTimestamp { timestamp, now });
        }

        tracing::debug!(pair = %pair, %price, confidence, "quote updated");
        self.quotes.insert(
            pair,
            PriceQuote {
                price,
                confidence,
                timestamp,
            },
        );
        Ok(())
    }

    fn usability(&self, quote: &PriceQuote, now: DateTime<Utc>) -> QuoteUsability {
        let config = self.config.read();
        let age = now - quote.timestamp;
        // Compare full durations; whole seconds would hide a fractional overrun
        let stale = Duration::try_seconds(config.max_price_age_secs).map_or(false, |max| age > max);
        if stale {
            QuoteUsability::Stale {
                age_secs: age.num_seconds(),
            }
        } else if quote.confidence < config.min_confidence {
            QuoteUsability::LowConfidence {
                confidence: quote.confidence,
                minimum: config.min_confidence,
            }
        } else {
            QuoteUsability::Usable
        }
    }
}

impl QuoteSource for PriceOracle {
    fn get_quote(&self, pair: &AssetPair) -> Option<QuoteView> {
        let quote = *self.quotes.get(pair)?;
        let usability = self.usability(&quote, self.clock.now());
        Some(QuoteView {
            pair: pair.clone(),
            price: quote.price,
            confidence: quote.confidence,
            timestamp: quote.timestamp,
            usability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetId;
    use crate::oracle::ManualClock;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn pair() -> AssetPair {
        AssetPair::new(AssetId::new("WETH"), AssetId::new("USDC"))
    }

    fn oracle() -> (PriceOracle, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let oracle =
            PriceOracle::new(TraderId::new("admin"), OracleConfig::default(), clock.clone()).unwrap();
        (oracle, clock)
    }

    #[test]
    fn test_missing_quote() {
        let (oracle, _) = oracle();
        assert!(oracle.get_quote(&pair()).is_none());
    }

    #[test]
    fn test_fresh_quote_is_usable() {
        let (oracle, clock) = oracle();
        let admin = TraderId::new("admin");
        oracle
            .set_quote(&admin, pair(), dec!(2), 95, clock.now())
            .unwrap();

        let view = oracle.get_quote(&pair()).unwrap();
        assert!(view.is_usable());
        assert_eq!(view.price, dec!(2));
        assert_eq!(view.confidence, 95);
    }

    #[test]
    fn test_quote_goes_stale() {
        let (oracle, clock) = oracle();
        let admin = TraderId::new("admin");
        oracle
            .set_quote(&admin, pair(), dec!(2), 95, clock.now())
            .unwrap();

        clock.advance(Duration::seconds(3600));
        assert!(oracle.get_quote(&pair()).unwrap().is_usable());

        clock.advance(Duration::seconds(1));
        let view = oracle.get_quote(&pair()).unwrap();
        assert_eq!(view.usability, QuoteUsability::Stale { age_secs: 3601 });
    }

    #[test]
    fn test_fractional_second_overrun_is_stale() {
        let (oracle, clock) = oracle();
        let admin = TraderId::new("admin");
        oracle
            .set_quote(&admin, pair(), dec!(2), 95, clock.now())
            .unwrap();

        clock.advance(Duration::milliseconds(3_600_500));
        let view = oracle.get_quote(&pair()).unwrap();
        assert!(!view.is_usable());
        assert!(matches!(view.usability, QuoteUsability::Stale { age_secs: 3600 }));
    }

    #[test]
    fn test_low_confidence() {
        let (oracle, clock) = oracle();
        let admin = TraderId::new("admin");
        oracle
            .set_quote(&admin, pair(), dec!(2), 79, clock.now())
            .unwrap();

        let view = oracle.get_quote(&pair()).unwrap();
        assert_eq!(
            view.usability,
            QuoteUsability::LowConfidence {
                confidence: 79,
                minimum: 80
            }
        );
    }

    #[test]
    fn test_only_feeders_publish() {
        let (oracle, clock) = oracle();
        let admin = TraderId::new("admin");
        let feeder = TraderId::new("feeder");

        let err = oracle
            .set_quote(&feeder, pair(), dec!(2), 90, clock.now())
            .unwrap_err();
        assert_eq!(err, OracleError::Unauthorized(feeder.clone()));

        oracle.authorize_feeder(&admin, feeder.clone()).unwrap();
        oracle
            .set_quote(&feeder, pair(), dec!(2), 90, clock.now())
            .unwrap();

        oracle.revoke_feeder(&admin, &feeder).unwrap();
        assert!(!oracle.is_feeder(&feeder));

        // Only the admin manages feeders
        assert!(oracle.authorize_feeder(&feeder, feeder.clone()).is_err());
    }

    #[test]
    fn test_set_quote_overwrites() {
        let (oracle, clock) = oracle();
        let admin = TraderId::new("admin");
        oracle
            .set_quote(&admin, pair(), dec!(2), 90, clock.now())
            .unwrap();
        oracle
            .set_quote(&admin, pair(), dec!(3), 85, clock.now())
            .unwrap();

        let view = oracle.get_quote(&pair()).unwrap();
        assert_eq!(view.price, dec!(3));
        assert_eq!(view.confidence, 85);
    }

    #[test]
    fn test_rejects_bad_quotes() {
        let (oracle, clock) = oracle();
        let admin = TraderId::new("admin");

        assert_eq!(
            oracle.set_quote(&admin, pair(), dec!(0), 90, clock.now()),
            Err(OracleError::InvalidPrice(dec!(0)))
        );
        assert_eq!(
            oracle.set_quote(&admin, pair(), dec!(2), 101, clock.now()),
            Err(OracleError::InvalidConfidence(101))
        );
        assert!(matches!(
            oracle.set_quote(&admin, pair(), dec!(2), 90, clock.now() + Duration::seconds(5)),
            Err(OracleError::FutureTimestamp { .. })
        ));
    }

    #[test]
    fn test_update_config() {
        let (oracle, clock) = oracle();
        let admin = TraderId::new("admin");
        oracle
            .set_quote(&admin, pair(), dec!(2), 85, clock.now())
            .unwrap();

        oracle
            .update_config(
                &admin,
                OracleConfig {
                    max_price_age_secs: 60,
                    min_confidence: 90,
                },
            )
            .unwrap();
        assert!(!oracle.get_quote(&pair()).unwrap().is_usable());

        let bad = OracleConfig {
            max_price_age_secs: 0,
            min_confidence: 90,
        };
        assert!(matches!(
            oracle.update_config(&admin, bad),
            Err(OracleError::InvalidConfig(_))
        ));
    }
}
