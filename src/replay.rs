//! Scripted replays
//!
//! A script is a JSON document with an optional start time and a list of
//! commands. Commands run in order against a fresh oracle and engine that
//! share a manual clock, so a replay is fully deterministic. A command that
//! fails is reported and the replay moves on.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ConfigError, EngineSettings};
use crate::engine::{Balance, OrderBookEngine, OrderBookError};
use crate::models::{AssetId, AssetPair, Fill, Order, OrderId, OrderSide, TokenConfig, TraderId};
use crate::oracle::{Clock, ManualClock, OracleConfig, OracleError, PriceOracle};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Engine(#[from] OrderBookError),

    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// One scripted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Deposit {
        trader: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    Withdraw {
        trader: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    AuthorizeFeeder {
        caller: TraderId,
        feeder: TraderId,
    },
    /// Publish a quote observed `age_secs` before the current replay time
    SetQuote {
        feeder: TraderId,
        base: AssetId,
        quote: AssetId,
        price: Decimal,
        confidence: u8,
        #[serde(default)]
        age_secs: i64,
    },
    UpdateOracleConfig {
        caller: TraderId,
        config: OracleConfig,
    },
    AdvanceClock {
        secs: i64,
    },
    CreateOrder {
        owner: TraderId,
        base: AssetId,
        quote: AssetId,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        #[serde(default)]
        min_fill: Decimal,
    },
    FillOrder {
        filler: TraderId,
        order_id: OrderId,
        amount: Decimal,
    },
    CancelOrder {
        caller: TraderId,
        order_id: OrderId,
    },
    GetOrder {
        order_id: OrderId,
    },
    Balance {
        trader: TraderId,
        asset: AssetId,
    },
    RefundTokens {
        caller: TraderId,
        asset: AssetId,
    },
    SetMinOrderSize {
        caller: TraderId,
        value: Decimal,
    },
    SetMaxOrderSize {
        caller: TraderId,
        value: Decimal,
    },
    SetMaxPriceDeviation {
        caller: TraderId,
        bps: u32,
    },
    UpdateFeeConfig {
        caller: TraderId,
        base_bps: u32,
        discount_bps: u32,
        recipient: TraderId,
    },
    UpdateTokenConfig {
        caller: TraderId,
        asset: AssetId,
        token: TokenConfig,
    },
    Pause {
        caller: TraderId,
    },
    Unpause {
        caller: TraderId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Replay start time, defaults to the wall clock
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    pub commands: Vec<Command>,
}

impl Script {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// What a successful command produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Order { order: Order },
    Fill { order: Order, fill: Fill },
    Balance { balance: Balance },
    Refunded { amount: Decimal },
}

/// A command that did not go through
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub executed: usize,
    pub failures: Vec<Failure>,
}

/// Oracle and engine wired to one manual clock
pub struct Replay {
    clock: Arc<ManualClock>,
    oracle: Arc<PriceOracle>,
    engine: Arc<OrderBookEngine>,
}

impl Replay {
    /// Environment for `script`, with the event channel sized so a
    /// subscriber draining after the run misses nothing. Every command
    /// emits at most one event.
    pub fn for_script(settings: &EngineSettings, script: &Script) -> Result<Self, ReplayError> {
        let mut settings = settings.clone();
        settings.event_capacity = settings.event_capacity.max(script.commands.len() + 1);
        Self::new(&settings, script.start.unwrap_or_else(Utc::now))
    }

    pub fn new(settings: &EngineSettings, start: DateTime<Utc>) -> Result<Self, ReplayError> {
        settings.validate()?;
        let clock = Arc::new(ManualClock::new(start));
        let oracle = Arc::new(PriceOracle::new(
            settings.admin.clone(),
            settings.oracle.clone(),
            clock.clone(),
        )?);
        let engine = Arc::new(OrderBookEngine::with_event_capacity(
            settings.admin.clone(),
            settings.market_config(),
            oracle.clone(),
            clock.clone(),
            settings.event_capacity,
        ));
        tracing::info!(network = ?settings.network, admin = %settings.admin, "replay environment ready");
        Ok(Self {
            clock,
            oracle,
            engine,
        })
    }

    pub fn engine(&self) -> &Arc<OrderBookEngine> {
        &self.engine
    }

    pub fn oracle(&self) -> &Arc<PriceOracle> {
        &self.oracle
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn execute(&self, command: &Command) -> Result<Outcome, ReplayError> {
        let engine = &self.engine;
        let outcome = match command {
            Command::Deposit {
                trader,
                asset,
                amount,
            } => Outcome::Balance {
                balance: engine.deposit(trader, asset, *amount)?,
            },
            Command::Withdraw {
                trader,
                asset,
                amount,
            } => Outcome::Balance {
                balance: engine.withdraw(trader, asset, *amount)?,
            },
            Command::AuthorizeFeeder { caller, feeder } => {
                self.oracle.authorize_feeder(caller, feeder.clone())?;
                Outcome::Done
            }
            Command::SetQuote {
                feeder,
                base,
                quote,
                price,
                confidence,
                age_secs,
            } => {
                let observed = self
                    .clock
                    .now()
                    .checked_sub_signed(offset(*age_secs)?)
                    .ok_or_else(|| ReplayError::InvalidCommand(format!("quote age {}s is out of range", age_secs)))?;
                self.oracle.set_quote(
                    feeder,
                    AssetPair::new(base.clone(), quote.clone()),
                    *price,
                    *confidence,
                    observed,
                )?;
                Outcome::Done
            }
            Command::UpdateOracleConfig { caller, config } => {
                self.oracle.update_config(caller, config.clone())?;
                Outcome::Done
            }
            Command::AdvanceClock { secs } => {
                let target = self
                    .clock
                    .now()
                    .checked_add_signed(offset(*secs)?)
                    .ok_or_else(|| ReplayError::InvalidCommand(format!("clock advance of {}s is out of range", secs)))?;
                self.clock.set(target);
                Outcome::Done
            }
            Command::CreateOrder {
                owner,
                base,
                quote,
                side,
                amount,
                price,
                min_fill,
            } => Outcome::Order {
                order: engine.create_order(
                    owner,
                    base.clone(),
                    quote.clone(),
                    *amount,
                    *price,
                    *side,
                    *min_fill,
                )?,
            },
            Command::FillOrder {
                filler,
                order_id,
                amount,
            } => {
                let (order, fill) = engine.fill_order(filler, *order_id, *amount)?;
                Outcome::Fill { order, fill }
            }
            Command::CancelOrder { caller, order_id } => Outcome::Order {
                order: engine.cancel_order(caller, *order_id)?,
            },
            Command::GetOrder { order_id } => Outcome::Order {
                order: engine.get_order(*order_id)?,
            },
            Command::Balance { trader, asset } => Outcome::Balance {
                balance: engine.balance(trader, asset),
            },
            Command::RefundTokens { caller, asset } => Outcome::Refunded {
                amount: engine.refund_tokens(caller, asset)?,
            },
            Command::SetMinOrderSize { caller, value } => {
                engine.set_min_order_size(caller, *value)?;
                Outcome::Done
            }
            Command::SetMaxOrderSize { caller, value } => {
                engine.set_max_order_size(caller, *value)?;
                Outcome::Done
            }
            Command::SetMaxPriceDeviation { caller, bps } => {
                engine.set_max_price_deviation(caller, *bps)?;
                Outcome::Done
            }
            Command::UpdateFeeConfig {
                caller,
                base_bps,
                discount_bps,
                recipient,
            } => {
                engine.update_fee_config(caller, *base_bps, *discount_bps, recipient.clone())?;
                Outcome::Done
            }
            Command::UpdateTokenConfig {
                caller,
                asset,
                token,
            } => {
                engine.update_token_config(caller, asset.clone(), token.clone())?;
                Outcome::Done
            }
            Command::Pause { caller } => {
                engine.pause(caller)?;
                Outcome::Done
            }
            Command::Unpause { caller } => {
                engine.unpause(caller)?;
                Outcome::Done
            }
        };
        Ok(outcome)
    }

    /// Run every command, logging failures and carrying on
    pub fn run(&self, script: &Script) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        for (index, command) in script.commands.iter().enumerate() {
            match self.execute(command) {
                Ok(outcome) => {
                    summary.executed += 1;
                    tracing::debug!(index, ?outcome, "command executed");
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "command failed");
                    summary.failures.push(Failure {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }
        summary
    }
}

fn offset(secs: i64) -> Result<Duration, ReplayError> {
    Duration::try_seconds(secs).ok_or_else(|| ReplayError::InvalidCommand(format!("{} seconds is out of range", secs)))
}
