use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, AssetPair, OrderId, TraderId};
use super::order::{OrderSide, OrderStatus};

/// State transitions the engine reports to observers and auditors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    OrderCreated {
        order_id: OrderId,
        owner: TraderId,
        pair: AssetPair,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        min_fill: Decimal,
        escrow_asset: AssetId,
        escrow_amount: Decimal,
    },
    OrderFilled {
        order_id: OrderId,
        filler: TraderId,
        fill_amount: Decimal,
        notional: Decimal,
        fee: Decimal,
        remaining: Decimal,
        status: OrderStatus,
    },
    OrderCancelled {
        order_id: OrderId,
        owner: TraderId,
        refund_asset: AssetId,
        refunded: Decimal,
    },
    TokensRefunded {
        trader: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    Deposited {
        trader: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    Withdrawn {
        trader: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    FeeConfigUpdated {
        base_bps: u32,
        discount_bps: u32,
        recipient: TraderId,
    },
    MinOrderSizeUpdated {
        value: Decimal,
    },
    MaxOrderSizeUpdated {
        value: Decimal,
    },
    PriceDeviationUpdated {
        max_price_deviation_bps: u32,
    },
    TokenConfigUpdated {
        asset: AssetId,
        enabled: bool,
        min_size: Decimal,
        max_size: Decimal,
        decimals: u32,
    },
    Paused {
        by: TraderId,
    },
    Unpaused {
        by: TraderId,
    },
}

impl EngineEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::OrderCreated { .. } => "OrderCreated",
            EngineEvent::OrderFilled { .. } => "OrderFilled",
            EngineEvent::OrderCancelled { .. } => "OrderCancelled",
            EngineEvent::TokensRefunded { .. } => "TokensRefunded",
            EngineEvent::Deposited { .. } => "Deposited",
            EngineEvent::Withdrawn { .. } => "Withdrawn",
            EngineEvent::FeeConfigUpdated { .. } => "FeeConfigUpdated",
            EngineEvent::MinOrderSizeUpdated { .. } => "MinOrderSizeUpdated",
            EngineEvent::MaxOrderSizeUpdated { .. } => "MaxOrderSizeUpdated",
            EngineEvent::PriceDeviationUpdated { .. } => "PriceDeviationUpdated",
            EngineEvent::TokenConfigUpdated { .. } => "TokenConfigUpdated",
            EngineEvent::Paused { .. } => "Paused",
            EngineEvent::Unpaused { .. } => "Unpaused",
        }
    }

    /// Order the event refers to, if any
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            EngineEvent::OrderCreated { order_id, .. }
            | EngineEvent::OrderFilled { order_id, .. }
            | EngineEvent::OrderCancelled { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }
}

/// One entry of the engine's append-only audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// Market config version in force when the event was produced
    pub config_version: u64,
    #[serde(flatten)]
    pub event: EngineEvent,
}
