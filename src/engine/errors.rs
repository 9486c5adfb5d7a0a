//! Error types for order book operations
//!
//! This module centralizes the error taxonomy of the engine: validator
//! rejections, ledger failures and order state errors all surface to the
//! caller as one `OrderBookError`.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::{AssetId, OrderId, TraderId};

/// Why the validator refused an order or a fill
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("token {asset} is not enabled for trading")]
    TokenDisabled { asset: AssetId },

    #[error("size {quantity} of {asset} outside [{min}, {max}]")]
    SizeOutOfBounds {
        asset: AssetId,
        quantity: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("price {price} deviates {deviation_bps} bps from oracle {reference} (max {max_bps})")]
    PriceOutOfBand {
        price: Decimal,
        reference: Decimal,
        deviation_bps: Decimal,
        max_bps: u32,
    },

    #[error("oracle quote is stale or missing")]
    StaleOracle,

    #[error("oracle confidence {confidence} below {minimum}")]
    LowConfidence { confidence: u8, minimum: u8 },
}

/// Which escrow bucket a ledger operation drew from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    /// Deposited funds not backing any order
    Available,
    /// Funds held for active orders
    Locked,
}

/// Errors raised by the escrow ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    #[error("insufficient {bucket:?} {asset} for {trader}: required {required}, held {held}")]
    InsufficientEscrow {
        trader: TraderId,
        asset: AssetId,
        bucket: Bucket,
        required: Decimal,
        held: Decimal,
    },

    #[error("ledger amounts must be positive, got: {0}")]
    InvalidAmount(Decimal),

    #[error("{bucket:?} {asset} balance of {trader} would overflow")]
    Overflow {
        trader: TraderId,
        asset: AssetId,
        bucket: Bucket,
    },
}

/// Errors that can occur during order book operations
///
/// # Error Categories
///
/// - **Validation Errors**: `ValidationRejected`, `InvalidPrice`, `InvalidQuantity`, `InvalidPair`, `FillBelowMinimum`
/// - **State Errors**: `OrderNotFound`, `OrderNotActive`, `Paused`, `NotPaused`
/// - **Authorization Errors**: `NotOwner`, `Unauthorized`
/// - **Escrow Errors**: `InsufficientEscrow`, `EscrowLockFailed`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderBookError {
    /// The validator refused the order or fill
    #[error("Validation rejected: {0}")]
    ValidationRejected(#[from] RejectReason),

    /// Order with the specified ID was never created
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order is already filled or cancelled
    #[error("Order already filled or cancelled: {0}")]
    OrderNotActive(OrderId),

    /// Only the order's owner may cancel it
    #[error("Caller {caller} does not own order {order_id}")]
    NotOwner { order_id: OrderId, caller: TraderId },

    /// Fill smaller than the order's minimum fill
    #[error("Fill {fill_amount} below minimum {minimum} for order {order_id}")]
    FillBelowMinimum {
        order_id: OrderId,
        fill_amount: Decimal,
        minimum: Decimal,
    },

    /// The counter-party or the ledger could not cover a movement
    #[error("Insufficient escrow: {0}")]
    InsufficientEscrow(#[source] EscrowError),

    /// Escrow for a new order could not be locked
    #[error("Escrow lock failed: {0}")]
    EscrowLockFailed(#[source] EscrowError),

    /// Trading is paused
    #[error("Order book is paused")]
    Paused,

    /// Unpause requested while trading is running
    #[error("Order book is not paused")]
    NotPaused,

    /// Administrative call from a non-admin identity
    #[error("Caller {0} is not authorized")]
    Unauthorized(TraderId),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid pair: {0}")]
    InvalidPair(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl OrderBookError {
    /// Returns true if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            OrderBookError::ValidationRejected(_)
                | OrderBookError::InvalidPrice(_)
                | OrderBookError::InvalidQuantity(_)
                | OrderBookError::InvalidPair(_)
                | OrderBookError::FillBelowMinimum { .. }
        )
    }

    /// Returns true if this is a state error (order doesn't exist or wrong state)
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            OrderBookError::OrderNotFound(_)
                | OrderBookError::OrderNotActive(_)
                | OrderBookError::Paused
                | OrderBookError::NotPaused
        )
    }

    /// Returns true if the caller lacked the right to perform the operation
    pub fn is_authorization_error(&self) -> bool {
        matches!(
            self,
            OrderBookError::NotOwner { .. } | OrderBookError::Unauthorized(_)
        )
    }

    /// Returns true if the ledger refused to move funds
    pub fn is_escrow_error(&self) -> bool {
        matches!(
            self,
            OrderBookError::InsufficientEscrow(_) | OrderBookError::EscrowLockFailed(_)
        )
    }

    /// The validator rejection reason, if this is one
    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            OrderBookError::ValidationRejected(reason) => Some(reason),
            _ => None,
        }
    }
}
