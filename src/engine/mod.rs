//! Order Book Engine Module
//!
//! This module contains the custodial order book:
//! - `errors` - Error types for order book operations
//! - `validation` - Order admission and fill-time checks
//! - `escrow` - Per-trader custody ledger
//! - `fees` - Fee calculation utilities
//! - `audit` - Append-only event log with live subscribers
//! - `orderbook` - Main order book engine

pub mod audit;
pub mod errors;
pub mod escrow;
pub mod fees;
pub mod orderbook;
pub mod validation;

// Re-export commonly used types for convenience
pub use audit::{AuditLog, DEFAULT_EVENT_CAPACITY};
pub use errors::{Bucket, EscrowError, OrderBookError, RejectReason};
pub use escrow::{Balance, EscrowLedger, LedgerOp};
pub use fees::{compute_fee, max_fee, total_fees};
pub use orderbook::{ConservationViolation, OrderBookEngine};
pub use validation::{OrderRequest, OrderValidator};
