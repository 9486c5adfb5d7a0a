//! Order Book Engine
//!
//! This module provides the main `OrderBookEngine` struct which owns order
//! records, the escrow ledger and the market configuration, and runs order
//! creation, counter-party fills, cancellation and refunds.
//!
//! Every mutating call takes the state write lock once, validates fully,
//! and only then touches the ledger, so a failed call leaves no trace.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{
    AssetId, AssetPair, AuditRecord, EngineEvent, Fill, MarketConfig, Order, OrderId, OrderSide,
    OrderStatus, TokenConfig, TraderId, BPS_DENOMINATOR,
};
use crate::oracle::{Clock, QuoteSource};
use crate::utils::decimal::notional;

use super::audit::{AuditLog, DEFAULT_EVENT_CAPACITY};
use super::errors::{EscrowError, OrderBookError};
use super::escrow::{Balance, EscrowLedger, LedgerOp};
use super::fees::{compute_fee, total_fees};
use super::validation::{
    validate_order_params, validate_precision, validate_quantity, OrderRequest, OrderValidator,
};

/// Largest scale `rust_decimal` can represent
const MAX_TOKEN_DECIMALS: u32 = 28;

/// Locked escrow that does not match the obligations of active orders
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("escrow mismatch for {asset}: ledger holds {locked}, active orders owe {obligations}")]
pub struct ConservationViolation {
    pub asset: AssetId,
    pub locked: Decimal,
    pub obligations: Decimal,
}

/// Mutable engine state, always accessed under one lock
struct EngineState {
    config: MarketConfig,
    paused: bool,
    next_order_id: u64,
    orders: BTreeMap<OrderId, Order>,
    ledger: EscrowLedger,
    fills: Vec<Fill>,
    audit: AuditLog,
}

impl EngineState {
    fn emit(&mut self, event: EngineEvent, now: DateTime<Utc>) -> AuditRecord {
        self.audit.append(event, now, self.config.version)
    }

    /// Locked escrow each trader owes to active orders, per asset
    fn obligations(&self, trader: Option<&TraderId>, asset: &AssetId) -> Decimal {
        self.orders
            .values()
            .filter(|o| o.is_active() && o.escrow_asset() == asset)
            .filter(|o| trader.map_or(true, |t| &o.owner == t))
            .map(|o| o.locked)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }
}

/// Thread-safe order book engine
pub struct OrderBookEngine {
    admin: TraderId,
    validator: OrderValidator,
    clock: Arc<dyn Clock>,
    state: RwLock<EngineState>,
}

impl OrderBookEngine {
    /// Create a new engine administered by `admin`
    pub fn new(
        admin: TraderId,
        config: MarketConfig,
        quotes: Arc<dyn QuoteSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_event_capacity(admin, config, quotes, clock, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a new engine with a custom event channel capacity
    pub fn with_event_capacity(
        admin: TraderId,
        config: MarketConfig,
        quotes: Arc<dyn QuoteSource>,
        clock: Arc<dyn Clock>,
        event_capacity: usize,
    ) -> Self {
        Self {
            admin,
            validator: OrderValidator::new(quotes),
            clock,
            state: RwLock::new(EngineState {
                config,
                paused: false,
                next_order_id: 1,
                orders: BTreeMap::new(),
                ledger: EscrowLedger::new(),
                fills: Vec::new(),
                audit: AuditLog::with_capacity(event_capacity),
            }),
        }
    }

    fn ensure_admin(&self, caller: &TraderId) -> Result<(), OrderBookError> {
        if *caller != self.admin {
            tracing::warn!(caller = %caller, "rejected admin call from non-admin");
            return Err(OrderBookError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    // ============================================================================
    // Custody
    // ============================================================================

    /// Take funds into custody for `trader`
    pub fn deposit(
        &self,
        trader: &TraderId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<Balance, OrderBookError> {
        validate_quantity(amount)?;
        let now = self.clock.now();
        let mut state = self.state.write();
        validate_precision(amount, asset, state.config.decimals(asset))?;

        state
            .ledger
            .deposit(trader, asset, amount)
            .map_err(|e| match e {
                EscrowError::Overflow { .. } => OrderBookError::InvalidQuantity(e.to_string()),
                other => OrderBookError::InsufficientEscrow(other),
            })?;
        state.emit(
            EngineEvent::Deposited {
                trader: trader.clone(),
                asset: asset.clone(),
                amount,
            },
            now,
        );
        tracing::debug!(trader = %trader, asset = %asset, %amount, "deposit");
        Ok(state.ledger.balance(trader, asset))
    }

    /// Return available (unlocked) funds to `trader`
    pub fn withdraw(
        &self,
        trader: &TraderId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<Balance, OrderBookError> {
        validate_quantity(amount)?;
        let now = self.clock.now();
        let mut state = self.state.write();

        state
            .ledger
            .withdraw(trader, asset, amount)
            .map_err(OrderBookError::InsufficientEscrow)?;
        state.emit(
            EngineEvent::Withdrawn {
                trader: trader.clone(),
                asset: asset.clone(),
                amount,
            },
            now,
        );
        tracing::debug!(trader = %trader, asset = %asset, %amount, "withdraw");
        Ok(state.ledger.balance(trader, asset))
    }

    // ============================================================================
    // Order Lifecycle
    // ============================================================================

    /// Validate, escrow and store a new limit order
    #[allow(clippy::too_many_arguments)]
    pub fn create_order(
        &self,
        owner: &TraderId,
        base: AssetId,
        quote: AssetId,
        amount: Decimal,
        price: Decimal,
        side: OrderSide,
        min_fill: Decimal,
    ) -> Result<Order, OrderBookError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        if state.paused {
            return Err(OrderBookError::Paused);
        }

        let config = state.config.clone();
        let pair = AssetPair::new(base, quote);
        validate_order_params(&config, &pair, amount, price, min_fill)?;

        let order_notional = notional(amount, price, config.decimals(&pair.quote))
            .filter(|n| *n > Decimal::ZERO)
            .ok_or_else(|| {
                OrderBookError::InvalidQuantity(format!(
                    "Notional of {} at {} is not representable in {}",
                    amount, price, pair.quote
                ))
            })?;

        let request = OrderRequest {
            pair: &pair,
            side,
            amount,
            price,
            notional: order_notional,
        };
        if let Err(reason) = self.validator.validate_order(&config, &request) {
            tracing::warn!(owner = %owner, pair = %pair, %reason, "order rejected");
            return Err(reason.into());
        }

        let rule = side.rule();
        let escrow_asset = rule.escrow.asset(&pair).clone();
        let escrow_amount = rule.escrow.quantity(amount, order_notional);
        state
            .ledger
            .lock(owner, &escrow_asset, escrow_amount)
            .map_err(|e| {
                tracing::warn!(owner = %owner, error = %e, "escrow lock failed");
                OrderBookError::EscrowLockFailed(e)
            })?;

        let id = OrderId(state.next_order_id);
        state.next_order_id += 1;

        let order = Order::new(
            id,
            owner.clone(),
            pair.clone(),
            side,
            amount,
            price,
            min_fill,
            escrow_amount,
            now,
        );
        state.orders.insert(id, order.clone());

        state.emit(
            EngineEvent::OrderCreated {
                order_id: id,
                owner: owner.clone(),
                pair: pair.clone(),
                side,
                amount,
                price,
                min_fill,
                escrow_asset: escrow_asset.clone(),
                escrow_amount,
            },
            now,
        );
        tracing::info!(
            order_id = %id,
            owner = %owner,
            pair = %pair,
            ?side,
            %amount,
            %price,
            "order created"
        );

        Ok(order)
    }

    /// Fill part or all of an active order on behalf of `filler`
    pub fn fill_order(
        &self,
        filler: &TraderId,
        order_id: OrderId,
        fill_amount: Decimal,
    ) -> Result<(Order, Fill), OrderBookError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        if state.paused {
            return Err(OrderBookError::Paused);
        }

        let config = state.config.clone();
        let order = state
            .orders
            .get(&order_id)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;

        if !order.is_active() {
            return Err(OrderBookError::OrderNotActive(order_id));
        }

        validate_quantity(fill_amount)?;
        if fill_amount > order.remaining() {
            return Err(OrderBookError::InvalidQuantity(format!(
                "Fill {} exceeds remaining {} of order {}",
                fill_amount,
                order.remaining(),
                order_id
            )));
        }
        if fill_amount < order.minimum_fill() {
            return Err(OrderBookError::FillBelowMinimum {
                order_id,
                fill_amount,
                minimum: order.minimum_fill(),
            });
        }
        validate_precision(fill_amount, &order.pair.base, config.decimals(&order.pair.base))?;

        if let Err(reason) = self.validator.validate_fill(&config, &order.pair, order.price) {
            tracing::warn!(order_id = %order_id, filler = %filler, %reason, "fill rejected");
            return Err(reason.into());
        }

        let completes = fill_amount == order.remaining();
        let quote_decimals = config.decimals(&order.pair.quote);

        // A completing fill of a buy order takes the whole remaining lock so no dust is stranded
        let fill_notional = match order.side {
            OrderSide::Buy if completes => Some(order.locked),
            _ => notional(fill_amount, order.price, quote_decimals),
        }
        .filter(|n| *n > Decimal::ZERO)
        .ok_or_else(|| {
            OrderBookError::InvalidQuantity(format!(
                "Fill {} of order {} has no representable notional",
                fill_amount, order_id
            ))
        })?;

        let fee = compute_fee(fill_notional, &config.fee, quote_decimals).ok_or_else(|| {
            OrderBookError::InvalidQuantity(format!(
                "Fee on notional {} of order {} is not representable",
                fill_notional, order_id
            ))
        })?;
        let released = match order.side {
            OrderSide::Sell => fill_amount,
            OrderSide::Buy => fill_notional,
        };

        let mut ops = settlement_ops(
            order,
            filler,
            fill_amount,
            fill_notional,
            fee,
            &config.fee.recipient,
        );
        let residual = order.locked - released;
        if completes && residual > Decimal::ZERO {
            // Escrow left over once the order is complete goes back to the owner
            ops.push(LedgerOp::Release {
                trader: order.owner.clone(),
                asset: order.escrow_asset().clone(),
                amount: residual,
            });
        }

        state.ledger.apply(&ops).map_err(|e| {
            tracing::warn!(order_id = %order_id, filler = %filler, error = %e, "fill settlement failed");
            OrderBookError::InsufficientEscrow(e)
        })?;

        let order = match state.orders.get_mut(&order_id) {
            Some(order) => order,
            None => return Err(OrderBookError::OrderNotFound(order_id)),
        };
        order.apply_fill(fill_amount, released, now);
        if completes {
            order.locked = Decimal::ZERO;
        }
        let order = order.clone();

        let fill = Fill {
            order_id,
            maker: order.owner.clone(),
            filler: filler.clone(),
            side: order.side,
            fill_amount,
            price: order.price,
            notional: fill_notional,
            fee,
            fee_asset: order.pair.quote.clone(),
            fee_recipient: config.fee.recipient.clone(),
            timestamp: now,
        };
        state.fills.push(fill.clone());

        state.emit(
            EngineEvent::OrderFilled {
                order_id,
                filler: filler.clone(),
                fill_amount,
                notional: fill_notional,
                fee,
                remaining: order.remaining(),
                status: order.status,
            },
            now,
        );
        tracing::info!(
            order_id = %order_id,
            filler = %filler,
            %fill_amount,
            notional = %fill_notional,
            %fee,
            status = ?order.status,
            "order filled"
        );

        Ok((order, fill))
    }

    /// Cancel an active order and return its escrow to the owner.
    ///
    /// Allowed while paused and whatever the oracle says.
    pub fn cancel_order(&self, caller: &TraderId, order_id: OrderId) -> Result<Order, OrderBookError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;

        if order.owner != *caller {
            tracing::warn!(order_id = %order_id, caller = %caller, "cancel by non-owner");
            return Err(OrderBookError::NotOwner {
                order_id,
                caller: caller.clone(),
            });
        }
        if !order.is_active() {
            return Err(OrderBookError::OrderNotActive(order_id));
        }

        let refund_asset = order.escrow_asset().clone();
        if order.locked > Decimal::ZERO {
            state
                .ledger
                .release(caller, &refund_asset, order.locked)
                .map_err(OrderBookError::InsufficientEscrow)?;
        }
        let refunded = order.cancel(now);
        let order = order.clone();

        state.emit(
            EngineEvent::OrderCancelled {
                order_id,
                owner: caller.clone(),
                refund_asset: refund_asset.clone(),
                refunded,
            },
            now,
        );
        tracing::info!(order_id = %order_id, asset = %refund_asset, %refunded, "order cancelled");

        Ok(order)
    }

    /// Release any of `caller`'s locked `asset` not backing an active order.
    ///
    /// Returns the amount swept back to the available balance.
    pub fn refund_tokens(&self, caller: &TraderId, asset: &AssetId) -> Result<Decimal, OrderBookError> {
        let now = self.clock.now();
        let mut state = self.state.write();

        let locked = state.ledger.balance(caller, asset).locked;
        let residue = locked - state.obligations(Some(caller), asset);
        if residue <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        state
            .ledger
            .release(caller, asset, residue)
            .map_err(OrderBookError::InsufficientEscrow)?;
        state.emit(
            EngineEvent::TokensRefunded {
                trader: caller.clone(),
                asset: asset.clone(),
                amount: residue,
            },
            now,
        );
        tracing::info!(trader = %caller, asset = %asset, amount = %residue, "stray escrow refunded");
        Ok(residue)
    }

    // ============================================================================
    // Administration
    // ============================================================================

    fn update_config(
        &self,
        caller: &TraderId,
        update: impl FnOnce(&mut MarketConfig) -> Result<EngineEvent, OrderBookError>,
    ) -> Result<AuditRecord, OrderBookError> {
        self.ensure_admin(caller)?;
        let now = self.clock.now();
        let mut state = self.state.write();

        let mut next = state.config.clone();
        let event = update(&mut next)?;
        next.bump_version();
        state.config = next;

        tracing::info!(version = state.config.version, event = event.name(), "market config updated");
        Ok(state.emit(event, now))
    }

    pub fn set_min_order_size(&self, caller: &TraderId, value: Decimal) -> Result<AuditRecord, OrderBookError> {
        self.update_config(caller, |config| {
            if value < Decimal::ZERO || value > config.max_order_size {
                return Err(OrderBookError::InvalidConfig(format!(
                    "Minimum order size must be within [0, {}], got: {}",
                    config.max_order_size, value
                )));
            }
            config.min_order_size = value;
            Ok(EngineEvent::MinOrderSizeUpdated { value })
        })
    }

    pub fn set_max_order_size(&self, caller: &TraderId, value: Decimal) -> Result<AuditRecord, OrderBookError> {
        self.update_config(caller, |config| {
            if value <= Decimal::ZERO || value < config.min_order_size {
                return Err(OrderBookError::InvalidConfig(format!(
                    "Maximum order size must be positive and at least {}, got: {}",
                    config.min_order_size, value
                )));
            }
            config.max_order_size = value;
            Ok(EngineEvent::MaxOrderSizeUpdated { value })
        })
    }

    pub fn set_max_price_deviation(&self, caller: &TraderId, bps: u32) -> Result<AuditRecord, OrderBookError> {
        self.update_config(caller, |config| {
            config.max_price_deviation_bps = bps;
            Ok(EngineEvent::PriceDeviationUpdated {
                max_price_deviation_bps: bps,
            })
        })
    }

    pub fn update_fee_config(
        &self,
        caller: &TraderId,
        base_bps: u32,
        discount_bps: u32,
        recipient: TraderId,
    ) -> Result<AuditRecord, OrderBookError> {
        self.update_config(caller, |config| {
            if base_bps > BPS_DENOMINATOR || discount_bps > BPS_DENOMINATOR {
                return Err(OrderBookError::InvalidConfig(format!(
                    "Fee rates must not exceed {} bps, got base {} discount {}",
                    BPS_DENOMINATOR, base_bps, discount_bps
                )));
            }
            config.fee.base_bps = base_bps;
            config.fee.discount_bps = discount_bps;
            config.fee.recipient = recipient.clone();
            Ok(EngineEvent::FeeConfigUpdated {
                base_bps,
                discount_bps,
                recipient,
            })
        })
    }

    pub fn update_token_config(
        &self,
        caller: &TraderId,
        asset: AssetId,
        token: TokenConfig,
    ) -> Result<AuditRecord, OrderBookError> {
        self.update_config(caller, |config| {
            if token.min_size < Decimal::ZERO || token.min_size > token.max_size {
                return Err(OrderBookError::InvalidConfig(format!(
                    "Token bounds must satisfy 0 <= min <= max, got [{}, {}]",
                    token.min_size, token.max_size
                )));
            }
            if token.decimals > MAX_TOKEN_DECIMALS {
                return Err(OrderBookError::InvalidConfig(format!(
                    "Token decimals must not exceed {}, got: {}",
                    MAX_TOKEN_DECIMALS, token.decimals
                )));
            }
            let event = EngineEvent::TokenConfigUpdated {
                asset: asset.clone(),
                enabled: token.enabled,
                min_size: token.min_size,
                max_size: token.max_size,
                decimals: token.decimals,
            };
            config.tokens.insert(asset, token);
            Ok(event)
        })
    }

    /// Stop order creation and fills. Cancels and refunds keep working.
    pub fn pause(&self, caller: &TraderId) -> Result<AuditRecord, OrderBookError> {
        self.ensure_admin(caller)?;
        let now = self.clock.now();
        let mut state = self.state.write();
        if state.paused {
            return Err(OrderBookError::Paused);
        }
        state.paused = true;
        tracing::warn!(by = %caller, "order book paused");
        Ok(state.emit(EngineEvent::Paused { by: caller.clone() }, now))
    }

    pub fn unpause(&self, caller: &TraderId) -> Result<AuditRecord, OrderBookError> {
        self.ensure_admin(caller)?;
        let now = self.clock.now();
        let mut state = self.state.write();
        if !state.paused {
            return Err(OrderBookError::NotPaused);
        }
        state.paused = false;
        tracing::info!(by = %caller, "order book unpaused");
        Ok(state.emit(EngineEvent::Unpaused { by: caller.clone() }, now))
    }

    // ============================================================================
    // Queries
    // ============================================================================

    pub fn admin(&self) -> &TraderId {
        &self.admin
    }

    /// Get order by id, including filled and cancelled orders
    pub fn get_order(&self, order_id: OrderId) -> Result<Order, OrderBookError> {
        self.state
            .read()
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(OrderBookError::OrderNotFound(order_id))
    }

    pub fn orders_by_owner(&self, owner: &TraderId) -> Vec<Order> {
        self.state
            .read()
            .orders
            .values()
            .filter(|o| &o.owner == owner)
            .cloned()
            .collect()
    }

    pub fn active_orders(&self) -> Vec<Order> {
        self.state
            .read()
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Active)
            .cloned()
            .collect()
    }

    pub fn balance(&self, trader: &TraderId, asset: &AssetId) -> Balance {
        self.state.read().ledger.balance(trader, asset)
    }

    /// Snapshot of the current market configuration
    pub fn config(&self) -> MarketConfig {
        self.state.read().config.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.state.read().paused
    }

    /// Most recent fills, newest last
    pub fn recent_fills(&self, limit: usize) -> Vec<Fill> {
        let state = self.state.read();
        let start = state.fills.len().saturating_sub(limit);
        state.fills[start..].to_vec()
    }

    /// Fees collected in `asset` across all fills
    pub fn total_fees(&self, asset: &AssetId) -> Decimal {
        let state = self.state.read();
        total_fees(
            state
                .fills
                .iter()
                .filter(|f| &f.fee_asset == asset)
                .map(|f| &f.fee),
        )
    }

    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.state.read().audit.records().to_vec()
    }

    /// Audit records with a sequence number greater than `sequence`
    pub fn audit_since(&self, sequence: u64) -> Vec<AuditRecord> {
        self.state.read().audit.since(sequence).to_vec()
    }

    /// Live feed of audit records appended after this call
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.state.read().audit.subscribe()
    }

    /// Check that locked escrow per asset equals what active orders still owe
    pub fn check_conservation(&self) -> Result<(), ConservationViolation> {
        let state = self.state.read();
        let mut assets: Vec<AssetId> = state.ledger.locked_by_asset().into_keys().collect();
        for order in state.orders.values().filter(|o| o.is_active()) {
            assets.push(order.escrow_asset().clone());
        }
        assets.sort();
        assets.dedup();

        for asset in assets {
            let locked = state.ledger.total_locked(&asset);
            let obligations = state.obligations(None, &asset);
            if locked != obligations {
                return Err(ConservationViolation {
                    asset,
                    locked,
                    obligations,
                });
            }
        }
        Ok(())
    }
}

/// Ledger movements for one fill, fee taken out of the quote leg
fn settlement_ops(
    order: &Order,
    filler: &TraderId,
    fill_amount: Decimal,
    fill_notional: Decimal,
    fee: Decimal,
    fee_recipient: &TraderId,
) -> Vec<LedgerOp> {
    let maker = &order.owner;
    let base = &order.pair.base;
    let quote = &order.pair.quote;
    let net = fill_notional - fee;

    let ops = match order.side {
        OrderSide::Sell => vec![
            LedgerOp::Transfer {
                from: maker.clone(),
                to: filler.clone(),
                asset: base.clone(),
                amount: fill_amount,
            },
            LedgerOp::Pay {
                from: filler.clone(),
                to: maker.clone(),
                asset: quote.clone(),
                amount: net,
            },
            LedgerOp::Pay {
                from: filler.clone(),
                to: fee_recipient.clone(),
                asset: quote.clone(),
                amount: fee,
            },
        ],
        OrderSide::Buy => vec![
            LedgerOp::Pay {
                from: filler.clone(),
                to: maker.clone(),
                asset: base.clone(),
                amount: fill_amount,
            },
            LedgerOp::Transfer {
                from: maker.clone(),
                to: filler.clone(),
                asset: quote.clone(),
                amount: net,
            },
            LedgerOp::Transfer {
                from: maker.clone(),
                to: fee_recipient.clone(),
                asset: quote.clone(),
                amount: fee,
            },
        ],
    };

    // Zero fees (or a fee that eats the whole notional) produce empty legs
    ops.into_iter().filter(|op| op.amount() > Decimal::ZERO).collect()
}
