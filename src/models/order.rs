use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, AssetPair, OrderId, TraderId};

/// A resting limit order together with its fill and escrow accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: TraderId,
    pub pair: AssetPair,
    pub side: OrderSide,
    /// Total size in base-asset units
    pub amount: Decimal,
    /// Limit price, quote units per base unit
    pub price: Decimal,
    /// Smallest partial fill accepted while more than this remains
    pub min_fill: Decimal,
    pub filled: Decimal,
    /// Escrow still held by the ledger on behalf of this order, denominated in `escrow_asset()`
    pub locked: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order side: Buy or Sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order lifecycle. `Filled` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// One side of an asset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairLeg {
    /// Base asset, quantities are the order amount
    Base,
    /// Quote asset, quantities are the notional (amount * price)
    Quote,
}

impl PairLeg {
    pub fn asset(self, pair: &AssetPair) -> &AssetId {
        match self {
            PairLeg::Base => &pair.base,
            PairLeg::Quote => &pair.quote,
        }
    }

    /// Pick the quantity denominated in this leg's asset
    pub fn quantity(self, amount: Decimal, notional: Decimal) -> Decimal {
        match self {
            PairLeg::Base => amount,
            PairLeg::Quote => notional,
        }
    }
}

/// Side-specific settlement directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideRule {
    /// Leg the maker escrows at creation
    pub escrow: PairLeg,
    /// Leg the maker receives when filled
    pub proceeds: PairLeg,
}

const SELL_RULE: SideRule = SideRule {
    escrow: PairLeg::Base,
    proceeds: PairLeg::Quote,
};

const BUY_RULE: SideRule = SideRule {
    escrow: PairLeg::Quote,
    proceeds: PairLeg::Base,
};

impl OrderSide {
    pub fn rule(self) -> &'static SideRule {
        match self {
            OrderSide::Sell => &SELL_RULE,
            OrderSide::Buy => &BUY_RULE,
        }
    }
}

impl Order {
    /// Create a new active order. Escrow is expected to be locked by the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OrderId,
        owner: TraderId,
        pair: AssetPair,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        min_fill: Decimal,
        locked: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            pair,
            side,
            amount,
            price,
            min_fill,
            filled: Decimal::ZERO,
            locked,
            status: OrderStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get the remaining unfilled amount
    pub fn remaining(&self) -> Decimal {
        self.amount - self.filled
    }

    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    pub fn is_filled(&self) -> bool {
        self.filled >= self.amount
    }

    /// Asset held in escrow for this order
    pub fn escrow_asset(&self) -> &AssetId {
        self.side.rule().escrow.asset(&self.pair)
    }

    /// Asset the maker receives on fills
    pub fn proceeds_asset(&self) -> &AssetId {
        self.side.rule().proceeds.asset(&self.pair)
    }

    /// Smallest fill accepted right now. The final remainder may always be taken.
    pub fn minimum_fill(&self) -> Decimal {
        self.min_fill.min(self.remaining())
    }

    /// Record a fill that consumed `released` of this order's escrow
    pub fn apply_fill(&mut self, fill_amount: Decimal, released: Decimal, now: DateTime<Utc>) {
        self.filled += fill_amount;
        self.locked -= released;
        self.updated_at = now;
        self.update_status();
    }

    /// Update order status based on filled amount
    pub fn update_status(&mut self) {
        if self.status == OrderStatus::Active && self.is_filled() {
            self.status = OrderStatus::Filled;
        }
    }

    /// Mark the order cancelled and hand back the escrow it still held
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Decimal {
        let refund = self.locked;
        self.locked = Decimal::ZERO;
        self.status = OrderStatus::Cancelled;
        self.updated_at = now;
        refund
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sell_order() -> Order {
        Order::new(
            OrderId(1),
            TraderId::new("maker"),
            AssetPair::new(AssetId::new("WETH"), AssetId::new("USDC")),
            OrderSide::Sell,
            dec!(100),
            dec!(2),
            dec!(10),
            dec!(100),
            Utc::now(),
        )
    }

    #[test]
    fn test_order_creation() {
        let order = sell_order();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.filled, Decimal::ZERO);
        assert_eq!(order.remaining(), dec!(100));
        assert_eq!(order.escrow_asset(), &AssetId::new("WETH"));
        assert_eq!(order.proceeds_asset(), &AssetId::new("USDC"));
    }

    #[test]
    fn test_side_rules() {
        assert_eq!(OrderSide::Sell.rule().escrow, PairLeg::Base);
        assert_eq!(OrderSide::Buy.rule().escrow, PairLeg::Quote);
        assert_eq!(PairLeg::Quote.quantity(dec!(5), dec!(10)), dec!(10));
        assert_eq!(PairLeg::Base.quantity(dec!(5), dec!(10)), dec!(5));
    }

    #[test]
    fn test_order_fill() {
        let mut order = sell_order();
        let now = Utc::now();

        order.apply_fill(dec!(40), dec!(40), now);
        assert_eq!(order.filled, dec!(40));
        assert_eq!(order.locked, dec!(60));
        assert_eq!(order.status, OrderStatus::Active);

        order.apply_fill(dec!(60), dec!(60), now);
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_filled());
        assert!(order.status.is_terminal());
    }

    #[test]
    fn test_minimum_fill_shrinks_with_remainder() {
        let mut order = sell_order();
        assert_eq!(order.minimum_fill(), dec!(10));
        order.apply_fill(dec!(95), dec!(95), Utc::now());
        assert_eq!(order.minimum_fill(), dec!(5));
    }

    #[test]
    fn test_cancel_returns_locked() {
        let mut order = sell_order();
        order.apply_fill(dec!(30), dec!(30), Utc::now());
        let refund = order.cancel(Utc::now());
        assert_eq!(refund, dec!(70));
        assert_eq!(order.locked, Decimal::ZERO);
        assert_eq!(order.status, OrderStatus::Cancelled);
    }
}
