use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, OrderId, TraderId};
use super::order::OrderSide;

/// Settlement record for one counter-party fill against a resting order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub maker: TraderId,
    pub filler: TraderId,
    /// Side of the resting (maker) order
    pub side: OrderSide,
    /// Base-asset units taken from the order
    pub fill_amount: Decimal,
    pub price: Decimal,
    /// Quote-asset value of the fill, floored to the quote asset's precision
    pub notional: Decimal,
    pub fee: Decimal,
    pub fee_asset: AssetId,
    pub fee_recipient: TraderId,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// Quote amount delivered to whoever receives the quote leg, after fees
    pub fn net_quote(&self) -> Decimal {
        self.notional - self.fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_net_quote() {
        let fill = Fill {
            order_id: OrderId(1),
            maker: TraderId::new("maker"),
            filler: TraderId::new("taker"),
            side: OrderSide::Sell,
            fill_amount: dec!(40),
            price: dec!(2),
            notional: dec!(80),
            fee: dec!(0.72),
            fee_asset: AssetId::new("USDC"),
            fee_recipient: TraderId::new("treasury"),
            timestamp: Utc::now(),
        };

        assert_eq!(fill.net_quote(), dec!(79.28));
    }
}
