//! Escrow ledger
//!
//! Per-(trader, asset) custody with two buckets: `available` funds the
//! trader may withdraw or spend, and `locked` funds backing active orders.
//! Every mutation goes through `apply`, which stages a batch of operations
//! against copies of the touched accounts and commits only if all of them
//! succeed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{AssetId, TraderId};

use super::errors::{Bucket, EscrowError};

/// Custodied balances of one trader in one asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub locked: Decimal,
}

impl Balance {
    /// Both buckets together, saturating at `Decimal::MAX`
    pub fn total(&self) -> Decimal {
        self.available.saturating_add(self.locked)
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Decimal {
        match bucket {
            Bucket::Available => &mut self.available,
            Bucket::Locked => &mut self.locked,
        }
    }
}

/// A single ledger movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    /// Funds entering custody
    Deposit {
        trader: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    /// Funds leaving custody
    Withdraw {
        trader: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    /// available -> locked
    Lock {
        trader: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    /// locked -> available
    Release {
        trader: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    /// from.locked -> to.available
    Transfer {
        from: TraderId,
        to: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
    /// from.available -> to.available
    Pay {
        from: TraderId,
        to: TraderId,
        asset: AssetId,
        amount: Decimal,
    },
}

impl LedgerOp {
    pub fn amount(&self) -> Decimal {
        match self {
            LedgerOp::Deposit { amount, .. }
            | LedgerOp::Withdraw { amount, .. }
            | LedgerOp::Lock { amount, .. }
            | LedgerOp::Release { amount, .. }
            | LedgerOp::Transfer { amount, .. }
            | LedgerOp::Pay { amount, .. } => *amount,
        }
    }
}

type AccountKey = (TraderId, AssetId);

/// Working copy of the accounts a batch touches
struct Staging<'a> {
    accounts: &'a HashMap<AccountKey, Balance>,
    touched: HashMap<AccountKey, Balance>,
}

impl<'a> Staging<'a> {
    fn new(accounts: &'a HashMap<AccountKey, Balance>) -> Self {
        Self {
            accounts,
            touched: HashMap::new(),
        }
    }

    fn account(&mut self, trader: &TraderId, asset: &AssetId) -> &mut Balance {
        let key = (trader.clone(), asset.clone());
        let accounts = self.accounts;
        self.touched
            .entry(key)
            .or_insert_with_key(|key| accounts.get(key).copied().unwrap_or_default())
    }

    fn debit(
        &mut self,
        trader: &TraderId,
        asset: &AssetId,
        bucket: Bucket,
        amount: Decimal,
    ) -> Result<(), EscrowError> {
        let held = self.account(trader, asset).bucket_mut(bucket);
        if *held < amount {
            return Err(EscrowError::InsufficientEscrow {
                trader: trader.clone(),
                asset: asset.clone(),
                bucket,
                required: amount,
                held: *held,
            });
        }
        *held -= amount;
        Ok(())
    }

    fn credit(
        &mut self,
        trader: &TraderId,
        asset: &AssetId,
        bucket: Bucket,
        amount: Decimal,
    ) -> Result<(), EscrowError> {
        let held = self.account(trader, asset).bucket_mut(bucket);
        *held = held.checked_add(amount).ok_or_else(|| EscrowError::Overflow {
            trader: trader.clone(),
            asset: asset.clone(),
            bucket,
        })?;
        Ok(())
    }

    fn apply(&mut self, op: &LedgerOp) -> Result<(), EscrowError> {
        if op.amount() <= Decimal::ZERO {
            return Err(EscrowError::InvalidAmount(op.amount()));
        }
        match op {
            LedgerOp::Deposit {
                trader,
                asset,
                amount,
            } => self.credit(trader, asset, Bucket::Available, *amount)?,
            LedgerOp::Withdraw {
                trader,
                asset,
                amount,
            } => self.debit(trader, asset, Bucket::Available, *amount)?,
            LedgerOp::Lock {
                trader,
                asset,
                amount,
            } => {
                self.debit(trader, asset, Bucket::Available, *amount)?;
                self.credit(trader, asset, Bucket::Locked, *amount)?;
            }
            LedgerOp::Release {
                trader,
                asset,
                amount,
            } => {
                self.debit(trader, asset, Bucket::Locked, *amount)?;
                self.credit(trader, asset, Bucket::Available, *amount)?;
            }
            LedgerOp::Transfer {
                from,
                to,
                asset,
                amount,
            } => {
                self.debit(from, asset, Bucket::Locked, *amount)?;
                self.credit(to, asset, Bucket::Available, *amount)?;
            }
            LedgerOp::Pay {
                from,
                to,
                asset,
                amount,
            } => {
                self.debit(from, asset, Bucket::Available, *amount)?;
                self.credit(to, asset, Bucket::Available, *amount)?;
            }
        }
        Ok(())
    }
}

/// Custody ledger for every trader and asset held by the engine
#[derive(Debug, Default, Clone)]
pub struct EscrowLedger {
    accounts: HashMap<AccountKey, Balance>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of operations all-or-nothing.
    ///
    /// Operations are applied in order against a staged copy, so a later
    /// operation may spend what an earlier one credited. On error nothing
    /// is written.
    pub fn apply(&mut self, ops: &[LedgerOp]) -> Result<(), EscrowError> {
        let mut staging = Staging::new(&self.accounts);
        for op in ops {
            staging.apply(op)?;
        }
        let touched = staging.touched;
        self.accounts.extend(touched);
        Ok(())
    }

    pub fn deposit(&mut self, trader: &TraderId, asset: &AssetId, amount: Decimal) -> Result<(), EscrowError> {
        self.apply(&[LedgerOp::Deposit {
            trader: trader.clone(),
            asset: asset.clone(),
            amount,
        }])
    }

    pub fn withdraw(&mut self, trader: &TraderId, asset: &AssetId, amount: Decimal) -> Result<(), EscrowError> {
        self.apply(&[LedgerOp::Withdraw {
            trader: trader.clone(),
            asset: asset.clone(),
            amount,
        }])
    }

    pub fn lock(&mut self, trader: &TraderId, asset: &AssetId, amount: Decimal) -> Result<(), EscrowError> {
        self.apply(&[LedgerOp::Lock {
            trader: trader.clone(),
            asset: asset.clone(),
            amount,
        }])
    }

    pub fn release(&mut self, trader: &TraderId, asset: &AssetId, amount: Decimal) -> Result<(), EscrowError> {
        self.apply(&[LedgerOp::Release {
            trader: trader.clone(),
            asset: asset.clone(),
            amount,
        }])
    }

    pub fn transfer(
        &mut self,
        from: &TraderId,
        to: &TraderId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<(), EscrowError> {
        self.apply(&[LedgerOp::Transfer {
            from: from.clone(),
            to: to.clone(),
            asset: asset.clone(),
            amount,
        }])
    }

    pub fn balance(&self, trader: &TraderId, asset: &AssetId) -> Balance {
        self.accounts
            .get(&(trader.clone(), asset.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Sum of locked funds in one asset across all traders
    pub fn total_locked(&self, asset: &AssetId) -> Decimal {
        self.accounts
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, balance)| balance.locked)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Sum of everything custodied in one asset
    pub fn total_custody(&self, asset: &AssetId) -> Decimal {
        self.accounts
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, balance)| balance.total())
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Locked totals per asset
    pub fn locked_by_asset(&self) -> HashMap<AssetId, Decimal> {
        let mut totals: HashMap<AssetId, Decimal> = HashMap::new();
        for ((_, asset), balance) in &self.accounts {
            if balance.locked > Decimal::ZERO {
                let total = totals.entry(asset.clone()).or_default();
                *total = total.saturating_add(balance.locked);
            }
        }
        totals
    }
}
