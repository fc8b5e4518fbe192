//! In-memory bank

use std::collections::BTreeMap;

use super::{Bank, BankError, Pool};
use crate::types::Address;

/// Simple in-memory bank holding account and pool balances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBank {
    accounts: BTreeMap<Address, u64>,
    bonded: u64,
    not_bonded: u64,
}

impl MemoryBank {
    /// Create an empty bank
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit new tokens to an account (genesis and tests)
    pub fn mint(&mut self, account: &Address, amount: u64) -> Result<(), BankError> {
        let balance = self.accounts.entry(*account).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(BankError::Overflow)?;
        Ok(())
    }

    /// Sum of all account and pool balances
    pub fn total_supply(&self) -> u128 {
        let accounts: u128 = self.accounts.values().map(|b| *b as u128).sum();
        accounts + self.bonded as u128 + self.not_bonded as u128
    }

    fn pool_mut(&mut self, pool: Pool) -> &mut u64 {
        match pool {
            Pool::Bonded => &mut self.bonded,
            Pool::NotBonded => &mut self.not_bonded,
        }
    }

    fn debit_pool(&mut self, pool: Pool, amount: u64) -> Result<(), BankError> {
        let balance = self.pool_mut(pool);
        if *balance < amount {
            return Err(BankError::InsufficientPool { pool, needed: amount, available: *balance });
        }
        *balance -= amount;
        Ok(())
    }

    fn credit_pool(&mut self, pool: Pool, amount: u64) -> Result<(), BankError> {
        let balance = self.pool_mut(pool);
        *balance = balance.checked_add(amount).ok_or(BankError::Overflow)?;
        Ok(())
    }
}

impl Bank for MemoryBank {
    fn balance(&self, account: &Address) -> u64 {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    fn pool_balance(&self, pool: Pool) -> u64 {
        match pool {
            Pool::Bonded => self.bonded,
            Pool::NotBonded => self.not_bonded,
        }
    }

    fn send_to_pool(&mut self, from: &Address, pool: Pool, amount: u64) -> Result<(), BankError> {
        let available = self.balance(from);
        if available < amount {
            return Err(BankError::InsufficientFunds { account: *from, needed: amount, available });
        }
        self.credit_pool(pool, amount)?;
        self.accounts.insert(*from, available - amount);
        Ok(())
    }

    fn send_between_pools(&mut self, from: Pool, to: Pool, amount: u64) -> Result<(), BankError> {
        self.debit_pool(from, amount)?;
        self.credit_pool(to, amount)
    }

    fn send_from_pool(&mut self, pool: Pool, to: &Address, amount: u64) -> Result<(), BankError> {
        self.debit_pool(pool, amount)?;
        self.mint(to, amount)
    }
}
