//! Buffered bank view
//!
//! Mirrors [`crate::store::CacheStore`]: transfers are checked against the
//! parent balance plus the buffered deltas and recorded as a journal. The
//! journal is replayed on the parent by [`CachedBank::write`]; dropping the
//! view discards it.

use std::collections::BTreeMap;

use super::{Bank, BankError, Pool};
use crate::types::Address;

#[derive(Debug, Clone, Copy)]
enum Transfer {
    ToPool { from: Address, pool: Pool, amount: u64 },
    BetweenPools { from: Pool, to: Pool, amount: u64 },
    FromPool { pool: Pool, to: Address, amount: u64 },
}

/// Buffered view of a parent bank
pub struct CachedBank<'a, B: Bank> {
    parent: &'a mut B,
    accounts: BTreeMap<Address, i128>,
    pools: BTreeMap<Pool, i128>,
    journal: Vec<Transfer>,
}

impl<'a, B: Bank> CachedBank<'a, B> {
    /// Start buffering transfers on top of `parent`
    pub fn new(parent: &'a mut B) -> Self {
        Self {
            parent,
            accounts: BTreeMap::new(),
            pools: BTreeMap::new(),
            journal: Vec::new(),
        }
    }

    /// Replay the journal against the parent's current balances without
    /// moving anything. Fails with the error the first failing transfer
    /// would give.
    pub fn check(&self) -> Result<(), BankError> {
        let mut accounts: BTreeMap<Address, u64> = BTreeMap::new();
        let mut pools: BTreeMap<Pool, u64> = BTreeMap::new();
        let parent = &*self.parent;
        let account = |accounts: &mut BTreeMap<Address, u64>, a: Address| {
            *accounts.entry(a).or_insert_with(|| parent.balance(&a))
        };
        let pool = |pools: &mut BTreeMap<Pool, u64>, p: Pool| *pools.entry(p).or_insert_with(|| parent.pool_balance(p));

        for transfer in &self.journal {
            match *transfer {
                Transfer::ToPool { from, pool: to, amount } => {
                    let available = account(&mut accounts, from);
                    let debited = available
                        .checked_sub(amount)
                        .ok_or(BankError::InsufficientFunds { account: from, needed: amount, available })?;
                    let credited = pool(&mut pools, to).checked_add(amount).ok_or(BankError::Overflow)?;
                    accounts.insert(from, debited);
                    pools.insert(to, credited);
                }
                Transfer::BetweenPools { from, to, amount } => {
                    let available = pool(&mut pools, from);
                    let debited = available
                        .checked_sub(amount)
                        .ok_or(BankError::InsufficientPool { pool: from, needed: amount, available })?;
                    pools.insert(from, debited);
                    let credited = pool(&mut pools, to).checked_add(amount).ok_or(BankError::Overflow)?;
                    pools.insert(to, credited);
                }
                Transfer::FromPool { pool: from, to, amount } => {
                    let available = pool(&mut pools, from);
                    let debited = available
                        .checked_sub(amount)
                        .ok_or(BankError::InsufficientPool { pool: from, needed: amount, available })?;
                    let credited = account(&mut accounts, to).checked_add(amount).ok_or(BankError::Overflow)?;
                    pools.insert(from, debited);
                    accounts.insert(to, credited);
                }
            }
        }
        Ok(())
    }

    /// Replay buffered transfers on the parent, in order
    pub fn write(self) -> Result<(), BankError> {
        let CachedBank { parent, journal, .. } = self;
        for transfer in journal {
            match transfer {
                Transfer::ToPool { from, pool, amount } => parent.send_to_pool(&from, pool, amount)?,
                Transfer::BetweenPools { from, to, amount } => {
                    parent.send_between_pools(from, to, amount)?
                }
                Transfer::FromPool { pool, to, amount } => parent.send_from_pool(pool, &to, amount)?,
            }
        }
        Ok(())
    }

    fn adjust_account(&mut self, account: &Address, delta: i128) {
        *self.accounts.entry(*account).or_insert(0) += delta;
    }

    fn adjust_pool(&mut self, pool: Pool, delta: i128) {
        *self.pools.entry(pool).or_insert(0) += delta;
    }

    fn check_pool(&self, pool: Pool, amount: u64) -> Result<(), BankError> {
        let available = self.pool_balance(pool);
        if available < amount {
            return Err(BankError::InsufficientPool { pool, needed: amount, available });
        }
        Ok(())
    }

    fn check_credit(current: u64, amount: u64) -> Result<(), BankError> {
        current.checked_add(amount).map(|_| ()).ok_or(BankError::Overflow)
    }
}

fn apply_delta(base: u64, delta: i128) -> u64 {
    let value = base as i128 + delta;
    value.clamp(0, u64::MAX as i128) as u64
}

impl<'a, B: Bank> Bank for CachedBank<'a, B> {
    fn balance(&self, account: &Address) -> u64 {
        let delta = self.accounts.get(account).copied().unwrap_or(0);
        apply_delta(self.parent.balance(account), delta)
    }

    fn pool_balance(&self, pool: Pool) -> u64 {
        let delta = self.pools.get(&pool).copied().unwrap_or(0);
        apply_delta(self.parent.pool_balance(pool), delta)
    }

    fn send_to_pool(&mut self, from: &Address, pool: Pool, amount: u64) -> Result<(), BankError> {
        let available = self.balance(from);
        if available < amount {
            return Err(BankError::InsufficientFunds { account: *from, needed: amount, available });
        }
        Self::check_credit(self.pool_balance(pool), amount)?;
        self.adjust_account(from, -(amount as i128));
        self.adjust_pool(pool, amount as i128);
        self.journal.push(Transfer::ToPool { from: *from, pool, amount });
        Ok(())
    }

    fn send_between_pools(&mut self, from: Pool, to: Pool, amount: u64) -> Result<(), BankError> {
        self.check_pool(from, amount)?;
        Self::check_credit(self.pool_balance(to), amount)?;
        self.adjust_pool(from, -(amount as i128));
        self.adjust_pool(to, amount as i128);
        self.journal.push(Transfer::BetweenPools { from, to, amount });
        Ok(())
    }

    fn send_from_pool(&mut self, pool: Pool, to: &Address, amount: u64) -> Result<(), BankError> {
        self.check_pool(pool, amount)?;
        Self::check_credit(self.balance(to), amount)?;
        self.adjust_pool(pool, -(amount as i128));
        self.adjust_account(to, amount as i128);
        self.journal.push(Transfer::FromPool { pool, to: *to, amount });
        Ok(())
    }
}
