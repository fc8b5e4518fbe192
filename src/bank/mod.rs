//! Token balances and staking pools
//!
//! Account balances belong to an external bank. The staking core only moves
//! tokens between an account and the two staking pools, and between the
//! pools themselves:
//!
//! ```text
//! account --delegate--> Bonded --withdraw--> NotBonded --complete--> account
//! ```
//!
//! Transfers either succeed completely or fail without effect.

mod cache;
mod memory;

pub use cache::CachedBank;
pub use memory::MemoryBank;

use serde::{Deserialize, Serialize};

use crate::types::Address;

/// Staking pool accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pool {
    /// Tokens currently delegated or self-bonded
    Bonded,
    /// Tokens waiting out the unbonding period
    NotBonded,
}

/// Bank collaborator
pub trait Bank {
    /// Spendable balance of an account
    fn balance(&self, account: &Address) -> u64;

    /// Balance of a staking pool
    fn pool_balance(&self, pool: Pool) -> u64;

    /// Move tokens from an account into a pool
    fn send_to_pool(&mut self, from: &Address, pool: Pool, amount: u64) -> Result<(), BankError>;

    /// Move tokens from one pool to the other
    fn send_between_pools(&mut self, from: Pool, to: Pool, amount: u64) -> Result<(), BankError>;

    /// Move tokens from a pool to an account
    fn send_from_pool(&mut self, pool: Pool, to: &Address, amount: u64) -> Result<(), BankError>;
}

/// Bank errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankError {
    #[error("Insufficient funds in {account}: need {needed}, have {available}")]
    InsufficientFunds { account: Address, needed: u64, available: u64 },

    #[error("Insufficient {pool:?} pool balance: need {needed}, have {available}")]
    InsufficientPool { pool: Pool, needed: u64, available: u64 },

    #[error("Balance overflow")]
    Overflow,
}
