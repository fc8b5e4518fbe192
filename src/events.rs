//! Ledger events and the hooks seam
//!
//! Features built on top of the ledger (slashing, reward distribution,
//! governance) observe it through these events rather than by reaching into
//! the keeper. Events are buffered with the transaction that produced them
//! and are dropped if that transaction is rolled back.

use serde::{Deserialize, Serialize};

use crate::types::Address;

/// Something that happened to the staking ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakingEvent {
    ValidatorCreated { operator: Address },
    ValidatorDestroyed { operator: Address },
    ValidatorBonded { operator: Address },
    ValidatorBeginUnbonding { operator: Address },
    ValidatorUnbonded { operator: Address },
    ValidatorRemoved { operator: Address },
    ValidatorJailed { operator: Address },
    ValidatorUnjailed { operator: Address },
    Delegated { delegator: Address, amount: u64 },
    Withdrawn { delegator: Address, amount: u64, completion_time: u64 },
    SharesAdded { delegator: Address, validators: Vec<Address>, shares: u64 },
    ProxyRegistered { proxy: Address },
    ProxyUnregistered { proxy: Address },
    ProxyBound { delegator: Address, proxy: Address },
    ProxyUnbound { delegator: Address, proxy: Address },
    UndelegationCompleted { delegator: Address, amount: u64 },
}

/// Consumer of ledger events
pub trait StakingHooks {
    /// Called once per event, in the order the events happened
    fn on_event(&mut self, event: &StakingEvent);
}

/// Hooks that just collect events
#[derive(Debug, Default)]
pub struct EventLog {
    pub events: Vec<StakingEvent>,
}

impl StakingHooks for EventLog {
    fn on_event(&mut self, event: &StakingEvent) {
        self.events.push(event.clone());
    }
}
