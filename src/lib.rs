//! # stakecore
//!
//! Staking and validator-set bookkeeping for a proof-of-stake chain.
//!
//! ## Core Features
//! - Validator ledger with a power-ranked index and bonding state machine
//! - Approval-style delegation: full weight on every validator of a slate
//! - Proxy voting with follower aggregation
//! - Time-locked undelegation queue
//! - Deterministic end-of-block validator set updates (power ranked or
//!   explicit membership)
//!
//! ## Execution Model
//! The core is a deterministic state machine driven by one block pipeline.
//! Messages run on buffered views of the store and the bank and are
//! committed only when they succeed; invariant violations surface as fatal
//! errors that stop block processing.

pub mod bank;
pub mod delegation;
pub mod error;
pub mod events;
pub mod handler;
pub mod invariants;
pub mod keeper;
pub mod params;
pub mod store;
pub mod types;
pub mod validators;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports
pub use bank::{Bank, BankError, CachedBank, MemoryBank, Pool};
pub use delegation::{Delegator, UndelegationInfo};
pub use error::{InvariantViolation, StakingError, StakingResult};
pub use events::{EventLog, StakingEvent, StakingHooks};
pub use handler::Msg;
pub use keeper::Keeper;
pub use params::{SetUpdatePolicy, StakingParams};
pub use store::{CacheStore, KvStore, MemoryStore, SledStore, StoreError, WriteOp};
pub use types::{Address, BlockContext, ConsensusPubKey, Timestamp, TxMode};
pub use validators::{
    AuthorityUpdater, BondStatus, MembershipChange, PowerRankedUpdater,
    Validator, ValidatorSetUpdater, ValidatorUpdate,
};

/// stakecore version
pub const STAKECORE_VERSION: &str = env!("CARGO_PKG_VERSION");
