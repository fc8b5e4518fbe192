//! Delegation Module
//!
//! Delegators stake tokens and vote for a slate of validators, either
//! directly or through a proxy. Withdrawn tokens wait in the undelegation
//! queue until the unbonding period has passed.

pub mod delegator;
pub mod proxy;
pub mod shares;
pub mod undelegation;

pub use delegator::{shares_from_tokens, Delegator};
pub use undelegation::UndelegationInfo;
