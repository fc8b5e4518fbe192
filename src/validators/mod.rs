//! Validator Ledger
//!
//! This module holds the validator records and everything keyed on them:
//! the power index, the last reported power snapshot, the unbonding queue
//! and the end-of-block set reconciliation.
//!
//! # Set update policies
//! - Power ranked: the top `max_validators` by power are bonded
//! - Authority: membership changes are proposed explicitly and applied at
//!   the next end block

pub mod ledger;
pub mod set_update;
pub mod validator;

pub use set_update::{
    AuthorityUpdater, MembershipChange, PowerRankedUpdater,
    ValidatorSetUpdater, ValidatorUpdate,
};
pub use validator::{BondStatus, Validator};
