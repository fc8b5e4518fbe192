//! Error taxonomy for the staking core
//!
//! Three categories:
//! - business errors returned to the caller (the transaction is rolled back),
//! - collaborator errors from the store or the bank, propagated unchanged,
//! - [`InvariantViolation`], the fatal category. It means the ledger is
//!   corrupt or a caller skipped validation, and block processing must stop.

use crate::bank::BankError;
use crate::store::StoreError;
use crate::types::Address;
use crate::validators::BondStatus;

/// Result alias used throughout the crate
pub type StakingResult<T> = Result<T, StakingError>;

/// Staking errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StakingError {
    #[error("Insufficient delegation: {amount} is below the minimum of {min}")]
    InsufficientDelegation { amount: u64, min: u64 },

    #[error("Insufficient quantity: requested {requested}, delegated {available}")]
    InsufficientQuantity { requested: u64, available: u64 },

    #[error("Validator {0} not found")]
    NoValidatorFound(Address),

    #[error("Delegator {0} has no delegation")]
    NotInDelegating(Address),

    #[error("Validator {0} is in dismissal and cannot accept shares")]
    AddSharesToDismission(Address),

    #[error("Proxy {0} must unregister before withdrawing all tokens")]
    InvalidProxyWithdrawTotal(Address),

    #[error("{0} is not a registered proxy")]
    InvalidProxy(Address),

    #[error("{0} is already a registered proxy")]
    AlreadyProxy(Address),

    #[error("{0} is not a registered proxy and cannot unregister")]
    NotProxy(Address),

    #[error("{0} is bound to a proxy")]
    AlreadyBound(Address),

    #[error("{0} is not bound to a proxy")]
    NotBound(Address),

    #[error("{0} cannot bind to itself")]
    ProxyBindSelf(Address),

    #[error("Proxy {0} cannot bind to another proxy")]
    ProxyCannotBind(Address),

    #[error("Validator {0} has been dismissed")]
    ValidatorDismissed(Address),

    #[error("Validator {0} is jailed")]
    ValidatorJailed(Address),

    #[error("Validator {0} already exists")]
    ValidatorExists(Address),

    #[error("Consensus key is already used by validator {0}")]
    ConsensusKeyTaken(Address),

    #[error("Empty validator list")]
    EmptyValidators,

    #[error("Too many validators: {count} exceeds the limit of {max}")]
    ExceedValidatorAddrs { count: usize, max: usize },

    #[error("Duplicate validator {0} in list")]
    DuplicateValidator(Address),

    #[error("Min self delegation {got} does not match the required {required}")]
    BadMinSelfDelegation { got: u64, required: u64 },

    #[error("Validator {0} is not jailed")]
    ValidatorNotJailed(Address),

    #[error("Validator {0} is already bonded")]
    ValidatorAlreadyBonded(Address),

    #[error("Validator {0} has zero potential power")]
    ZeroPotentialPower(Address),

    #[error("Validator {0} is not bonded")]
    ValidatorNotBonded(Address),

    #[error("No last power recorded for validator {0}")]
    NoLastPower(Address),

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bank error: {0}")]
    Bank(#[from] BankError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl StakingError {
    /// Fatal errors abort block processing instead of a single transaction
    pub fn is_fatal(&self) -> bool {
        matches!(self, StakingError::Invariant(_))
    }
}

/// Broken ledger invariants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("Invalid status transition for {validator}: {from:?} -> {to:?}")]
    InvalidTransition {
        validator: Address,
        from: BondStatus,
        to: BondStatus,
    },

    #[error("Validator {0} is already jailed")]
    AlreadyJailed(Address),

    #[error("Validator {0} is not jailed")]
    NotJailed(Address),

    #[error("Jailed validator {0} found in the power index")]
    JailedInPowerIndex(Address),

    #[error("Index entry refers to missing validator {0}")]
    MissingValidator(Address),

    #[error("Binding refers to missing proxy {0}")]
    MissingProxy(Address),

    #[error("Shares of validator {validator} would go negative ({shares} - {sub})")]
    SharesUnderflow { validator: Address, shares: u64, sub: u64 },

    #[error("Delegated tokens of proxy {proxy} would go negative ({total} {delta:+})")]
    ProxyTotalUnderflow { proxy: Address, total: u64, delta: i128 },

    #[error("Power index entry for {validator} records {indexed}, validator has {actual}")]
    PowerIndexMismatch { validator: Address, indexed: u64, actual: u64 },

    #[error("Validator {0} missing from the power index")]
    MissingPowerIndexEntry(Address),

    #[error("Validator {validator} has shares {recorded}, delegators sum to {expected}")]
    SharesMismatch { validator: Address, recorded: u64, expected: u64 },

    #[error("Proxy {proxy} records {recorded} delegated tokens, followers sum to {expected}")]
    ProxyTotalMismatch { proxy: Address, recorded: u64, expected: u64 },

    #[error("Proxy index entry ({proxy}, {delegator}) does not match the delegator binding")]
    ProxyIndexMismatch { proxy: Address, delegator: Address },

    #[error("Undelegation of {0} is not indexed exactly once at its completion time")]
    QueueIndexMismatch(Address),

    #[error("Corrupt key in table {0:#04x}")]
    CorruptKey(u8),
}
