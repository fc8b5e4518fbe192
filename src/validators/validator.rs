//! Validator record

use serde::{Deserialize, Serialize};

use crate::types::{Address, ConsensusPubKey, Timestamp};

/// Validator bonding status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondStatus {
    /// Not in the active set
    Unbonded,
    /// Recently left the active set, waiting out the unbonding period
    Unbonding,
    /// In the active set
    Bonded,
}

/// Registered validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Operator account (primary key)
    pub operator_address: Address,
    /// Key the validator signs consensus messages with
    pub consensus_pubkey: ConsensusPubKey,
    /// Jailed validators are never electable
    pub jailed: bool,
    /// Bonding status
    pub status: BondStatus,
    /// Self-bonded deposit
    pub tokens: u64,
    /// Sum of the shares every delegator's slate assigns to this validator
    pub delegator_shares: u64,
    /// Deposit locked at creation; zero once the operator dismisses it
    pub min_self_delegation: u64,
    /// Commission rate (0-10000 = 0-100%)
    pub commission: u16,
    /// Height at which unbonding started
    pub unbonding_height: u64,
    /// Time at which unbonding completes
    pub unbonding_completion_time: Timestamp,
}

impl Validator {
    /// Create a new, unbonded validator
    pub fn new(
        operator_address: Address,
        consensus_pubkey: ConsensusPubKey,
        min_self_delegation: u64,
        commission: u16,
    ) -> Self {
        Self {
            operator_address,
            consensus_pubkey,
            jailed: false,
            status: BondStatus::Unbonded,
            tokens: 0,
            delegator_shares: 0,
            min_self_delegation,
            commission: commission.min(10000),
            unbonding_height: 0,
            unbonding_completion_time: 0,
        }
    }

    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }

    pub fn is_unbonding(&self) -> bool {
        self.status == BondStatus::Unbonding
    }

    pub fn is_unbonded(&self) -> bool {
        self.status == BondStatus::Unbonded
    }

    /// The operator has withdrawn its self-delegation
    pub fn is_dismissed(&self) -> bool {
        self.min_self_delegation == 0
    }

    /// Can this validator sit in the power index?
    pub fn is_electable(&self) -> bool {
        !self.jailed && !self.is_dismissed()
    }

    /// Nothing references this validator any more; it can be deleted
    pub fn is_removable(&self) -> bool {
        self.is_unbonded() && self.is_dismissed() && self.delegator_shares == 0
    }

    /// Power the validator would have if bonded
    pub fn potential_power(&self, power_reduction: u64) -> u64 {
        self.delegator_shares / power_reduction.max(1)
    }

    /// Power the validator has in consensus right now
    pub fn consensus_power(&self, power_reduction: u64) -> u64 {
        if self.is_bonded() {
            self.potential_power(power_reduction)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        Validator::new(Address::new([1u8; 32]), ConsensusPubKey::new([2u8; 32]), 100, 500)
    }

    #[test]
    fn test_new_validator_is_unbonded() {
        let v = validator();
        assert!(v.is_unbonded());
        assert_eq!(v.delegator_shares, 0);
        assert_eq!(v.tokens, 0);
        assert!(v.is_electable());
        assert!(!v.is_removable());
    }

    #[test]
    fn test_commission_capped() {
        let v = Validator::new(Address::zero(), ConsensusPubKey::new([0u8; 32]), 1, 20000);
        assert_eq!(v.commission, 10000);
    }

    #[test]
    fn test_power_only_counts_when_bonded() {
        let mut v = validator();
        v.delegator_shares = 2500;
        assert_eq!(v.potential_power(10), 250);
        assert_eq!(v.consensus_power(10), 0);
        v.status = BondStatus::Bonded;
        assert_eq!(v.consensus_power(10), 250);
    }

    #[test]
    fn test_removable_requires_zero_state() {
        let mut v = validator();
        v.min_self_delegation = 0;
        assert!(v.is_removable());
        v.delegator_shares = 1;
        assert!(!v.is_removable());
        v.delegator_shares = 0;
        v.status = BondStatus::Unbonding;
        assert!(!v.is_removable());
    }

    #[test]
    fn test_jailed_or_dismissed_not_electable() {
        let mut v = validator();
        v.jailed = true;
        assert!(!v.is_electable());
        v.jailed = false;
        v.min_self_delegation = 0;
        assert!(!v.is_electable());
    }
}
