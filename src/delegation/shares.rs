//! Delegation and the shares engine
//!
//! A delegator's weight is applied in full to every validator of its slate.
//! Re-weighting a slate subtracts the old shares and adds the new shares on
//! each of its validators, keeping the power index in step.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::delegator::{shares_from_tokens, Delegator};
use crate::bank::Bank;
use crate::error::{InvariantViolation, StakingError, StakingResult};
use crate::events::StakingEvent;
use crate::keeper::Keeper;
use crate::store::{keys, KvStore};
use crate::types::{Address, BlockContext, Timestamp};
use crate::validators::Validator;

impl<S: KvStore, B: Bank> Keeper<S, B> {
    // ========== Records ==========

    /// Get delegator by address
    pub fn delegator(&self, address: &Address) -> StakingResult<Option<Delegator>> {
        self.get(&keys::delegator_key(address))
    }

    /// Get delegator or fail with `NotInDelegating`
    pub fn must_get_delegator(&self, address: &Address) -> StakingResult<Delegator> {
        self.delegator(address)?.ok_or(StakingError::NotInDelegating(*address))
    }

    /// All delegators, ascending by address
    pub fn delegators(&self) -> StakingResult<Vec<Delegator>> {
        let entries = self.store.prefix_entries(&[keys::DELEGATOR_PREFIX])?;
        Self::decode_all(entries)
    }

    pub(crate) fn set_delegator(&mut self, delegator: &Delegator) -> StakingResult<()> {
        self.set(&keys::delegator_key(&delegator.delegator_address), delegator)
    }

    pub(crate) fn delete_delegator(&mut self, address: &Address) -> StakingResult<()> {
        self.delete(&keys::delegator_key(address))
    }

    // ========== Shares engine ==========

    /// Is the validator unable to take more weight?
    fn in_dismission(&self, validator: &Validator) -> bool {
        validator.min_self_delegation < self.params.min_self_delegation
    }

    /// Replace `old` shares by `new` shares on one validator, moving its
    /// power index entry. Deletes the validator if this leaves it in the
    /// zero state.
    fn adjust_validator_shares(&mut self, operator: &Address, old: u64, new: u64) -> StakingResult<()> {
        let mut validator = self.validator(operator)?.ok_or(InvariantViolation::MissingValidator(*operator))?;

        self.delete_validator_by_power_index(&validator)?;
        validator.delegator_shares = validator
            .delegator_shares
            .checked_sub(old)
            .ok_or(InvariantViolation::SharesUnderflow {
                validator: *operator,
                shares: validator.delegator_shares,
                sub: old,
            })?
            .checked_add(new)
            .ok_or(StakingError::Overflow)?;

        if validator.is_removable() {
            return self.remove_validator(&validator);
        }
        self.set_validator(&validator)?;
        self.set_validator_by_power_index(&validator)?;
        debug!("Validator {} shares {} (-{} +{})", operator, validator.delegator_shares, old, new);
        Ok(())
    }

    /// Re-weight the delegator's existing slate with `tokens`.
    /// No-op for a delegator without a slate.
    pub(crate) fn update_shares(&mut self, delegator: &mut Delegator, tokens: u64) -> StakingResult<()> {
        if !delegator.has_slate() {
            return Ok(());
        }

        let old_shares = delegator.shares;
        let new_shares = shares_from_tokens(tokens);
        for operator in &delegator.validator_addresses {
            let validator = self.validator(operator)?.ok_or(InvariantViolation::MissingValidator(*operator))?;
            if new_shares > old_shares && self.in_dismission(&validator) {
                return Err(StakingError::AddSharesToDismission(*operator));
            }
        }

        for operator in &delegator.validator_addresses {
            self.adjust_validator_shares(operator, old_shares, new_shares)?;
        }
        delegator.shares = new_shares;
        self.set_delegator(delegator)
    }

    /// Apply the weight of `tokens` to every validator of a new slate.
    /// Returns the shares applied.
    pub(crate) fn add_shares_to_validators(&mut self, slate: &[Address], tokens: u64) -> StakingResult<u64> {
        for operator in slate {
            let validator = self.must_get_validator(operator)?;
            if self.in_dismission(&validator) {
                return Err(StakingError::AddSharesToDismission(*operator));
            }
        }

        let shares = shares_from_tokens(tokens);
        for operator in slate {
            self.adjust_validator_shares(operator, 0, shares)?;
        }
        Ok(shares)
    }

    /// Take `shares` back from every validator of a slate
    pub(crate) fn withdraw_last_shares(&mut self, slate: &[Address], shares: u64) -> StakingResult<()> {
        for operator in slate {
            self.adjust_validator_shares(operator, shares, 0)?;
        }
        Ok(())
    }

    // ========== Operations ==========

    /// Amounts below the minimum, and zero, are rejected
    fn check_delegation_amount(&self, amount: u64) -> StakingResult<()> {
        let min = self.params.min_delegation.max(1);
        if amount < min {
            return Err(StakingError::InsufficientDelegation { amount, min });
        }
        Ok(())
    }

    /// Stake `amount` tokens. The weight goes to the delegator's slate, or
    /// to its proxy's slate when it is bound to one.
    pub fn delegate(&mut self, address: &Address, amount: u64) -> StakingResult<()> {
        self.check_delegation_amount(amount)?;

        self.move_to_bonded_pool(address, amount)?;

        let mut delegator = self.delegator(address)?.unwrap_or_else(|| Delegator::new(*address));
        delegator.tokens = delegator.tokens.checked_add(amount).ok_or(StakingError::Overflow)?;
        self.set_delegator(&delegator)?;

        if delegator.has_proxy() {
            self.update_proxy(&delegator, i128::from(amount))?;
        } else {
            let tokens = delegator.voting_tokens().ok_or(StakingError::Overflow)?;
            self.update_shares(&mut delegator, tokens)?;
        }

        info!("Delegated {} from {}", amount, address);
        self.emit(StakingEvent::Delegated { delegator: *address, amount });
        Ok(())
    }

    /// Unstake `amount` tokens. They enter the delegator's undelegation
    /// record; the returned time is when the record unlocks.
    pub fn withdraw(&mut self, ctx: &BlockContext, address: &Address, amount: u64) -> StakingResult<Timestamp> {
        self.check_delegation_amount(amount)?;
        let mut delegator = self.must_get_delegator(address)?;
        if amount > delegator.tokens {
            return Err(StakingError::InsufficientQuantity { requested: amount, available: delegator.tokens });
        }
        if delegator.is_proxy && amount == delegator.tokens {
            return Err(StakingError::InvalidProxyWithdrawTotal(*address));
        }

        self.move_from_bonded_pool(amount)?;

        delegator.tokens -= amount;
        if delegator.has_proxy() {
            self.update_proxy(&delegator, -i128::from(amount))?;
        }

        if delegator.tokens == 0 {
            self.withdraw_last_shares(&delegator.validator_addresses, delegator.shares)?;
            if let Some(proxy) = delegator.proxy_address {
                self.delete(&keys::proxy_key(&proxy, address))?;
            }
            self.delete_delegator(address)?;
            debug!("Delegator {} removed", address);
        } else {
            self.set_delegator(&delegator)?;
            if !delegator.has_proxy() {
                let tokens = delegator.voting_tokens().ok_or(StakingError::Overflow)?;
                self.update_shares(&mut delegator, tokens)?;
            }
        }

        let completion_time = self.merge_undelegation(ctx, address, amount)?;
        info!("Withdrawn {} from {} (unlocks at {})", amount, address, completion_time);
        self.emit(StakingEvent::Withdrawn { delegator: *address, amount, completion_time });
        Ok(completion_time)
    }

    /// Choose the validators to vote for, replacing the previous slate
    pub fn add_shares(&mut self, address: &Address, validators: Vec<Address>) -> StakingResult<()> {
        let mut delegator = self.must_get_delegator(address)?;
        if delegator.has_proxy() {
            return Err(StakingError::AlreadyBound(*address));
        }
        if validators.is_empty() {
            return Err(StakingError::EmptyValidators);
        }
        let max = usize::from(self.params.max_vals_to_add_shares);
        if validators.len() > max {
            return Err(StakingError::ExceedValidatorAddrs { count: validators.len(), max });
        }
        let mut seen = BTreeSet::new();
        for operator in &validators {
            if !seen.insert(*operator) {
                return Err(StakingError::DuplicateValidator(*operator));
            }
            let validator = self.must_get_validator(operator)?;
            if self.in_dismission(&validator) {
                return Err(StakingError::AddSharesToDismission(*operator));
            }
        }

        self.withdraw_last_shares(&delegator.validator_addresses, delegator.shares)?;
        let tokens = delegator.voting_tokens().ok_or(StakingError::Overflow)?;
        let shares = self.add_shares_to_validators(&validators, tokens)?;

        delegator.validator_addresses = validators.clone();
        delegator.shares = shares;
        self.set_delegator(&delegator)?;

        info!("Delegator {} votes for {} validators with {} shares", address, validators.len(), shares);
        self.emit(StakingEvent::SharesAdded { delegator: *address, validators, shares });
        Ok(())
    }
}
