//! Validator ledger
//!
//! Validators by operator, the power index, the last-reported power
//! snapshot and the unbonding queue, plus the bonding state machine:
//!
//! ```text
//! Unbonded --bond--> Bonded --begin unbonding--> Unbonding --mature--> Unbonded
//!                      ^                              |
//!                      +------------bond--------------+
//! ```
//!
//! The power index key embeds the validator's potential power. Any change
//! to shares, tokens or status therefore deletes the old entry first,
//! mutates, and inserts the entry for the new state.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::validator::{BondStatus, Validator};
use crate::bank::Bank;
use crate::error::{InvariantViolation, StakingError, StakingResult};
use crate::events::StakingEvent;
use crate::keeper::Keeper;
use crate::store::{keys, KvPair, KvStore};
use crate::types::{Address, BlockContext, ConsensusPubKey, Timestamp};

impl<S: KvStore, B: Bank> Keeper<S, B> {
    // ========== Records ==========

    /// Get validator by operator address
    pub fn validator(&self, operator: &Address) -> StakingResult<Option<Validator>> {
        self.get(&keys::validator_key(operator))
    }

    /// Get validator or fail with `NoValidatorFound`
    pub fn must_get_validator(&self, operator: &Address) -> StakingResult<Validator> {
        self.validator(operator)?.ok_or(StakingError::NoValidatorFound(*operator))
    }

    /// All validators, ascending by operator address
    pub fn validators(&self) -> StakingResult<Vec<Validator>> {
        let entries = self.store.prefix_entries(&[keys::VALIDATOR_PREFIX])?;
        Self::decode_all(entries)
    }

    /// Operator of the validator using a consensus key
    pub fn validator_by_consensus_key(&self, key: &ConsensusPubKey) -> StakingResult<Option<Validator>> {
        match self.get::<Address>(&keys::validator_by_cons_key(key))? {
            Some(operator) => self.validator(&operator),
            None => Ok(None),
        }
    }

    pub(crate) fn set_validator(&mut self, validator: &Validator) -> StakingResult<()> {
        self.set(&keys::validator_key(&validator.operator_address), validator)
    }

    /// Delete a validator in the zero state along with its index entries
    pub(crate) fn remove_validator(&mut self, validator: &Validator) -> StakingResult<()> {
        if !validator.is_removable() {
            return Err(InvariantViolation::InvalidTransition {
                validator: validator.operator_address,
                from: validator.status,
                to: BondStatus::Unbonded,
            }
            .into());
        }
        self.delete_validator_by_power_index(validator)?;
        self.delete(&keys::validator_by_cons_key(&validator.consensus_pubkey))?;
        self.delete(&keys::validator_key(&validator.operator_address))?;
        info!("Validator removed: {}", validator.operator_address);
        self.emit(StakingEvent::ValidatorRemoved { operator: validator.operator_address });
        Ok(())
    }

    // ========== Power index ==========

    /// Insert the power index entry for the validator's current state.
    /// Jailed and dismissed validators are never indexed.
    pub(crate) fn set_validator_by_power_index(&mut self, validator: &Validator) -> StakingResult<()> {
        if !validator.is_electable() {
            return Ok(());
        }
        let power = validator.potential_power(self.params.power_reduction);
        debug!("Indexing validator {} at power {}", validator.operator_address, power);
        self.set(&keys::validator_by_power_key(power, &validator.operator_address), &validator.operator_address)
    }

    /// Delete the power index entry for the validator's current state
    pub(crate) fn delete_validator_by_power_index(&mut self, validator: &Validator) -> StakingResult<()> {
        let power = validator.potential_power(self.params.power_reduction);
        self.delete(&keys::validator_by_power_key(power, &validator.operator_address))
    }

    /// Electable validators, highest power first
    pub fn validators_by_power(&self) -> StakingResult<Vec<(Address, u64)>> {
        let entries = self.store.reverse_prefix_entries(&[keys::VALIDATOR_BY_POWER_PREFIX])?;
        Self::decode_power_index(entries)
    }

    /// The `limit` most powerful electable validators, highest first
    pub fn top_validators_by_power(&self, limit: usize) -> StakingResult<Vec<(Address, u64)>> {
        let entries = self.store.reverse_prefix_entries_limit(&[keys::VALIDATOR_BY_POWER_PREFIX], limit)?;
        Self::decode_power_index(entries)
    }

    fn decode_power_index(entries: Vec<KvPair>) -> StakingResult<Vec<(Address, u64)>> {
        entries
            .into_iter()
            .map(|(key, _)| {
                keys::split_timed_key(&key)
                    .map(|(power, operator)| (operator, power))
                    .ok_or_else(|| InvariantViolation::CorruptKey(keys::VALIDATOR_BY_POWER_PREFIX).into())
            })
            .collect()
    }

    /// Bonded validators, highest power first
    pub fn bonded_validators_by_power(&self) -> StakingResult<Vec<Validator>> {
        let mut bonded = Vec::new();
        for (operator, _) in self.validators_by_power()? {
            let validator = self.validator(&operator)?.ok_or(InvariantViolation::MissingValidator(operator))?;
            if validator.is_bonded() {
                bonded.push(validator);
            }
        }
        Ok(bonded)
    }

    // ========== Last bonded snapshot ==========

    /// Power reported to consensus for this validator at the last update
    pub fn last_validator_power(&self, operator: &Address) -> StakingResult<Option<u64>> {
        self.get(&keys::last_validator_power_key(operator))
    }

    pub(crate) fn set_last_validator_power(&mut self, operator: &Address, power: u64) -> StakingResult<()> {
        self.set(&keys::last_validator_power_key(operator), &power)
    }

    pub(crate) fn delete_last_validator_power(&mut self, operator: &Address) -> StakingResult<()> {
        self.delete(&keys::last_validator_power_key(operator))
    }

    /// The whole snapshot, sorted by operator address
    pub fn last_validator_powers(&self) -> StakingResult<BTreeMap<Address, u64>> {
        let mut powers = BTreeMap::new();
        for (key, value) in self.store.prefix_entries(&[keys::LAST_VALIDATOR_POWER_PREFIX])? {
            let operator = keys::trailing_address(&key)
                .ok_or(InvariantViolation::CorruptKey(keys::LAST_VALIDATOR_POWER_PREFIX))?;
            let power: u64 = bincode::deserialize(&value).map_err(crate::store::StoreError::from)?;
            powers.insert(operator, power);
        }
        Ok(powers)
    }

    /// Total power of the bonded set at the last update
    pub fn last_total_power(&self) -> StakingResult<u64> {
        Ok(self.get(&keys::last_total_power_key())?.unwrap_or(0))
    }

    pub(crate) fn set_last_total_power(&mut self, power: u64) -> StakingResult<()> {
        self.set(&keys::last_total_power_key(), &power)
    }

    // ========== State machine ==========

    /// Unbonded/Unbonding -> Bonded
    pub(crate) fn bond_validator(&mut self, mut validator: Validator) -> StakingResult<Validator> {
        if validator.is_bonded() {
            return Err(InvariantViolation::InvalidTransition {
                validator: validator.operator_address,
                from: validator.status,
                to: BondStatus::Bonded,
            }
            .into());
        }

        self.delete_validator_by_power_index(&validator)?;
        if validator.is_unbonding() {
            self.delete(&keys::validator_queue_key(
                validator.unbonding_completion_time,
                &validator.operator_address,
            ))?;
        }

        validator.status = BondStatus::Bonded;
        self.set_validator(&validator)?;
        self.set_validator_by_power_index(&validator)?;

        info!("Validator bonded: {}", validator.operator_address);
        self.emit(StakingEvent::ValidatorBonded { operator: validator.operator_address });
        Ok(validator)
    }

    /// Bonded -> Unbonding; queues the validator for the unbonding sweep
    pub(crate) fn begin_unbonding_validator(
        &mut self,
        ctx: &BlockContext,
        mut validator: Validator,
    ) -> StakingResult<Validator> {
        if !validator.is_bonded() {
            return Err(InvariantViolation::InvalidTransition {
                validator: validator.operator_address,
                from: validator.status,
                to: BondStatus::Unbonding,
            }
            .into());
        }

        self.delete_validator_by_power_index(&validator)?;

        validator.status = BondStatus::Unbonding;
        validator.unbonding_completion_time = ctx.time.saturating_add(self.params.unbonding_time_secs);
        validator.unbonding_height = ctx.height;
        self.set_validator(&validator)?;
        self.set_validator_by_power_index(&validator)?;
        self.set_marker(&keys::validator_queue_key(
            validator.unbonding_completion_time,
            &validator.operator_address,
        ))?;

        info!(
            "Validator begins unbonding: {} (completes at {})",
            validator.operator_address, validator.unbonding_completion_time
        );
        self.emit(StakingEvent::ValidatorBeginUnbonding { operator: validator.operator_address });
        Ok(validator)
    }

    /// Unbonding -> Unbonded
    fn complete_unbonding_validator(&mut self, mut validator: Validator) -> StakingResult<Validator> {
        if !validator.is_unbonding() {
            return Err(InvariantViolation::InvalidTransition {
                validator: validator.operator_address,
                from: validator.status,
                to: BondStatus::Unbonded,
            }
            .into());
        }
        validator.status = BondStatus::Unbonded;
        self.set_validator(&validator)?;
        info!("Validator unbonded: {}", validator.operator_address);
        self.emit(StakingEvent::ValidatorUnbonded { operator: validator.operator_address });
        Ok(validator)
    }

    /// Move every validator whose unbonding period has ended to Unbonded,
    /// deleting those left in the zero state. Returns the operators swept.
    pub fn unbond_all_matured_validators(&mut self, ctx: &BlockContext) -> StakingResult<Vec<Address>> {
        let start = [keys::VALIDATOR_QUEUE_PREFIX];
        let end = keys::queue_end(keys::VALIDATOR_QUEUE_PREFIX, ctx.time);
        let matured = self.store.range_entries(&start, &end)?;

        let mut swept = Vec::with_capacity(matured.len());
        for (key, _) in matured {
            let (time, operator) =
                keys::split_timed_key(&key).ok_or(InvariantViolation::CorruptKey(keys::VALIDATOR_QUEUE_PREFIX))?;
            self.delete(&key)?;

            let validator = self.validator(&operator)?.ok_or(InvariantViolation::MissingValidator(operator))?;
            if !validator.is_unbonding() || validator.unbonding_completion_time != time {
                // re-bonded since it was queued
                continue;
            }
            let validator = self.complete_unbonding_validator(validator)?;
            if validator.is_removable() {
                self.remove_validator(&validator)?;
            }
            swept.push(operator);
        }
        Ok(swept)
    }

    // ========== Jailing ==========

    pub(crate) fn jail_validator(&mut self, mut validator: Validator) -> StakingResult<Validator> {
        if validator.jailed {
            return Err(InvariantViolation::AlreadyJailed(validator.operator_address).into());
        }
        self.delete_validator_by_power_index(&validator)?;
        validator.jailed = true;
        self.set_validator(&validator)?;
        info!("Validator jailed: {}", validator.operator_address);
        self.emit(StakingEvent::ValidatorJailed { operator: validator.operator_address });
        Ok(validator)
    }

    pub(crate) fn unjail_validator(&mut self, mut validator: Validator) -> StakingResult<Validator> {
        if !validator.jailed {
            return Err(InvariantViolation::NotJailed(validator.operator_address).into());
        }
        validator.jailed = false;
        self.set_validator(&validator)?;
        self.set_validator_by_power_index(&validator)?;
        info!("Validator unjailed: {}", validator.operator_address);
        self.emit(StakingEvent::ValidatorUnjailed { operator: validator.operator_address });
        Ok(validator)
    }

    /// Jail a validator. Entry point for punishment features; jailing an
    /// already jailed validator is an invariant violation.
    pub fn jail(&mut self, operator: &Address) -> StakingResult<()> {
        let validator = self.must_get_validator(operator)?;
        self.jail_validator(validator)?;
        Ok(())
    }

    /// Unjail request from the operator
    pub fn unjail(&mut self, operator: &Address) -> StakingResult<()> {
        let validator = self.must_get_validator(operator)?;
        if !validator.jailed {
            return Err(StakingError::ValidatorNotJailed(*operator));
        }
        if validator.is_dismissed() {
            return Err(StakingError::ValidatorDismissed(*operator));
        }
        self.unjail_validator(validator)?;
        Ok(())
    }

    // ========== Registration ==========

    /// Register a validator, locking `min_self_delegation` from the operator
    pub fn create_validator(
        &mut self,
        operator: &Address,
        consensus_pubkey: ConsensusPubKey,
        min_self_delegation: u64,
        commission: u16,
    ) -> StakingResult<Validator> {
        if self.validator(operator)?.is_some() {
            return Err(StakingError::ValidatorExists(*operator));
        }
        if let Some(holder) = self.get::<Address>(&keys::validator_by_cons_key(&consensus_pubkey))? {
            return Err(StakingError::ConsensusKeyTaken(holder));
        }
        if min_self_delegation < self.params.min_self_delegation {
            return Err(StakingError::BadMinSelfDelegation {
                got: min_self_delegation,
                required: self.params.min_self_delegation,
            });
        }

        self.move_to_bonded_pool(operator, min_self_delegation)?;

        let mut validator = Validator::new(*operator, consensus_pubkey, min_self_delegation, commission);
        validator.tokens = min_self_delegation;
        self.set_validator(&validator)?;
        self.set(&keys::validator_by_cons_key(&consensus_pubkey), operator)?;
        self.set_validator_by_power_index(&validator)?;

        info!("Validator created: {} (self delegation {})", operator, min_self_delegation);
        self.emit(StakingEvent::ValidatorCreated { operator: *operator });
        Ok(validator)
    }

    /// Dismiss a validator: its deposit enters the operator's undelegation
    /// record and it stops accepting shares. The record itself is deleted
    /// once it is unbonded and every delegator has left it.
    pub fn destroy_validator(&mut self, ctx: &BlockContext, operator: &Address) -> StakingResult<Timestamp> {
        let mut validator = self.must_get_validator(operator)?;
        if validator.is_dismissed() {
            return Err(StakingError::ValidatorDismissed(*operator));
        }

        let deposit = validator.tokens;
        self.move_from_bonded_pool(deposit)?;

        self.delete_validator_by_power_index(&validator)?;
        validator.min_self_delegation = 0;
        validator.tokens = 0;
        if validator.is_removable() {
            self.remove_validator(&validator)?;
        } else {
            self.set_validator(&validator)?;
        }

        let completion_time = self.merge_undelegation(ctx, operator, deposit)?;
        info!("Validator destroyed: {} (deposit {} unlocks at {})", operator, deposit, completion_time);
        self.emit(StakingEvent::ValidatorDestroyed { operator: *operator });
        Ok(completion_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::Pool;
    use crate::test_utils::*;

    #[test]
    fn test_create_validator_locks_deposit() {
        let mut keeper = setup_keeper();
        let op = operator(1);
        let before = keeper.bank().balance(&op);

        let v = keeper.create_validator(&op, cons_key(1), MIN_SELF, 0).unwrap();
        assert!(v.is_unbonded());
        assert_eq!(v.tokens, MIN_SELF);
        assert_eq!(keeper.bank().balance(&op), before - MIN_SELF);
        assert_eq!(keeper.bank().pool_balance(Pool::Bonded), MIN_SELF);
        assert_eq!(keeper.validator_by_consensus_key(&cons_key(1)).unwrap().unwrap(), v);
        assert_eq!(keeper.validators_by_power().unwrap(), vec![(op, 0)]);
    }

    #[test]
    fn test_create_validator_rejections() {
        let mut keeper = setup_keeper();
        keeper.create_validator(&operator(1), cons_key(1), MIN_SELF, 0).unwrap();

        assert_eq!(
            keeper.create_validator(&operator(1), cons_key(2), MIN_SELF, 0).unwrap_err(),
            StakingError::ValidatorExists(operator(1))
        );
        assert_eq!(
            keeper.create_validator(&operator(2), cons_key(1), MIN_SELF, 0).unwrap_err(),
            StakingError::ConsensusKeyTaken(operator(1))
        );
        assert!(matches!(
            keeper.create_validator(&operator(2), cons_key(2), MIN_SELF - 1, 0),
            Err(StakingError::BadMinSelfDelegation { .. })
        ));
    }

    #[test]
    fn test_bond_and_unbond_cycle() {
        let mut keeper = setup_keeper();
        let op = operator(1);
        let v = keeper.create_validator(&op, cons_key(1), MIN_SELF, 0).unwrap();

        let v = keeper.bond_validator(v).unwrap();
        assert!(v.is_bonded());

        let ctx = ctx_at(5, 1_000);
        let v = keeper.begin_unbonding_validator(&ctx, v).unwrap();
        assert!(v.is_unbonding());
        assert_eq!(v.unbonding_height, 5);
        assert_eq!(v.unbonding_completion_time, 1_000 + UNBONDING_SECS);

        // not matured yet
        let early = ctx_at(6, 1_000 + UNBONDING_SECS - 1);
        assert!(keeper.unbond_all_matured_validators(&early).unwrap().is_empty());

        let late = ctx_at(7, 1_000 + UNBONDING_SECS);
        assert_eq!(keeper.unbond_all_matured_validators(&late).unwrap(), vec![op]);
        assert!(keeper.must_get_validator(&op).unwrap().is_unbonded());
    }

    #[test]
    fn test_rebond_clears_unbonding_queue() {
        let mut keeper = setup_keeper();
        let v = keeper.create_validator(&operator(1), cons_key(1), MIN_SELF, 0).unwrap();
        let v = keeper.bond_validator(v).unwrap();
        let v = keeper.begin_unbonding_validator(&ctx_at(1, 10), v).unwrap();
        let v = keeper.bond_validator(v).unwrap();
        assert!(v.is_bonded());

        let swept = keeper.unbond_all_matured_validators(&ctx_at(2, 10 + UNBONDING_SECS)).unwrap();
        assert!(swept.is_empty());
        assert!(keeper.must_get_validator(&operator(1)).unwrap().is_bonded());
    }

    #[test]
    fn test_invalid_transitions_are_fatal() {
        let mut keeper = setup_keeper();
        let v = keeper.create_validator(&operator(1), cons_key(1), MIN_SELF, 0).unwrap();

        let err = keeper.begin_unbonding_validator(&ctx_at(1, 1), v.clone()).unwrap_err();
        assert!(err.is_fatal());

        let bonded = keeper.bond_validator(v).unwrap();
        let err = keeper.bond_validator(bonded).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_jail_removes_from_power_index() {
        let mut keeper = setup_keeper();
        let op = operator(1);
        keeper.create_validator(&op, cons_key(1), MIN_SELF, 0).unwrap();

        keeper.jail(&op).unwrap();
        assert!(keeper.validators_by_power().unwrap().is_empty());
        assert!(keeper.must_get_validator(&op).unwrap().jailed);

        // jailing twice is an invariant violation
        assert!(keeper.jail(&op).unwrap_err().is_fatal());

        keeper.unjail(&op).unwrap();
        assert_eq!(keeper.validators_by_power().unwrap(), vec![(op, 0)]);
        assert_eq!(keeper.unjail(&op).unwrap_err(), StakingError::ValidatorNotJailed(op));
    }

    #[test]
    fn test_top_validators_by_power_is_bounded() {
        let mut keeper = setup_keeper();
        for n in 1..=4 {
            keeper.create_validator(&operator(n), cons_key(n), MIN_SELF, 0).unwrap();
        }
        delegate_to(&mut keeper, delegator(1), 100, &[operator(1)]);
        delegate_to(&mut keeper, delegator(2), 400, &[operator(2)]);
        delegate_to(&mut keeper, delegator(3), 300, &[operator(3)]);

        let top = keeper.top_validators_by_power(2).unwrap();
        assert_eq!(top, vec![(operator(2), 400), (operator(3), 300)]);
        assert_eq!(top[..], keeper.validators_by_power().unwrap()[..2]);
        assert_eq!(keeper.top_validators_by_power(10).unwrap().len(), 4);

        // buffered changes count before they are committed
        let mut cached = keeper.cache();
        cached.jail(&operator(2)).unwrap();
        cached.delegate(&delegator(4), 50).unwrap();
        cached.add_shares(&delegator(4), vec![operator(1)]).unwrap();
        assert_eq!(
            cached.top_validators_by_power(2).unwrap(),
            vec![(operator(3), 300), (operator(1), 150)]
        );
    }

    #[test]
    fn test_destroy_unbonded_validator_without_shares_removes_it() {
        let mut keeper = setup_keeper();
        let op = operator(1);
        keeper.create_validator(&op, cons_key(1), MIN_SELF, 0).unwrap();

        let completion = keeper.destroy_validator(&ctx_at(3, 100), &op).unwrap();
        assert_eq!(completion, 100 + UNBONDING_SECS);
        assert!(keeper.validator(&op).unwrap().is_none());
        assert!(keeper.validator_by_consensus_key(&cons_key(1)).unwrap().is_none());
        assert!(keeper.validators_by_power().unwrap().is_empty());

        let record = keeper.undelegation(&op).unwrap().unwrap();
        assert_eq!(record.quantity, MIN_SELF);
        assert_eq!(keeper.bank().pool_balance(Pool::NotBonded), MIN_SELF);
    }

    #[test]
    fn test_destroy_twice_rejected() {
        let mut keeper = setup_keeper();
        let op = operator(1);
        let v = keeper.create_validator(&op, cons_key(1), MIN_SELF, 0).unwrap();
        keeper.bond_validator(v).unwrap();

        keeper.destroy_validator(&ctx_at(1, 1), &op).unwrap();
        let v = keeper.must_get_validator(&op).unwrap();
        assert!(v.is_dismissed());
        assert_eq!(
            keeper.destroy_validator(&ctx_at(1, 2), &op).unwrap_err(),
            StakingError::ValidatorDismissed(op)
        );
    }
}
