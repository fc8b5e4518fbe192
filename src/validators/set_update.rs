//! End-of-block validator set reconciliation
//!
//! Two policies share the ledger and the last-power snapshot:
//! - [`PowerRankedUpdater`] elects the top `max_validators` of the power index
//! - [`AuthorityUpdater`] applies explicit add/remove instructions queued by
//!   [`Keeper::propose_membership_change`]
//!
//! Both return the diff against the previous snapshot as a list of
//! [`ValidatorUpdate`]s. Power zero means "remove from the active set".

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bank::Bank;
use crate::error::{InvariantViolation, StakingError, StakingResult};
use crate::keeper::Keeper;
use crate::params::SetUpdatePolicy;
use crate::store::{keys, KvStore};
use crate::types::{Address, BlockContext, ConsensusPubKey};

/// Power change reported to the consensus engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: ConsensusPubKey,
    pub power: u64,
}

impl ValidatorUpdate {
    pub fn new(pub_key: ConsensusPubKey, power: u64) -> Self {
        Self { pub_key, power }
    }

    /// Is this a removal from the active set?
    pub fn is_removal(&self) -> bool {
        self.power == 0
    }
}

/// `<consensus address hex>=<power>`, the name the consensus engine logs
impl fmt::Display for ValidatorUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", hex::encode(self.pub_key.consensus_address()), self.power)
    }
}

/// Explicit membership instruction for the authority policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipChange {
    Add,
    Remove,
}

/// Validator set maintenance policy
pub trait ValidatorSetUpdater {
    /// Reconcile the bonded set for this block and return the updates
    fn apply_updates<S: KvStore, B: Bank>(
        &self,
        keeper: &mut Keeper<S, B>,
        ctx: &BlockContext,
    ) -> StakingResult<Vec<ValidatorUpdate>>;
}

/// Top-N by power
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerRankedUpdater;

impl ValidatorSetUpdater for PowerRankedUpdater {
    fn apply_updates<S: KvStore, B: Bank>(
        &self,
        keeper: &mut Keeper<S, B>,
        ctx: &BlockContext,
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        keeper.apply_and_return_validator_set_updates(ctx)
    }
}

/// Explicit membership from the pending table
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorityUpdater;

impl ValidatorSetUpdater for AuthorityUpdater {
    fn apply_updates<S: KvStore, B: Bank>(
        &self,
        keeper: &mut Keeper<S, B>,
        ctx: &BlockContext,
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        let changes = keeper.take_pending_membership_changes()?;
        keeper.poa_apply_and_return_validator_set_updates(ctx, &changes)
    }
}

impl<S: KvStore, B: Bank> Keeper<S, B> {
    /// Run the updater selected by `params.set_update_policy`
    pub fn apply_validator_set_updates(&mut self, ctx: &BlockContext) -> StakingResult<Vec<ValidatorUpdate>> {
        match self.params.set_update_policy {
            SetUpdatePolicy::PowerRanked => PowerRankedUpdater.apply_updates(self, ctx),
            SetUpdatePolicy::Authority => AuthorityUpdater.apply_updates(self, ctx),
        }
    }

    /// Elect the top `max_validators` validators of the power index.
    ///
    /// Candidates are bonded if needed and reported when their power differs
    /// from the snapshot. Validators in the snapshot that did not make the
    /// cut begin unbonding, in address order, and are reported with power
    /// zero. The total power is only persisted when something changed.
    pub fn apply_and_return_validator_set_updates(
        &mut self,
        ctx: &BlockContext,
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        let reduction = self.params.power_reduction;
        let max_validators = usize::from(self.params.max_validators);

        let mut last = self.last_validator_powers()?;
        let mut updates = Vec::new();
        let mut total_power: u64 = 0;

        for (operator, _) in self.top_validators_by_power(max_validators)? {
            let validator = self.validator(&operator)?.ok_or(InvariantViolation::MissingValidator(operator))?;
            if validator.jailed {
                return Err(InvariantViolation::JailedInPowerIndex(operator).into());
            }
            if validator.potential_power(reduction) == 0 {
                break;
            }

            let validator = if validator.is_bonded() { validator } else { self.bond_validator(validator)? };

            let power = validator.consensus_power(reduction);
            if last.get(&operator) != Some(&power) {
                let update = ValidatorUpdate::new(validator.consensus_pubkey, power);
                debug!("Validator {} update {}", operator, update);
                updates.push(update);
                self.set_last_validator_power(&operator, power)?;
            }
            last.remove(&operator);
            total_power = total_power.checked_add(power).ok_or(StakingError::Overflow)?;
        }

        // BTreeMap iterates in address order
        for operator in last.into_keys() {
            let validator = self.validator(&operator)?.ok_or(InvariantViolation::MissingValidator(operator))?;
            let validator = self.begin_unbonding_validator(ctx, validator)?;
            self.delete_last_validator_power(&operator)?;
            let update = ValidatorUpdate::new(validator.consensus_pubkey, 0);
            debug!("Validator {} leaves the set: {}", operator, update);
            updates.push(update);
        }

        if !updates.is_empty() {
            self.set_last_total_power(total_power)?;
            info!(
                "Validator set updated at height {}: {} changes, total power {}",
                ctx.height,
                updates.len(),
                total_power
            );
        }
        Ok(updates)
    }

    /// Apply explicit membership instructions, in address order.
    ///
    /// Instructions that no longer hold at block end (validator gone,
    /// already in the requested state, jailed, no power) are skipped.
    pub fn poa_apply_and_return_validator_set_updates(
        &mut self,
        ctx: &BlockContext,
        changes: &BTreeMap<Address, MembershipChange>,
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        let reduction = self.params.power_reduction;
        let mut total_power = self.last_total_power()?;
        let mut updates = Vec::new();

        for (operator, change) in changes {
            let Some(validator) = self.validator(operator)? else {
                warn!("Skipping membership change for unknown validator {}", operator);
                continue;
            };

            match change {
                MembershipChange::Add => {
                    if validator.is_bonded() {
                        warn!("Skipping add of {}: already bonded", operator);
                        continue;
                    }
                    if !validator.is_electable() {
                        warn!("Skipping add of {}: jailed or dismissed", operator);
                        continue;
                    }
                    if validator.potential_power(reduction) == 0 {
                        warn!("Skipping add of {}: zero power", operator);
                        continue;
                    }
                    let validator = self.bond_validator(validator)?;
                    let power = validator.consensus_power(reduction);
                    self.set_last_validator_power(operator, power)?;
                    total_power = total_power.checked_add(power).ok_or(StakingError::Overflow)?;
                    updates.push(ValidatorUpdate::new(validator.consensus_pubkey, power));
                }
                MembershipChange::Remove => {
                    if !validator.is_bonded() {
                        warn!("Skipping removal of {}: not bonded", operator);
                        continue;
                    }
                    let Some(last_power) = self.last_validator_power(operator)? else {
                        warn!("Skipping removal of {}: no recorded power", operator);
                        continue;
                    };
                    let validator = self.begin_unbonding_validator(ctx, validator)?;
                    self.delete_last_validator_power(operator)?;
                    total_power = total_power.checked_sub(last_power).ok_or(StakingError::Overflow)?;
                    updates.push(ValidatorUpdate::new(validator.consensus_pubkey, 0));
                }
            }
        }

        self.set_last_total_power(total_power)?;
        if !updates.is_empty() {
            info!(
                "Membership applied at height {}: {} changes, total power {}",
                ctx.height,
                updates.len(),
                total_power
            );
        }
        Ok(updates)
    }

    /// Queue a membership instruction for the next authority update.
    /// A later proposal for the same validator replaces the earlier one.
    pub fn propose_membership_change(&mut self, operator: &Address, change: MembershipChange) -> StakingResult<()> {
        let validator = self.must_get_validator(operator)?;
        match change {
            MembershipChange::Add => {
                if validator.is_bonded() {
                    return Err(StakingError::ValidatorAlreadyBonded(*operator));
                }
                if validator.jailed {
                    return Err(StakingError::ValidatorJailed(*operator));
                }
                if validator.is_dismissed() {
                    return Err(StakingError::ValidatorDismissed(*operator));
                }
                if validator.potential_power(self.params.power_reduction) == 0 {
                    return Err(StakingError::ZeroPotentialPower(*operator));
                }
            }
            MembershipChange::Remove => {
                if !validator.is_bonded() {
                    return Err(StakingError::ValidatorNotBonded(*operator));
                }
                if self.last_validator_power(operator)?.is_none() {
                    return Err(StakingError::NoLastPower(*operator));
                }
            }
        }
        debug!("Membership change proposed: {} {:?}", operator, change);
        self.set(&keys::pending_membership_key(operator), &change)
    }

    /// Instructions waiting for the next authority update
    pub fn pending_membership_changes(&self) -> StakingResult<BTreeMap<Address, MembershipChange>> {
        let mut changes = BTreeMap::new();
        for (key, value) in self.store.prefix_entries(&[keys::PENDING_MEMBERSHIP_PREFIX])? {
            let operator =
                keys::trailing_address(&key).ok_or(InvariantViolation::CorruptKey(keys::PENDING_MEMBERSHIP_PREFIX))?;
            let change = bincode::deserialize(&value).map_err(crate::store::StoreError::from)?;
            changes.insert(operator, change);
        }
        Ok(changes)
    }

    fn take_pending_membership_changes(&mut self) -> StakingResult<BTreeMap<Address, MembershipChange>> {
        let changes = self.pending_membership_changes()?;
        for operator in changes.keys() {
            self.delete(&keys::pending_membership_key(operator))?;
        }
        Ok(changes)
    }
}
