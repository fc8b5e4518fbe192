//! Ledger consistency checks
//!
//! Recomputes the derived state (power index, validator shares, proxy
//! totals, secondary indexes) from the primary records and reports the
//! first mismatch. Intended for tests, simulations and operator tooling.

use std::collections::BTreeMap;

use tracing::debug;

use crate::bank::Bank;
use crate::error::{InvariantViolation, StakingResult};
use crate::keeper::Keeper;
use crate::store::{keys, KvStore};
use crate::types::Address;

impl<S: KvStore, B: Bank> Keeper<S, B> {
    /// Run every ledger check
    pub fn check_invariants(&self) -> StakingResult<()> {
        self.check_power_index()?;
        self.check_validator_shares()?;
        self.check_proxies()?;
        self.check_undelegation_queue()?;
        debug!("Ledger invariants hold");
        Ok(())
    }

    fn check_power_index(&self) -> StakingResult<()> {
        let reduction = self.params.power_reduction;
        for (operator, indexed) in self.validators_by_power()? {
            let validator = self.validator(&operator)?.ok_or(InvariantViolation::MissingValidator(operator))?;
            if validator.jailed {
                return Err(InvariantViolation::JailedInPowerIndex(operator).into());
            }
            let actual = validator.potential_power(reduction);
            if actual != indexed {
                return Err(InvariantViolation::PowerIndexMismatch { validator: operator, indexed, actual }.into());
            }
        }
        for validator in self.validators()? {
            let key = keys::validator_by_power_key(validator.potential_power(reduction), &validator.operator_address);
            if validator.is_electable() && !self.store.has(&key)? {
                return Err(InvariantViolation::MissingPowerIndexEntry(validator.operator_address).into());
            }
        }
        Ok(())
    }

    fn check_validator_shares(&self) -> StakingResult<()> {
        let mut expected: BTreeMap<Address, u64> = BTreeMap::new();
        for delegator in self.delegators()? {
            for operator in &delegator.validator_addresses {
                let sum = expected.entry(*operator).or_default();
                *sum = sum.saturating_add(delegator.shares);
            }
        }
        for validator in self.validators()? {
            let expected = expected.remove(&validator.operator_address).unwrap_or(0);
            if validator.delegator_shares != expected {
                return Err(InvariantViolation::SharesMismatch {
                    validator: validator.operator_address,
                    recorded: validator.delegator_shares,
                    expected,
                }
                .into());
            }
        }
        // shares pointing at validators that no longer exist
        if let Some(operator) = expected.into_keys().next() {
            return Err(InvariantViolation::MissingValidator(operator).into());
        }
        Ok(())
    }

    fn check_proxies(&self) -> StakingResult<()> {
        let delegators = self.delegators()?;
        let by_address: BTreeMap<Address, _> = delegators.iter().map(|d| (d.delegator_address, d)).collect();

        let mut followed: BTreeMap<Address, u64> = BTreeMap::new();
        for delegator in &delegators {
            let Some(proxy) = delegator.proxy_address else {
                continue;
            };
            match by_address.get(&proxy) {
                Some(p) if p.is_proxy => {}
                _ => return Err(InvariantViolation::MissingProxy(proxy).into()),
            }
            if !self.store.has(&keys::proxy_key(&proxy, &delegator.delegator_address))? {
                return Err(InvariantViolation::ProxyIndexMismatch {
                    proxy,
                    delegator: delegator.delegator_address,
                }
                .into());
            }
            let sum = followed.entry(proxy).or_default();
            *sum = sum.saturating_add(delegator.tokens);
        }

        for delegator in delegators.iter().filter(|d| d.is_proxy) {
            let expected = followed.get(&delegator.delegator_address).copied().unwrap_or(0);
            if delegator.total_delegated_tokens != expected {
                return Err(InvariantViolation::ProxyTotalMismatch {
                    proxy: delegator.delegator_address,
                    recorded: delegator.total_delegated_tokens,
                    expected,
                }
                .into());
            }
        }

        for (key, _) in self.store.prefix_entries(&[keys::PROXY_PREFIX])? {
            let (proxy, follower) = keys::split_proxy_key(&key).ok_or(InvariantViolation::CorruptKey(keys::PROXY_PREFIX))?;
            let bound = by_address.get(&follower).and_then(|d| d.proxy_address);
            if bound != Some(proxy) {
                return Err(InvariantViolation::ProxyIndexMismatch { proxy, delegator: follower }.into());
            }
        }
        Ok(())
    }

    fn check_undelegation_queue(&self) -> StakingResult<()> {
        let records = self.undelegations()?;
        for record in &records {
            let key = keys::undelegation_queue_key(record.completion_time, &record.delegator_address);
            if !self.store.has(&key)? {
                return Err(InvariantViolation::QueueIndexMismatch(record.delegator_address).into());
            }
        }
        let queued = self.store.prefix_entries(&[keys::UNDELEGATION_QUEUE_PREFIX])?;
        if queued.len() != records.len() {
            // some entry has no record at its time
            for (key, _) in queued {
                let (time, address) = keys::split_timed_key(&key)
                    .ok_or(InvariantViolation::CorruptKey(keys::UNDELEGATION_QUEUE_PREFIX))?;
                if !records.iter().any(|r| r.delegator_address == address && r.completion_time == time) {
                    return Err(InvariantViolation::QueueIndexMismatch(address).into());
                }
            }
        }
        Ok(())
    }
}
