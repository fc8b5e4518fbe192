//! Undelegation queue
//!
//! One pending unlock per delegator, plus a `(completion time, delegator)`
//! index swept at end block. A later withdrawal merges into the pending
//! record and pushes its completion time forward, moving the index entry.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bank::{Bank, Pool};
use crate::error::{InvariantViolation, StakingError, StakingResult};
use crate::events::StakingEvent;
use crate::keeper::Keeper;
use crate::store::{keys, KvStore};
use crate::types::{Address, BlockContext, Timestamp};

/// Tokens waiting out the unbonding period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndelegationInfo {
    pub delegator_address: Address,
    pub quantity: u64,
    pub completion_time: Timestamp,
}

impl UndelegationInfo {
    pub fn is_mature(&self, now: Timestamp) -> bool {
        self.completion_time <= now
    }
}

impl<S: KvStore, B: Bank> Keeper<S, B> {
    /// Pending unlock of a delegator
    pub fn undelegation(&self, address: &Address) -> StakingResult<Option<UndelegationInfo>> {
        self.get(&keys::undelegation_key(address))
    }

    /// All pending unlocks, ascending by delegator
    pub fn undelegations(&self) -> StakingResult<Vec<UndelegationInfo>> {
        let entries = self.store.prefix_entries(&[keys::UNDELEGATION_PREFIX])?;
        Self::decode_all(entries)
    }

    /// Add `amount` to the delegator's pending unlock and return its
    /// completion time
    pub(crate) fn merge_undelegation(
        &mut self,
        ctx: &BlockContext,
        address: &Address,
        amount: u64,
    ) -> StakingResult<Timestamp> {
        let completion_time = ctx.time.saturating_add(self.params.unbonding_time_secs);

        let record = match self.undelegation(address)? {
            Some(mut pending) => {
                self.delete(&keys::undelegation_queue_key(pending.completion_time, address))?;
                pending.quantity = pending.quantity.checked_add(amount).ok_or(StakingError::Overflow)?;
                pending.completion_time = pending.completion_time.max(completion_time);
                pending
            }
            None => UndelegationInfo { delegator_address: *address, quantity: amount, completion_time },
        };

        self.set(&keys::undelegation_key(address), &record)?;
        self.set_marker(&keys::undelegation_queue_key(record.completion_time, address))?;
        debug!("Undelegation of {}: {} until {}", address, record.quantity, record.completion_time);
        Ok(record.completion_time)
    }

    /// Pay a pending unlock back to the delegator
    pub fn complete_undelegation(&mut self, address: &Address) -> StakingResult<u64> {
        let record = self.undelegation(address)?.ok_or(StakingError::NotInDelegating(*address))?;

        self.move_to_account(Pool::NotBonded, address, record.quantity)?;
        self.delete(&keys::undelegation_queue_key(record.completion_time, address))?;
        self.delete(&keys::undelegation_key(address))?;

        info!("Undelegation completed: {} receives {}", address, record.quantity);
        self.emit(StakingEvent::UndelegationCompleted { delegator: *address, amount: record.quantity });
        Ok(record.quantity)
    }

    /// Complete every unlock due by `ctx.time`, earliest first
    pub fn complete_matured_undelegations(&mut self, ctx: &BlockContext) -> StakingResult<Vec<(Address, u64)>> {
        let start = [keys::UNDELEGATION_QUEUE_PREFIX];
        let end = keys::queue_end(keys::UNDELEGATION_QUEUE_PREFIX, ctx.time);

        let mut completed = Vec::new();
        for (key, _) in self.store.range_entries(&start, &end)? {
            let (time, address) = keys::split_timed_key(&key)
                .ok_or(InvariantViolation::CorruptKey(keys::UNDELEGATION_QUEUE_PREFIX))?;
            match self.undelegation(&address)? {
                Some(record) if record.completion_time == time => {}
                _ => return Err(InvariantViolation::QueueIndexMismatch(address).into()),
            }
            let amount = self.complete_undelegation(&address)?;
            completed.push((address, amount));
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_withdrawals_merge_into_one_record() {
        let mut keeper = setup_keeper();
        let d = delegator(1);
        keeper.delegate(&d, 100).unwrap();

        let first = keeper.withdraw(&ctx_at(1, 1_000), &d, 10).unwrap();
        let second = keeper.withdraw(&ctx_at(2, 5_000), &d, 15).unwrap();
        assert_eq!(first, 1_000 + UNBONDING_SECS);
        assert_eq!(second, 5_000 + UNBONDING_SECS);

        let record = keeper.undelegation(&d).unwrap().unwrap();
        assert_eq!(record.quantity, 25);
        assert_eq!(record.completion_time, second);
        assert!(!record.is_mature(first));
        assert!(record.is_mature(second));

        // the first completion time no longer triggers the sweep
        let swept = keeper.complete_matured_undelegations(&ctx_at(3, first)).unwrap();
        assert!(swept.is_empty());
        assert_eq!(keeper.store().prefix_entries(&[keys::UNDELEGATION_QUEUE_PREFIX]).unwrap().len(), 1);
    }

    #[test]
    fn test_matured_undelegations_paid_out() {
        let mut keeper = setup_keeper();
        for n in 1..=3 {
            keeper.delegate(&delegator(n), 100).unwrap();
            keeper.withdraw(&ctx_at(1, u64::from(n) * 10), &delegator(n), 40).unwrap();
        }
        let balance = keeper.bank().balance(&delegator(1));

        let swept = keeper.complete_matured_undelegations(&ctx_at(2, 20 + UNBONDING_SECS)).unwrap();
        assert_eq!(swept, vec![(delegator(1), 40), (delegator(2), 40)]);
        assert_eq!(keeper.bank().balance(&delegator(1)), balance + 40);
        assert!(keeper.undelegation(&delegator(1)).unwrap().is_none());
        assert!(keeper.undelegation(&delegator(3)).unwrap().is_some());
    }

    #[test]
    fn test_complete_without_record() {
        let mut keeper = setup_keeper();
        assert_eq!(
            keeper.complete_undelegation(&delegator(1)).unwrap_err(),
            StakingError::NotInDelegating(delegator(1))
        );
    }

    #[test]
    fn test_stale_queue_entry_is_fatal() {
        let mut keeper = setup_keeper();
        keeper.set_marker(&keys::undelegation_queue_key(5, &delegator(1))).unwrap();
        let err = keeper.complete_matured_undelegations(&ctx_at(1, 10)).unwrap_err();
        assert!(err.is_fatal());
    }
}
