//! Staking keeper
//!
//! The keeper owns the ledger's storage, the bank handle, the parameters
//! and the event buffer. Ledger operations are implemented on it in the
//! `validators` and `delegation` modules.
//!
//! `cache()` returns a keeper over buffered views of the same store and
//! bank. Committing it applies every write, transfer and event at once;
//! dropping it discards them. A commit checks the bank journal, writes the
//! store as one batch, and only then replays the transfers.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bank::{Bank, CachedBank, Pool};
use crate::error::{StakingError, StakingResult};
use crate::events::{StakingEvent, StakingHooks};
use crate::params::StakingParams;
use crate::store::{CacheStore, KvPair, KvStore, StoreError};
use crate::types::Address;

/// Staking keeper over a store `S` and a bank `B`
pub struct Keeper<S: KvStore, B: Bank> {
    pub(crate) store: S,
    pub(crate) bank: B,
    pub(crate) params: StakingParams,
    events: Vec<StakingEvent>,
}

impl<S: KvStore, B: Bank> Keeper<S, B> {
    /// Create a keeper; fails if the parameters are invalid
    pub fn new(store: S, bank: B, params: StakingParams) -> StakingResult<Self> {
        params.validate()?;
        Ok(Self { store, bank, params, events: Vec::new() })
    }

    /// Staking parameters
    pub fn params(&self) -> &StakingParams {
        &self.params
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bank handle
    pub fn bank(&self) -> &B {
        &self.bank
    }

    /// Mutable bank handle (genesis funding, tests)
    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.bank
    }

    /// Give back the store and the bank
    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bank)
    }

    /// Keeper over buffered views of this keeper's store and bank
    pub fn cache(&mut self) -> Keeper<CacheStore<'_, S>, CachedBank<'_, B>> {
        Keeper {
            store: CacheStore::new(&mut self.store),
            bank: CachedBank::new(&mut self.bank),
            params: self.params.clone(),
            events: Vec::new(),
        }
    }

    /// Events recorded since the last drain
    pub fn pending_events(&self) -> &[StakingEvent] {
        &self.events
    }

    /// Remove and return all recorded events
    pub fn take_events(&mut self) -> Vec<StakingEvent> {
        std::mem::take(&mut self.events)
    }

    /// Hand every recorded event to `hooks`, in order
    pub fn dispatch_events<H: StakingHooks>(&mut self, hooks: &mut H) {
        for event in self.take_events() {
            hooks.on_event(&event);
        }
    }

    pub(crate) fn emit(&mut self, event: StakingEvent) {
        self.events.push(event);
    }

    pub(crate) fn extend_events(&mut self, events: Vec<StakingEvent>) {
        self.events.extend(events);
    }

    // ========== Codec ==========

    pub(crate) fn get<T: DeserializeOwned>(&self, key: &[u8]) -> StakingResult<Option<T>> {
        match self.store.get(key)? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes).map_err(StoreError::from)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn set<T: Serialize>(&mut self, key: &[u8], value: &T) -> StakingResult<()> {
        let bytes = bincode::serialize(value).map_err(StoreError::from)?;
        self.store.set(key, &bytes)?;
        Ok(())
    }

    /// Existence-only entry (index keys)
    pub(crate) fn set_marker(&mut self, key: &[u8]) -> StakingResult<()> {
        self.store.set(key, &[])?;
        Ok(())
    }

    pub(crate) fn delete(&mut self, key: &[u8]) -> StakingResult<()> {
        self.store.delete(key)?;
        Ok(())
    }

    pub(crate) fn decode_all<T: DeserializeOwned>(entries: Vec<KvPair>) -> StakingResult<Vec<T>> {
        entries
            .into_iter()
            .map(|(_, bytes)| {
                bincode::deserialize(&bytes).map_err(|e| StakingError::from(StoreError::from(e)))
            })
            .collect()
    }

    // ========== Pool transfers ==========

    /// Lock tokens from `from` in the bonded pool
    pub(crate) fn move_to_bonded_pool(&mut self, from: &Address, amount: u64) -> StakingResult<()> {
        self.bank.send_to_pool(from, Pool::Bonded, amount)?;
        Ok(())
    }

    /// Start unbonding tokens: bonded pool to not-bonded pool
    pub(crate) fn move_from_bonded_pool(&mut self, amount: u64) -> StakingResult<()> {
        self.bank.send_between_pools(Pool::Bonded, Pool::NotBonded, amount)?;
        Ok(())
    }

    /// Pay out tokens from `pool` to `recipient`
    pub(crate) fn move_to_account(&mut self, pool: Pool, recipient: &Address, amount: u64) -> StakingResult<()> {
        self.bank.send_from_pool(pool, recipient, amount)?;
        Ok(())
    }
}

impl<'a, S: KvStore, B: Bank> Keeper<CacheStore<'a, S>, CachedBank<'a, B>> {
    /// Apply buffered writes and transfers to the parent and return the
    /// events recorded while buffering. If the store batch fails, neither
    /// parent has changed.
    pub fn commit(self) -> StakingResult<Vec<StakingEvent>> {
        let Keeper { store, bank, events, .. } = self;
        bank.check()?;
        store.write()?;
        bank.write()?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MemoryBank;
    use crate::handler::Msg;
    use crate::store::{MemoryStore, SledStore, WriteOp};
    use crate::test_utils::*;

    /// Memory store whose batch writes always fail
    #[derive(Default)]
    struct BrokenDisk(MemoryStore);

    impl KvStore for BrokenDisk {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            self.0.get(key)
        }
        fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
            self.0.set(key, value)
        }
        fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
            self.0.delete(key)
        }
        fn prefix_entries(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StoreError> {
            self.0.prefix_entries(prefix)
        }
        fn range_entries(&self, start: &[u8], end: &[u8]) -> Result<Vec<KvPair>, StoreError> {
            self.0.range_entries(start, end)
        }
        fn write_batch(&mut self, _ops: Vec<WriteOp>) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
    }

    fn funded_bank() -> MemoryBank {
        let mut bank = MemoryBank::new();
        bank.mint(&delegator(1), INITIAL_BALANCE).unwrap();
        bank
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = StakingParams { max_validators: 0, ..StakingParams::default() };
        assert!(Keeper::new(MemoryStore::new(), MemoryBank::new(), params).is_err());
    }

    #[test]
    fn test_cache_commit_and_discard() {
        let mut keeper = Keeper::new(MemoryStore::new(), MemoryBank::new(), StakingParams::default()).unwrap();
        {
            let mut cached = keeper.cache();
            cached.set(b"a", &1u64).unwrap();
            cached.emit(StakingEvent::ProxyRegistered { proxy: Address::zero() });
        }
        assert!(keeper.get::<u64>(b"a").unwrap().is_none());

        let mut cached = keeper.cache();
        cached.set(b"a", &7u64).unwrap();
        cached.emit(StakingEvent::ProxyRegistered { proxy: Address::zero() });
        let events = cached.commit().unwrap();
        keeper.extend_events(events);

        assert_eq!(keeper.get::<u64>(b"a").unwrap(), Some(7));
        assert_eq!(keeper.take_events().len(), 1);
        assert!(keeper.pending_events().is_empty());
    }

    #[test]
    fn test_commit_to_sled() {
        let mut keeper = Keeper::new(SledStore::temporary().unwrap(), funded_bank(), test_params()).unwrap();
        let ctx = ctx_at(1, 100);

        keeper.handle_msg(&ctx, &Msg::Delegate { delegator: delegator(1), amount: 500 }).unwrap();
        keeper.handle_msg(&ctx, &Msg::Withdraw { delegator: delegator(1), amount: 200 }).unwrap();
        assert_eq!(keeper.delegator(&delegator(1)).unwrap().unwrap().tokens, 300);
        assert_eq!(keeper.undelegation(&delegator(1)).unwrap().unwrap().quantity, 200);
        assert_eq!(keeper.bank().pool_balance(Pool::Bonded), 300);
        assert_eq!(keeper.bank().pool_balance(Pool::NotBonded), 200);

        // a rejected message leaves the tree alone
        let err = keeper.handle_msg(&ctx, &Msg::Withdraw { delegator: delegator(1), amount: 301 });
        assert!(err.is_err());
        assert_eq!(keeper.delegator(&delegator(1)).unwrap().unwrap().tokens, 300);
        keeper.check_invariants().unwrap();

        let (store, bank) = keeper.into_parts();
        store.flush().unwrap();
        assert_eq!(bank.balance(&delegator(1)), INITIAL_BALANCE - 500);
    }

    #[test]
    fn test_failed_store_write_keeps_bank() {
        let mut keeper = Keeper::new(BrokenDisk::default(), funded_bank(), test_params()).unwrap();

        let err = keeper.handle_msg(&ctx_at(1, 100), &Msg::Delegate { delegator: delegator(1), amount: 500 });
        assert_eq!(err.unwrap_err(), StakingError::Store(StoreError::Backend("disk full".into())));
        assert_eq!(keeper.bank().balance(&delegator(1)), INITIAL_BALANCE);
        assert_eq!(keeper.bank().pool_balance(Pool::Bonded), 0);
        assert!(keeper.delegator(&delegator(1)).unwrap().is_none());
        assert!(keeper.take_events().is_empty());
    }
}
