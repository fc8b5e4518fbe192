//! Shared fixtures for unit tests

use crate::bank::MemoryBank;
use crate::keeper::Keeper;
use crate::params::StakingParams;
use crate::store::MemoryStore;
use crate::types::{Address, BlockContext, ConsensusPubKey, Timestamp};

pub type TestKeeper = Keeper<MemoryStore, MemoryBank>;

/// Validator deposit required by `test_params`
pub const MIN_SELF: u64 = 10_000;

/// Unbonding period of `test_params`
pub const UNBONDING_SECS: u64 = 1_000_000;

/// Balance minted for every fixture account
pub const INITIAL_BALANCE: u64 = 1_000_000_000;

pub fn test_params() -> StakingParams {
    StakingParams {
        unbonding_time_secs: UNBONDING_SECS,
        min_self_delegation: MIN_SELF,
        ..StakingParams::default()
    }
}

/// Operator account `n`; operators sort by `n`
pub fn operator(n: u8) -> Address {
    Address::new([n; 32])
}

/// Delegator account `n`, distinct from every operator
pub fn delegator(n: u8) -> Address {
    let mut bytes = [0x80; 32];
    bytes[31] = n;
    Address::new(bytes)
}

pub fn cons_key(n: u8) -> ConsensusPubKey {
    ConsensusPubKey::new([n; 32])
}

pub fn ctx_at(height: u64, time: Timestamp) -> BlockContext {
    BlockContext::deliver(height, time)
}

pub fn setup_keeper() -> TestKeeper {
    setup_keeper_with(test_params())
}

/// In-memory keeper with operators and delegators 1 to 9 funded
pub fn setup_keeper_with(params: StakingParams) -> TestKeeper {
    let mut bank = MemoryBank::new();
    for n in 1..=9 {
        bank.mint(&operator(n), INITIAL_BALANCE).unwrap();
        bank.mint(&delegator(n), INITIAL_BALANCE).unwrap();
    }
    Keeper::new(MemoryStore::new(), bank, params).unwrap()
}

/// Delegate `amount` and vote for `slate`
pub fn delegate_to(keeper: &mut TestKeeper, address: Address, amount: u64, slate: &[Address]) {
    keeper.delegate(&address, amount).unwrap();
    keeper.add_shares(&address, slate.to_vec()).unwrap();
}
