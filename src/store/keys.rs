//! Table prefixes and key encoding
//!
//! Every key is a one-byte table prefix followed by fixed-width fields.
//! Integers are big-endian so that byte order equals numeric order:
//! a reverse scan of the power index yields the highest power first and a
//! forward scan of a time queue yields the earliest completion first.

use crate::types::{Address, ConsensusPubKey, Timestamp, ADDRESS_SIZE};

/// Last reported power per validator: `0x11 | operator`
pub const LAST_VALIDATOR_POWER_PREFIX: u8 = 0x11;
/// Last total bonded power: `0x12`
pub const LAST_TOTAL_POWER_KEY: u8 = 0x12;

/// Validators by operator: `0x21 | operator`
pub const VALIDATOR_PREFIX: u8 = 0x21;
/// Operator by consensus key: `0x22 | consensus key`
pub const VALIDATOR_BY_CONS_KEY_PREFIX: u8 = 0x22;
/// Electable validators by power: `0x23 | power (u64 BE) | operator`
pub const VALIDATOR_BY_POWER_PREFIX: u8 = 0x23;

/// Unbonding validators by completion time: `0x43 | time (u64 BE) | operator`
pub const VALIDATOR_QUEUE_PREFIX: u8 = 0x43;

/// Delegators by address: `0x52 | delegator`
pub const DELEGATOR_PREFIX: u8 = 0x52;
/// Proxy bindings: `0x53 | proxy | delegator`
pub const PROXY_PREFIX: u8 = 0x53;
/// Undelegation records: `0x54 | delegator`
pub const UNDELEGATION_PREFIX: u8 = 0x54;
/// Undelegations by completion time: `0x55 | time (u64 BE) | delegator`
pub const UNDELEGATION_QUEUE_PREFIX: u8 = 0x55;

/// Pending membership changes for the authority policy: `0x61 | operator`
pub const PENDING_MEMBERSHIP_PREFIX: u8 = 0x61;

fn prefixed(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.push(prefix);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

pub fn validator_key(operator: &Address) -> Vec<u8> {
    prefixed(VALIDATOR_PREFIX, &[operator.as_bytes()])
}

pub fn validator_by_cons_key(key: &ConsensusPubKey) -> Vec<u8> {
    prefixed(VALIDATOR_BY_CONS_KEY_PREFIX, &[key.as_bytes()])
}

pub fn validator_by_power_key(power: u64, operator: &Address) -> Vec<u8> {
    prefixed(VALIDATOR_BY_POWER_PREFIX, &[&power.to_be_bytes(), operator.as_bytes()])
}

pub fn last_validator_power_key(operator: &Address) -> Vec<u8> {
    prefixed(LAST_VALIDATOR_POWER_PREFIX, &[operator.as_bytes()])
}

pub fn last_total_power_key() -> Vec<u8> {
    vec![LAST_TOTAL_POWER_KEY]
}

pub fn validator_queue_key(time: Timestamp, operator: &Address) -> Vec<u8> {
    prefixed(VALIDATOR_QUEUE_PREFIX, &[&time.to_be_bytes(), operator.as_bytes()])
}

pub fn delegator_key(delegator: &Address) -> Vec<u8> {
    prefixed(DELEGATOR_PREFIX, &[delegator.as_bytes()])
}

pub fn proxy_key(proxy: &Address, delegator: &Address) -> Vec<u8> {
    prefixed(PROXY_PREFIX, &[proxy.as_bytes(), delegator.as_bytes()])
}

/// Prefix of all bindings to one proxy
pub fn proxy_prefix(proxy: &Address) -> Vec<u8> {
    prefixed(PROXY_PREFIX, &[proxy.as_bytes()])
}

pub fn undelegation_key(delegator: &Address) -> Vec<u8> {
    prefixed(UNDELEGATION_PREFIX, &[delegator.as_bytes()])
}

pub fn undelegation_queue_key(time: Timestamp, delegator: &Address) -> Vec<u8> {
    prefixed(UNDELEGATION_QUEUE_PREFIX, &[&time.to_be_bytes(), delegator.as_bytes()])
}

pub fn pending_membership_key(operator: &Address) -> Vec<u8> {
    prefixed(PENDING_MEMBERSHIP_PREFIX, &[operator.as_bytes()])
}

/// Exclusive upper bound of a time queue scan that includes `time`
pub fn queue_end(prefix: u8, time: Timestamp) -> Vec<u8> {
    match time.checked_add(1) {
        Some(next) => prefixed(prefix, &[&next.to_be_bytes()]),
        None => vec![prefix + 1],
    }
}

/// Trailing address of any key that ends in one
pub fn trailing_address(key: &[u8]) -> Option<Address> {
    if key.len() < 1 + ADDRESS_SIZE {
        return None;
    }
    Address::from_slice(&key[key.len() - ADDRESS_SIZE..])
}

/// Split a `prefix | u64 BE | address` key
pub fn split_timed_key(key: &[u8]) -> Option<(u64, Address)> {
    if key.len() != 1 + 8 + ADDRESS_SIZE {
        return None;
    }
    let value = u64::from_be_bytes(key[1..9].try_into().ok()?);
    Some((value, Address::from_slice(&key[9..])?))
}

/// Split a `0x53 | proxy | delegator` key
pub fn split_proxy_key(key: &[u8]) -> Option<(Address, Address)> {
    if key.len() != 1 + 2 * ADDRESS_SIZE {
        return None;
    }
    let proxy = Address::from_slice(&key[1..1 + ADDRESS_SIZE])?;
    let delegator = Address::from_slice(&key[1 + ADDRESS_SIZE..])?;
    Some((proxy, delegator))
}
