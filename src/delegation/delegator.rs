//! Delegator record

use serde::{Deserialize, Serialize};

use crate::types::Address;

/// Staking account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegator {
    /// Account address (primary key)
    pub delegator_address: Address,
    /// Validators this delegator votes for
    pub validator_addresses: Vec<Address>,
    /// Weight currently applied to every validator of the slate
    pub shares: u64,
    /// Directly staked tokens
    pub tokens: u64,
    /// Registered as a proxy other delegators can bind to
    pub is_proxy: bool,
    /// Tokens of the delegators bound to this proxy
    pub total_delegated_tokens: u64,
    /// Proxy this delegator has bound its weight to
    pub proxy_address: Option<Address>,
}

impl Delegator {
    /// Empty record for a first delegation
    pub fn new(delegator_address: Address) -> Self {
        Self {
            delegator_address,
            validator_addresses: Vec::new(),
            shares: 0,
            tokens: 0,
            is_proxy: false,
            total_delegated_tokens: 0,
            proxy_address: None,
        }
    }

    /// Bound to a proxy (votes through it)
    pub fn has_proxy(&self) -> bool {
        self.proxy_address.is_some()
    }

    /// Has chosen validators to vote for
    pub fn has_slate(&self) -> bool {
        !self.validator_addresses.is_empty()
    }

    /// Tokens backing this delegator's own slate
    pub fn voting_tokens(&self) -> Option<u64> {
        if self.is_proxy {
            self.tokens.checked_add(self.total_delegated_tokens)
        } else {
            Some(self.tokens)
        }
    }
}

/// Weight a token amount carries on a slate. Shares never dilute: one token
/// is one share on every validator of the slate.
pub fn shares_from_tokens(tokens: u64) -> u64 {
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_voting_tokens_include_followers_for_proxies() {
        let mut d = Delegator::new(Address::new([1u8; 32]));
        d.tokens = 100;
        d.total_delegated_tokens = 50;
        assert_eq!(d.voting_tokens(), Some(100));
        d.is_proxy = true;
        assert_eq!(d.voting_tokens(), Some(150));
    }

    #[test]
    fn test_new_delegator_votes_for_nobody() {
        let d = Delegator::new(Address::new([1u8; 32]));
        assert!(!d.has_slate());
        assert!(!d.has_proxy());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn shares_are_identity_of_tokens(tokens in any::<u64>()) {
            prop_assert_eq!(shares_from_tokens(tokens), tokens);
        }
    }
}
