//! Proxy voting
//!
//! A delegator can register as a proxy; others bind to it and their tokens
//! count towards the proxy's own slate instead of a slate of their own.
//! The index `(proxy, delegator)` lists the followers of each proxy.

use tracing::{debug, info};

use super::delegator::Delegator;
use crate::bank::Bank;
use crate::error::{InvariantViolation, StakingError, StakingResult};
use crate::events::StakingEvent;
use crate::keeper::Keeper;
use crate::store::{keys, KvStore};
use crate::types::Address;

impl<S: KvStore, B: Bank> Keeper<S, B> {
    /// Delegators bound to `proxy`, ascending by address
    pub fn proxy_followers(&self, proxy: &Address) -> StakingResult<Vec<Address>> {
        self.store
            .prefix_entries(&keys::proxy_prefix(proxy))?
            .into_iter()
            .map(|(key, _)| {
                keys::split_proxy_key(&key)
                    .map(|(_, delegator)| delegator)
                    .ok_or_else(|| InvariantViolation::CorruptKey(keys::PROXY_PREFIX).into())
            })
            .collect()
    }

    /// Carry a change of `delta` tokens of a bound delegator over to its
    /// proxy and re-weight the proxy's slate. No-op for unbound delegators.
    pub(crate) fn update_proxy(&mut self, delegator: &Delegator, delta: i128) -> StakingResult<()> {
        let Some(proxy_address) = delegator.proxy_address else {
            return Ok(());
        };
        let mut proxy = self.delegator(&proxy_address)?.ok_or(InvariantViolation::MissingProxy(proxy_address))?;

        let total = i128::from(proxy.total_delegated_tokens) + delta;
        if total < 0 {
            return Err(InvariantViolation::ProxyTotalUnderflow {
                proxy: proxy_address,
                total: proxy.total_delegated_tokens,
                delta,
            }
            .into());
        }
        proxy.total_delegated_tokens = u64::try_from(total).map_err(|_| StakingError::Overflow)?;
        self.set_delegator(&proxy)?;

        debug!("Proxy {} delegated tokens {} ({:+})", proxy_address, proxy.total_delegated_tokens, delta);
        let tokens = proxy.voting_tokens().ok_or(StakingError::Overflow)?;
        self.update_shares(&mut proxy, tokens)
    }

    /// Unbind every follower of `proxy` and delete its index entries
    pub(crate) fn clear_proxy(&mut self, proxy: &Address) -> StakingResult<()> {
        for follower_address in self.proxy_followers(proxy)? {
            let mut follower = self.delegator(&follower_address)?.ok_or(InvariantViolation::ProxyIndexMismatch {
                proxy: *proxy,
                delegator: follower_address,
            })?;
            follower.proxy_address = None;
            self.set_delegator(&follower)?;
            self.delete(&keys::proxy_key(proxy, &follower_address))?;
            self.emit(StakingEvent::ProxyUnbound { delegator: follower_address, proxy: *proxy });
        }
        Ok(())
    }

    /// Register a delegator as a proxy
    pub fn reg_proxy(&mut self, address: &Address) -> StakingResult<()> {
        let mut delegator = self.must_get_delegator(address)?;
        if delegator.has_proxy() {
            return Err(StakingError::AlreadyBound(*address));
        }
        if delegator.is_proxy {
            return Err(StakingError::AlreadyProxy(*address));
        }
        delegator.is_proxy = true;
        self.set_delegator(&delegator)?;

        info!("Proxy registered: {}", address);
        self.emit(StakingEvent::ProxyRegistered { proxy: *address });
        Ok(())
    }

    /// Unregister a proxy. Its followers are unbound and its slate falls
    /// back to the weight of its own tokens.
    pub fn unreg_proxy(&mut self, address: &Address) -> StakingResult<()> {
        let mut delegator = self.must_get_delegator(address)?;
        if !delegator.is_proxy {
            return Err(StakingError::NotProxy(*address));
        }

        self.clear_proxy(address)?;
        delegator.is_proxy = false;
        delegator.total_delegated_tokens = 0;
        self.set_delegator(&delegator)?;
        let tokens = delegator.tokens;
        self.update_shares(&mut delegator, tokens)?;

        info!("Proxy unregistered: {}", address);
        self.emit(StakingEvent::ProxyUnregistered { proxy: *address });
        Ok(())
    }

    /// Bind a delegator to a proxy. The delegator's own slate is dropped
    /// and its tokens count towards the proxy from now on.
    pub fn bind_proxy(&mut self, address: &Address, proxy_address: &Address) -> StakingResult<()> {
        if address == proxy_address {
            return Err(StakingError::ProxyBindSelf(*address));
        }
        let mut delegator = self.must_get_delegator(address)?;
        if delegator.is_proxy {
            return Err(StakingError::ProxyCannotBind(*address));
        }
        match self.delegator(proxy_address)? {
            Some(proxy) if proxy.is_proxy => {}
            _ => return Err(StakingError::InvalidProxy(*proxy_address)),
        }

        if delegator.has_proxy() {
            self.unbind(&mut delegator)?;
        }

        self.withdraw_last_shares(&delegator.validator_addresses, delegator.shares)?;
        delegator.validator_addresses.clear();
        delegator.shares = 0;
        delegator.proxy_address = Some(*proxy_address);
        self.set_delegator(&delegator)?;
        self.set_marker(&keys::proxy_key(proxy_address, address))?;
        self.update_proxy(&delegator, i128::from(delegator.tokens))?;

        info!("Delegator {} bound to proxy {}", address, proxy_address);
        self.emit(StakingEvent::ProxyBound { delegator: *address, proxy: *proxy_address });
        Ok(())
    }

    /// Unbind a delegator from its proxy. It has no slate afterwards.
    pub fn unbind_proxy(&mut self, address: &Address) -> StakingResult<()> {
        let mut delegator = self.must_get_delegator(address)?;
        if !delegator.has_proxy() {
            return Err(StakingError::NotBound(*address));
        }
        self.unbind(&mut delegator)
    }

    fn unbind(&mut self, delegator: &mut Delegator) -> StakingResult<()> {
        let Some(proxy) = delegator.proxy_address else {
            return Ok(());
        };
        self.update_proxy(delegator, -i128::from(delegator.tokens))?;
        self.delete(&keys::proxy_key(&proxy, &delegator.delegator_address))?;
        delegator.proxy_address = None;
        self.set_delegator(delegator)?;

        info!("Delegator {} unbound from proxy {}", delegator.delegator_address, proxy);
        self.emit(StakingEvent::ProxyUnbound { delegator: delegator.delegator_address, proxy });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    /// Proxy `delegator(1)` with 100 tokens voting for validators 1 and 2
    fn keeper_with_proxy() -> TestKeeper {
        let mut keeper = setup_keeper();
        for n in 1..=2 {
            keeper.create_validator(&operator(n), cons_key(n), MIN_SELF, 0).unwrap();
        }
        delegate_to(&mut keeper, delegator(1), 100, &[operator(1), operator(2)]);
        keeper.reg_proxy(&delegator(1)).unwrap();
        keeper
    }

    fn shares_of(keeper: &TestKeeper, n: u8) -> u64 {
        keeper.must_get_validator(&operator(n)).unwrap().delegator_shares
    }

    #[test]
    fn test_bound_delegation_moves_proxy_weight() {
        let mut keeper = keeper_with_proxy();
        keeper.delegate(&delegator(2), 10).unwrap();
        keeper.bind_proxy(&delegator(2), &delegator(1)).unwrap();
        assert_eq!(shares_of(&keeper, 1), 110);

        keeper.delegate(&delegator(2), 40).unwrap();
        assert_eq!(shares_of(&keeper, 1), 150);
        assert_eq!(shares_of(&keeper, 2), 150);

        let follower = keeper.must_get_delegator(&delegator(2)).unwrap();
        assert_eq!(follower.shares, 0);
        assert!(!follower.has_slate());
        let proxy = keeper.must_get_delegator(&delegator(1)).unwrap();
        assert_eq!(proxy.total_delegated_tokens, 50);
        assert_eq!(proxy.shares, 150);
        assert_eq!(keeper.proxy_followers(&delegator(1)).unwrap(), vec![delegator(2)]);
    }

    #[test]
    fn test_bind_drops_own_slate() {
        let mut keeper = keeper_with_proxy();
        keeper.create_validator(&operator(3), cons_key(3), MIN_SELF, 0).unwrap();
        delegate_to(&mut keeper, delegator(2), 30, &[operator(3)]);

        keeper.bind_proxy(&delegator(2), &delegator(1)).unwrap();
        assert_eq!(shares_of(&keeper, 3), 0);
        assert_eq!(shares_of(&keeper, 1), 130);
    }

    #[test]
    fn test_follower_withdraw_reduces_proxy_weight() {
        let mut keeper = keeper_with_proxy();
        keeper.delegate(&delegator(2), 50).unwrap();
        keeper.bind_proxy(&delegator(2), &delegator(1)).unwrap();

        keeper.withdraw(&ctx_at(1, 1), &delegator(2), 20).unwrap();
        assert_eq!(shares_of(&keeper, 1), 130);

        keeper.withdraw(&ctx_at(2, 2), &delegator(2), 30).unwrap();
        assert_eq!(shares_of(&keeper, 1), 100);
        assert!(keeper.delegator(&delegator(2)).unwrap().is_none());
        assert!(keeper.proxy_followers(&delegator(1)).unwrap().is_empty());
    }

    #[test]
    fn test_unbind_returns_weight() {
        let mut keeper = keeper_with_proxy();
        keeper.delegate(&delegator(2), 50).unwrap();
        keeper.bind_proxy(&delegator(2), &delegator(1)).unwrap();

        keeper.unbind_proxy(&delegator(2)).unwrap();
        assert_eq!(shares_of(&keeper, 1), 100);
        assert!(!keeper.must_get_delegator(&delegator(2)).unwrap().has_proxy());
        assert_eq!(keeper.unbind_proxy(&delegator(2)).unwrap_err(), StakingError::NotBound(delegator(2)));
    }

    #[test]
    fn test_unreg_proxy_clears_followers() {
        let mut keeper = keeper_with_proxy();
        for n in 2..=3 {
            keeper.delegate(&delegator(n), 25).unwrap();
            keeper.bind_proxy(&delegator(n), &delegator(1)).unwrap();
        }
        assert_eq!(shares_of(&keeper, 2), 150);

        keeper.unreg_proxy(&delegator(1)).unwrap();
        assert_eq!(shares_of(&keeper, 2), 100);
        assert!(keeper.proxy_followers(&delegator(1)).unwrap().is_empty());
        for n in 2..=3 {
            assert!(!keeper.must_get_delegator(&delegator(n)).unwrap().has_proxy());
        }
        let proxy = keeper.must_get_delegator(&delegator(1)).unwrap();
        assert!(!proxy.is_proxy);
        assert_eq!(proxy.total_delegated_tokens, 0);
    }

    #[test]
    fn test_rebind_moves_weight_between_proxies() {
        let mut keeper = keeper_with_proxy();
        keeper.create_validator(&operator(3), cons_key(3), MIN_SELF, 0).unwrap();
        delegate_to(&mut keeper, delegator(3), 10, &[operator(3)]);
        keeper.reg_proxy(&delegator(3)).unwrap();

        keeper.delegate(&delegator(2), 40).unwrap();
        keeper.bind_proxy(&delegator(2), &delegator(1)).unwrap();
        keeper.bind_proxy(&delegator(2), &delegator(3)).unwrap();

        assert_eq!(shares_of(&keeper, 1), 100);
        assert_eq!(shares_of(&keeper, 3), 50);
        assert!(keeper.proxy_followers(&delegator(1)).unwrap().is_empty());
        assert_eq!(keeper.proxy_followers(&delegator(3)).unwrap(), vec![delegator(2)]);
    }

    #[test]
    fn test_proxy_rejections() {
        let mut keeper = keeper_with_proxy();
        keeper.delegate(&delegator(2), 10).unwrap();

        assert_eq!(keeper.reg_proxy(&delegator(1)).unwrap_err(), StakingError::AlreadyProxy(delegator(1)));
        assert_eq!(keeper.unreg_proxy(&delegator(2)).unwrap_err(), StakingError::NotProxy(delegator(2)));
        assert_eq!(
            keeper.bind_proxy(&delegator(2), &delegator(2)).unwrap_err(),
            StakingError::ProxyBindSelf(delegator(2))
        );
        assert_eq!(
            keeper.bind_proxy(&delegator(1), &delegator(2)).unwrap_err(),
            StakingError::ProxyCannotBind(delegator(1))
        );
        assert_eq!(
            keeper.bind_proxy(&delegator(2), &delegator(5)).unwrap_err(),
            StakingError::InvalidProxy(delegator(5))
        );

        keeper.bind_proxy(&delegator(2), &delegator(1)).unwrap();
        assert_eq!(keeper.reg_proxy(&delegator(2)).unwrap_err(), StakingError::AlreadyBound(delegator(2)));
        assert_eq!(
            keeper.add_shares(&delegator(2), vec![operator(1)]).unwrap_err(),
            StakingError::AlreadyBound(delegator(2))
        );
    }
}
