//! Message handling and end block
//!
//! Every message runs on a cached keeper. Its writes, transfers and events
//! reach the parent only when the message succeeds in deliver mode.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bank::Bank;
use crate::error::StakingResult;
use crate::keeper::Keeper;
use crate::store::KvStore;
use crate::types::{Address, BlockContext, ConsensusPubKey};
use crate::validators::ValidatorUpdate;

/// User operations on the staking ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Msg {
    CreateValidator {
        operator: Address,
        consensus_pubkey: ConsensusPubKey,
        min_self_delegation: u64,
        commission: u16,
    },
    DestroyValidator { operator: Address },
    Delegate { delegator: Address, amount: u64 },
    Withdraw { delegator: Address, amount: u64 },
    AddShares { delegator: Address, validators: Vec<Address> },
    RegProxy { delegator: Address },
    UnregProxy { delegator: Address },
    BindProxy { delegator: Address, proxy: Address },
    UnbindProxy { delegator: Address },
    Unjail { operator: Address },
}

impl Msg {
    /// Account that has to sign the message
    pub fn signer(&self) -> Address {
        match self {
            Msg::CreateValidator { operator, .. }
            | Msg::DestroyValidator { operator }
            | Msg::Unjail { operator } => *operator,
            Msg::Delegate { delegator, .. }
            | Msg::Withdraw { delegator, .. }
            | Msg::AddShares { delegator, .. }
            | Msg::RegProxy { delegator }
            | Msg::UnregProxy { delegator }
            | Msg::BindProxy { delegator, .. }
            | Msg::UnbindProxy { delegator } => *delegator,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::CreateValidator { .. } => "create_validator",
            Msg::DestroyValidator { .. } => "destroy_validator",
            Msg::Delegate { .. } => "delegate",
            Msg::Withdraw { .. } => "withdraw",
            Msg::AddShares { .. } => "add_shares",
            Msg::RegProxy { .. } => "reg_proxy",
            Msg::UnregProxy { .. } => "unreg_proxy",
            Msg::BindProxy { .. } => "bind_proxy",
            Msg::UnbindProxy { .. } => "unbind_proxy",
            Msg::Unjail { .. } => "unjail",
        }
    }
}

impl<S: KvStore, B: Bank> Keeper<S, B> {
    /// Execute a message. Nothing is kept if it fails or if `ctx` is a
    /// check-mode context.
    pub fn handle_msg(&mut self, ctx: &BlockContext, msg: &Msg) -> StakingResult<()> {
        let mut cached = self.cache();
        if let Err(err) = cached.execute(ctx, msg) {
            debug!("{} from {} rejected: {}", msg.kind(), msg.signer(), err);
            return Err(err);
        }
        if ctx.is_check() {
            return Ok(());
        }
        let events = cached.commit()?;
        self.extend_events(events);
        Ok(())
    }

    fn execute(&mut self, ctx: &BlockContext, msg: &Msg) -> StakingResult<()> {
        match msg {
            Msg::CreateValidator { operator, consensus_pubkey, min_self_delegation, commission } => {
                self.create_validator(operator, *consensus_pubkey, *min_self_delegation, *commission)?;
            }
            Msg::DestroyValidator { operator } => {
                self.destroy_validator(ctx, operator)?;
            }
            Msg::Delegate { delegator, amount } => self.delegate(delegator, *amount)?,
            Msg::Withdraw { delegator, amount } => {
                self.withdraw(ctx, delegator, *amount)?;
            }
            Msg::AddShares { delegator, validators } => self.add_shares(delegator, validators.clone())?,
            Msg::RegProxy { delegator } => self.reg_proxy(delegator)?,
            Msg::UnregProxy { delegator } => self.unreg_proxy(delegator)?,
            Msg::BindProxy { delegator, proxy } => self.bind_proxy(delegator, proxy)?,
            Msg::UnbindProxy { delegator } => self.unbind_proxy(delegator)?,
            Msg::Unjail { operator } => self.unjail(operator)?,
        }
        Ok(())
    }

    /// End-of-block processing: reconcile the validator set, then sweep
    /// matured validators and undelegations. Returns the updates for the
    /// consensus engine.
    pub fn end_block(&mut self, ctx: &BlockContext) -> StakingResult<Vec<ValidatorUpdate>> {
        let mut cached = self.cache();
        let updates = cached.apply_validator_set_updates(ctx)?;
        let unbonded = cached.unbond_all_matured_validators(ctx)?;
        let completed = cached.complete_matured_undelegations(ctx)?;
        let events = cached.commit()?;
        self.extend_events(events);

        if !updates.is_empty() || !unbonded.is_empty() || !completed.is_empty() {
            info!(
                "End block {}: {} validator updates, {} validators unbonded, {} undelegations completed",
                ctx.height,
                updates.len(),
                unbonded.len(),
                completed.len()
            );
        }
        Ok(updates)
    }
}
