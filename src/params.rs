//! Staking parameters
//!
//! Parameters are configured outside the core (genesis or governance) and
//! are read-only here.

use serde::{Deserialize, Serialize};

use crate::error::{StakingError, StakingResult};

/// Default unbonding period: 14 days
pub const DEFAULT_UNBONDING_TIME_SECS: u64 = 14 * 24 * 60 * 60;

/// Default size of the active validator set
pub const DEFAULT_MAX_VALIDATORS: u16 = 21;

/// Default cap on the number of validators in one slate
pub const DEFAULT_MAX_VALS_TO_ADD_SHARES: u16 = 30;

/// How the active validator set is chosen at end block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetUpdatePolicy {
    /// Top `max_validators` validators by power
    PowerRanked,
    /// Explicit add/remove instructions (proof of authority)
    Authority,
}

/// Configuration for the staking core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingParams {
    /// Time a withdrawal or an unbonding validator waits (seconds)
    pub unbonding_time_secs: u64,
    /// Maximum number of bonded validators
    pub max_validators: u16,
    /// Smallest amount accepted by delegate and withdraw
    pub min_delegation: u64,
    /// Deposit a validator operator has to lock at creation
    pub min_self_delegation: u64,
    /// Maximum number of validators a delegator can vote for
    pub max_vals_to_add_shares: u16,
    /// Shares per unit of consensus power
    pub power_reduction: u64,
    /// Validator set maintenance policy
    pub set_update_policy: SetUpdatePolicy,
}

impl Default for StakingParams {
    fn default() -> Self {
        Self {
            unbonding_time_secs: DEFAULT_UNBONDING_TIME_SECS,
            max_validators: DEFAULT_MAX_VALIDATORS,
            min_delegation: 1,
            min_self_delegation: 10_000,
            max_vals_to_add_shares: DEFAULT_MAX_VALS_TO_ADD_SHARES,
            power_reduction: 1,
            set_update_policy: SetUpdatePolicy::PowerRanked,
        }
    }
}

impl StakingParams {
    /// Parse parameters from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> StakingResult<Self> {
        let params: StakingParams =
            serde_json::from_str(json).map_err(|e| StakingError::InvalidParams(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Check parameter sanity
    pub fn validate(&self) -> StakingResult<()> {
        if self.max_validators == 0 {
            return Err(StakingError::InvalidParams("max_validators must be positive".into()));
        }
        if self.max_vals_to_add_shares == 0 {
            return Err(StakingError::InvalidParams(
                "max_vals_to_add_shares must be positive".into(),
            ));
        }
        if self.power_reduction == 0 {
            return Err(StakingError::InvalidParams("power_reduction must be positive".into()));
        }
        if self.min_delegation == 0 {
            return Err(StakingError::InvalidParams("min_delegation must be positive".into()));
        }
        Ok(())
    }
}
