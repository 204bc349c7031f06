//! Time lock budgets for swap payments.
//!
//! Time lock requirements are agreed in seconds but enforced by the network
//! in blocks, so every requirement has to be converted for the chain the
//! payment node operates on. There are two conversions which must never be
//! mixed up:
//!
//! - An upper bound that a counterparty promised (a _limit_) is rounded
//!   **down**, so that we never exceed what was promised.
//! - A minimum the receiving end needs (a _delta_) is rounded **up**, so that
//!   we always provide at least that much.

use crate::{error::ConfigError, timestamp::RelativeTime, Timestamp};
use serde::{Deserialize, Serialize};

const BITCOIN_BLOCK_TIME_SECS: u32 = 600; // 10 minutes, average Bitcoin block time.
const LITECOIN_BLOCK_TIME_SECS: u32 = 150; // 2.5 minutes, average Litecoin block time.

const FORWARD_DELTA_SECS: u32 = 24 * 60 * 60;
const FINAL_DELTA_SECS: u32 = 24 * 60 * 60;
const BUFFER_SECS: u32 = 60 * 60;

/// Converts a required minimum into blocks, rounding up.
pub fn compute_min_delta(seconds: u32, seconds_per_block: u32) -> Result<u32, ConfigError> {
    if seconds_per_block == 0 {
        return Err(ConfigError::ZeroBlockTime);
    }

    let blocks = seconds / seconds_per_block;
    if seconds % seconds_per_block == 0 {
        Ok(blocks)
    } else {
        Ok(blocks + 1)
    }
}

/// Converts a promised maximum into blocks, rounding down.
pub fn compute_max_limit(seconds: u32, seconds_per_block: u32) -> Result<u32, ConfigError> {
    if seconds_per_block == 0 {
        return Err(ConfigError::ZeroBlockTime);
    }

    Ok(seconds / seconds_per_block)
}

/// Removes our own forwarding delta from a time lock an upstream party
/// extended to us.
///
/// The remainder is what we can pass on downstream. It is converted into
/// blocks with the limit rounding and returned as a CLTV expiry relative to
/// `block_height`. Fails if nothing is left once our policy is removed, in
/// which case the swap must not be accepted because we could not forward it
/// safely.
pub fn remove_forwarding_policy(
    extended_time_lock_delta: u32,
    seconds_per_block: u32,
    block_height: u32,
    policy: &ForwardingPolicy,
) -> Result<u32, ConfigError> {
    let forward_delta = policy.forward_delta.as_secs();
    let insufficient = ConfigError::InsufficientTimeLock {
        extended: u64::from(extended_time_lock_delta),
        forward_delta,
    };

    let remaining = match extended_time_lock_delta.checked_sub(forward_delta) {
        Some(0) | None => return Err(insufficient),
        Some(remaining) => remaining,
    };

    match compute_max_limit(remaining, seconds_per_block)? {
        0 => Err(insufficient),
        blocks => Ok(block_height.saturating_add(blocks)),
    }
}

/// Block production constants of the chain a payment node operates on.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Chain {
    pub symbol: String,
    pub seconds_per_block: u32,
}

impl Chain {
    pub fn new(symbol: impl Into<String>, seconds_per_block: u32) -> Result<Self, ConfigError> {
        if seconds_per_block == 0 {
            return Err(ConfigError::ZeroBlockTime);
        }

        Ok(Chain {
            symbol: symbol.into(),
            seconds_per_block,
        })
    }

    /// Looks up the constants of a chain we know about.
    pub fn known(symbol: &str) -> Result<Self, ConfigError> {
        match symbol.to_uppercase().as_str() {
            "BTC" => Chain::new("BTC", BITCOIN_BLOCK_TIME_SECS),
            "LTC" => Chain::new("LTC", LITECOIN_BLOCK_TIME_SECS),
            _ => Err(ConfigError::MissingChainConstants {
                symbol: symbol.to_owned(),
            }),
        }
    }

    pub fn min_delta(&self, time: RelativeTime) -> Result<u32, ConfigError> {
        compute_min_delta(time.as_secs(), self.seconds_per_block)
    }

    pub fn max_limit(&self, time: RelativeTime) -> Result<u32, ConfigError> {
        compute_max_limit(time.as_secs(), self.seconds_per_block)
    }
}

/// What we assume about the forwarding policies along a swap route.
///
/// Used to be global constants; now it is configured per relay so that the
/// budget is not silently wrong on a network with different policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForwardingPolicy {
    /// Time lock delta each forwarding hop, including ourselves, subtracts
    /// from an incoming HTLC.
    pub forward_delta: RelativeTime,
    /// Time the end node needs to settle the final HTLC.
    pub final_delta: RelativeTime,
    /// Safety margin on top of everything else.
    pub buffer: RelativeTime,
    /// Number of forwarding hops between us and the counterparty.
    pub intermediate_hops: u32,
}

impl Default for ForwardingPolicy {
    fn default() -> Self {
        ForwardingPolicy {
            forward_delta: RelativeTime::new(FORWARD_DELTA_SECS),
            final_delta: RelativeTime::new(FINAL_DELTA_SECS),
            buffer: RelativeTime::new(BUFFER_SECS),
            intermediate_hops: 1,
        }
    }
}

impl ForwardingPolicy {
    /// The final delta a swap originator asks for: every known forwarding
    /// delta, the end node's settlement delta and the buffer.
    pub fn direct_final_delta(&self) -> RelativeTime {
        self.forward_delta
            .saturating_mul(self.intermediate_hops)
            .saturating_add(self.final_delta)
            .saturating_add(self.buffer)
    }
}

/// CLTV parameters of one outbound payment, in blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelockBudget {
    pub final_cltv_delta: u32,
    /// Upper bound for the total time lock of the route. `None` leaves the
    /// payment node's default in place.
    pub cltv_limit: Option<u32>,
}

impl TimelockBudget {
    /// Budget for the party originating a swap toward a counterparty with
    /// known forwarding policy.
    pub fn direct(chain: &Chain, policy: &ForwardingPolicy) -> Result<Self, ConfigError> {
        let budget = TimelockBudget {
            final_cltv_delta: chain.min_delta(policy.direct_final_delta())?,
            cltv_limit: None,
        };
        budget.validate(chain, policy)?;

        Ok(budget)
    }

    /// Budget for forwarding a swap whose deadline was set upstream.
    ///
    /// The remaining time until `absolute_max_time` is strictly floored.
    pub fn translated(
        chain: &Chain,
        policy: &ForwardingPolicy,
        absolute_max_time: Timestamp,
        final_delta: RelativeTime,
        now: Timestamp,
    ) -> Result<Self, ConfigError> {
        let remaining = now.seconds_until(absolute_max_time);

        let budget = TimelockBudget {
            final_cltv_delta: chain.min_delta(final_delta)?,
            cltv_limit: Some(compute_max_limit(remaining, chain.seconds_per_block)?),
        };
        budget.validate(chain, policy)?;

        Ok(budget)
    }

    /// Checks that the final delta plus the forwarding delta of every
    /// intermediate hop fits into the limit.
    pub fn validate(&self, chain: &Chain, policy: &ForwardingPolicy) -> Result<(), ConfigError> {
        if self.final_cltv_delta == 0 {
            return Err(ConfigError::ZeroFinalDelta);
        }

        if let Some(limit) = self.cltv_limit {
            let per_hop = chain.min_delta(policy.forward_delta)?;
            let required = per_hop
                .saturating_mul(policy.intermediate_hops)
                .saturating_add(self.final_cltv_delta);

            if required > limit {
                return Err(ConfigError::BudgetExceeded { required, limit });
            }
        }

        Ok(())
    }
}
