use crate::Genesis;
use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use ursa_primitives::NANOS_PER_SEC;

/// The default development block producer, funded and registered as the
/// initial candidate by the default genesis.
pub const DEV_CANDIDATE: Address = address!("970e8128ab834e8eac17ab8e3812f010678cf791");

/// Immutable chain parameters, threaded through constructors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    /// Network identifier.
    pub chain_id: u64,
    /// DPoS slot duration in nanoseconds.
    pub block_interval: u64,
    /// Seconds a redemption stays locked after undelegation.
    pub delay_duration: u64,
    /// Maximum number of candidates one account may vote for.
    pub max_votes: u64,
    /// Minimum stake required to act as a candidate.
    pub min_start_quantity: U256,
    /// Gas price floor for transaction admission.
    pub min_gas_price: U256,
    /// Floor for the per-block gas limit.
    pub min_gas_limit: u64,
    /// Gas limit of the genesis block, also the target the limit adjusts
    /// toward.
    pub genesis_gas_limit: u64,
    /// Divisor bounding per-block gas limit movement.
    pub gas_limit_bound_divisor: u64,
    /// Reward credited to the block producer.
    pub block_reward: U256,
    /// The genesis specification.
    pub genesis: Genesis,
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self {
            chain_id: 1,
            block_interval: 10 * NANOS_PER_SEC,
            delay_duration: 72 * 3600,
            max_votes: 30,
            min_start_quantity: U256::from(100),
            min_gas_price: U256::from(1),
            min_gas_limit: 5_000,
            genesis_gas_limit: 4_712_388,
            gas_limit_bound_divisor: 1_024,
            block_reward: U256::from(5_000_000_000_000_000_000u128),
            genesis: Genesis::default(),
        }
    }
}

impl ChainSpec {
    /// The redemption delay as a 256-bit value, for state arithmetic.
    pub fn delay_duration_u256(&self) -> U256 {
        U256::from(self.delay_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let spec = ChainSpec::default();
        assert_eq!(spec.max_votes, 30);
        assert_eq!(spec.delay_duration, 72 * 3600);
        assert_eq!(spec.min_start_quantity, U256::from(100));
        assert_eq!(spec.gas_limit_bound_divisor, 1024);
        assert_eq!(spec.block_interval % NANOS_PER_SEC, 0);
    }

    #[test]
    fn spec_serde_roundtrip() {
        let spec = ChainSpec::default();
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(serde_json::from_str::<ChainSpec>(&json).unwrap(), spec);
    }
}
