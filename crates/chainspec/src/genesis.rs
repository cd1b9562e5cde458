use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ursa_primitives::NANOS_PER_SEC;

/// One pre-funded account in the genesis allocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Initial spendable balance.
    #[serde(default)]
    pub balance: U256,
    /// Initial locked balance.
    #[serde(default)]
    pub locked_balance: U256,
    /// Initial nonce.
    #[serde(default)]
    pub nonce: u64,
    /// Deployed bytecode.
    #[serde(default)]
    pub code: Bytes,
    /// Pre-set storage slots.
    #[serde(default)]
    pub storage: BTreeMap<B256, B256>,
}

/// The genesis block specification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    /// Genesis timestamp in nanoseconds.
    pub timestamp: u64,
    /// Producer-supplied bytes carried in the genesis header.
    #[serde(default)]
    pub extra_data: Bytes,
    /// Gas limit of the genesis block.
    pub gas_limit: u64,
    /// Difficulty of the genesis block.
    pub difficulty: U256,
    /// The initial validator set.
    pub validators: Vec<Address>,
    /// Pre-funded accounts.
    #[serde(default)]
    pub alloc: BTreeMap<Address, GenesisAccount>,
}

impl Default for Genesis {
    fn default() -> Self {
        let candidate = crate::DEV_CANDIDATE;
        let mut alloc = BTreeMap::new();
        alloc.insert(
            candidate,
            GenesisAccount {
                balance: U256::from(10u128).pow(U256::from(27)),
                ..Default::default()
            },
        );
        Self {
            timestamp: 1_531_551_970 * NANOS_PER_SEC,
            extra_data: Bytes::from_static(b"ursa genesis"),
            gas_limit: 4_712_388,
            difficulty: U256::from(1),
            validators: vec![candidate],
            alloc,
        }
    }
}
