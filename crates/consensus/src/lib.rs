#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Consensus: the engine contract exposed by the core, the chain-view traits
//! engines and the miner consume, and the delegated-proof-of-stake engine.

mod chain;
mod engine;
mod error;
mod genesis;

pub mod dpos;

pub use chain::{ChainReader, MintBackend};
pub use engine::Engine;
pub use error::ConsensusError;
pub use genesis::build_genesis;
