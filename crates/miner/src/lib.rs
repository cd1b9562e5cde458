#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! The mint coordinator.
//!
//! [`Miner`] drives block production under DPoS slot timing: a sync watcher
//! arms and disarms it around chain synchronization, an update task follows
//! the mempool and chain heads, and the mint loop wakes at every slot
//! boundary, validates the producer right, assembles a candidate block
//! under a wall-clock deadline, seals it and hands it to the backend.
//! Everything communicates through channels; in-flight work is cancelled
//! through idempotent tokens.

mod error;
mod events;
mod miner;
mod work;

pub use error::MinerError;
pub use events::{BlockAndLogsEvent, NewMinedBlockEvent, NewMinerEvent, SyncEvent};
pub use miner::{Miner, MinerConfig};
pub use work::calc_gas_limit;
