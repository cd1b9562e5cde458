#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Journaled account state.
//!
//! [`StateDb`] stages account mutations in memory behind a linear journal of
//! reversible entries: any prefix of the mutation history can be restored in
//! constant time per entry via snapshots, intermediate Merkle roots can be
//! produced without persisting, and a commit flows the staged tries through
//! the node cache to the backing store.

mod dump;
mod error;
mod journal;
mod object;
mod statedb;

pub use dump::{Dump, DumpAccount};
pub use error::StateError;
pub use statedb::StateDb;
