#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! The immutable chain-parameters value and the genesis specification.
//!
//! There is no process-wide configuration: a [`ChainSpec`] is built once and
//! threaded through constructors as an `Arc`.

mod genesis;
mod spec;

pub use genesis::{Genesis, GenesisAccount};
pub use spec::{ChainSpec, DEV_CANDIDATE};
