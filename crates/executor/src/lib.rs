#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Applies transactions and delayed actions against a [`StateDb`] view.
//!
//! Binary transactions run the full state transition (nonce and funds
//! checks, gas purchase, intrinsic gas, value transfer, refunds, producer
//! fee); bytecode execution itself is delegated to the [`Vm`] seam since the
//! interpreter is an external component. The DPoS transaction kinds mutate
//! the delegation bookkeeping directly.
//!
//! [`StateDb`]: ursa_state::StateDb

mod error;
mod executor;
mod gas_pool;
mod vm;

pub use error::ExecutionError;
pub use executor::{ApplyOutcome, BlockOutcome, Executor};
pub use gas_pool::GasPool;
pub use vm::{TransferVm, Vm, VmOutcome};
