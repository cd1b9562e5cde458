#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! The transaction pool.
//!
//! Transactions are kept in strict nonce-sorted per-sender lists with
//! price-bump replacement; block producers consume them through
//! [`TransactionsByPriceAndNonce`], which yields the best-priced executable
//! transaction across senders while preserving per-sender nonce order. The
//! pool also queues the delayed redemption [`Action`]s emitted by
//! undelegations.
//!
//! [`Action`]: ursa_primitives::Action

mod config;
mod error;
mod gas;
mod list;
mod ordering;
mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use gas::{intrinsic_gas, TX_GAS};
pub use list::{TxList, TxSortedMap};
pub use ordering::TransactionsByPriceAndNonce;
pub use pool::{NewTxsEvent, TxPool};
