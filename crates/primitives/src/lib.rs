#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Commonly used value types in ursa.
//!
//! The account model, block structure, transaction kinds and the auxiliary
//! records (receipts, logs, delayed actions) shared by the state, consensus
//! and miner crates. All deterministic encodings go through [`alloy_rlp`].

mod account;
mod action;
mod block;
mod constants;
mod dpos;
mod log;
mod receipt;
mod storage_size;
mod transaction;

pub use account::Account;
pub use action::Action;
pub use block::{ordered_root, Block, Header};
pub use constants::{EMPTY_ROOT_HASH, KECCAK_EMPTY, NANOS_PER_SEC};
pub use dpos::DposContextProto;
pub use log::{logs_bloom, Log};
pub use receipt::Receipt;
pub use storage_size::StorageSize;
pub use transaction::{create_address, Transaction, TxType};

pub use alloy_primitives::{self, keccak256, Address, Bloom, Bytes, B256, U256};
