#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! The batched key-value store contract consumed by the trie layer.
//!
//! The persistent store itself is an external component; the core only
//! requires point reads and atomic batched writes. [`MemoryKeyValueStore`]
//! is the reference implementation used by tests and development setups.

mod error;
mod mem;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::DatabaseError;
pub use mem::MemoryKeyValueStore;

use alloy_primitives::Bytes;

/// Preferred size of a single write batch, in bytes. Writers flush and reset
/// their batch once its accumulated value size crosses this threshold.
pub const IDEAL_BATCH_SIZE: usize = 100 * 1024;

/// An accumulating write batch.
///
/// Entries become visible to readers only after [`Batch::write`] returns.
pub trait Batch {
    /// Queues a key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), DatabaseError>;

    /// Accumulated size of all queued values, in bytes.
    fn value_size(&self) -> usize;

    /// Atomically writes all queued entries to the store.
    fn write(&mut self) -> Result<(), DatabaseError>;

    /// Discards all queued entries.
    fn reset(&mut self);
}

/// A batched key-value store.
///
/// Implementations must tolerate concurrent readers while a batch is being
/// written; a batch write is the only mutation path.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait KeyValueStore: Send + Sync {
    /// Point read.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, DatabaseError>;

    /// Whether `key` is present.
    fn has(&self, key: &[u8]) -> Result<bool, DatabaseError> {
        Ok(self.get(key)?.is_some())
    }

    /// Starts a new write batch.
    fn batch(&self) -> Box<dyn Batch + '_>;

    /// All keys currently in the store.
    ///
    /// Expensive; meant for tests and state inspection only.
    fn keys(&self) -> Result<Vec<Vec<u8>>, DatabaseError>;
}
