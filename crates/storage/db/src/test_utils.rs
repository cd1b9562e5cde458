//! Fault-injecting store wrappers for failure-path tests.

use crate::{Batch, DatabaseError, KeyValueStore, MemoryKeyValueStore};
use alloy_primitives::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};

/// Wraps a [`MemoryKeyValueStore`] and fails every batch write while armed.
///
/// Used to assert that a failed commit never tears down in-memory caches.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryKeyValueStore,
    fail_writes: AtomicBool,
}

impl FailingStore {
    /// Creates a store with write failures disarmed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms or disarms batch-write failures.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The wrapped store.
    pub fn inner(&self) -> &MemoryKeyValueStore {
        &self.inner
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, DatabaseError> {
        self.inner.get(key)
    }

    fn batch(&self) -> Box<dyn Batch + '_> {
        Box::new(FailingBatch { store: self, inner: self.inner.batch() })
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>, DatabaseError> {
        self.inner.keys()
    }
}

struct FailingBatch<'a> {
    store: &'a FailingStore,
    inner: Box<dyn Batch + 'a>,
}

impl Batch for FailingBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), DatabaseError> {
        self.inner.put(key, value)
    }

    fn value_size(&self) -> usize {
        self.inner.value_size()
    }

    fn write(&mut self) -> Result<(), DatabaseError> {
        if self.store.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Write("injected failure".into()));
        }
        self.inner.write()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}
