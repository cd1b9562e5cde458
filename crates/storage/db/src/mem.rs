use crate::{Batch, DatabaseError, KeyValueStore};
use alloy_primitives::Bytes;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// An in-memory [`KeyValueStore`].
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<Vec<u8>, Bytes>>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, DatabaseError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn batch(&self) -> Box<dyn Batch + '_> {
        Box::new(MemoryBatch { store: self, queued: Vec::new(), value_size: 0 })
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>, DatabaseError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// Write batch over a [`MemoryKeyValueStore`].
#[derive(Debug)]
struct MemoryBatch<'a> {
    store: &'a MemoryKeyValueStore,
    queued: Vec<(Vec<u8>, Bytes)>,
    value_size: usize,
}

impl Batch for MemoryBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), DatabaseError> {
        self.value_size += value.len();
        self.queued.push((key.to_vec(), Bytes::copy_from_slice(value)));
        Ok(())
    }

    fn value_size(&self) -> usize {
        self.value_size
    }

    fn write(&mut self) -> Result<(), DatabaseError> {
        let mut entries = self.store.entries.write();
        for (key, value) in self.queued.drain(..) {
            entries.insert(key, value);
        }
        self.value_size = 0;
        Ok(())
    }

    fn reset(&mut self) {
        self.queued.clear();
        self.value_size = 0;
    }
}
