//! An in-process store.
//!
//! [`MemoryStore`] keeps its sequences and ledger behind a mutex, so it is
//! safe to share between threads of one process. It knows nothing about other
//! processes or restarts: two instances hand out the same counters. It is
//! meant for tests, single-process tools, and as a stand-in while a durable
//! store is unavailable, and it says so through
//! [`SequenceStore::is_authoritative`].

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard},
};

use crate::{
    domain::{Counter, Identifier, Partition},
    storage::{IdentifierLedger, SequenceKey, SequenceStore, StoreError},
};

#[derive(Debug, Default)]
struct State {
    sequences: BTreeMap<String, u64>,
    ledger: BTreeSet<Identifier>,
}

/// A process-local [`SequenceStore`] and [`IdentifierLedger`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }
}

impl SequenceStore for MemoryStore {
    fn reserve(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let last = state.sequences.entry(key.to_string()).or_insert(0);
        *last += 1;
        let value = *last;

        if let Some(identifier) = key.identifier(value) {
            if !state.ledger.insert(identifier.clone()) {
                return Err(StoreError::Duplicate(identifier.to_string()));
            }
        }
        Ok(value)
    }

    fn sequences(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .sequences
            .iter()
            .map(|(key, last)| (key.clone(), *last))
            .collect())
    }

    fn is_authoritative(&self) -> bool {
        false
    }
}

impl IdentifierLedger for MemoryStore {
    fn latest(&self, partition: &Partition) -> Result<Option<Identifier>, StoreError> {
        // Identifiers order by partition first, then counter, so the
        // partition's identifiers form one contiguous range.
        let start = partition.clone().identifier(Counter::FIRST);
        let end = partition.clone().identifier(
            Counter::new(Counter::MAX).map_err(|e| StoreError::Backend(e.to_string()))?,
        );

        let state = self.lock()?;
        Ok(state.ledger.range(start..=end).next_back().cloned())
    }

    fn record(&self, identifier: &Identifier) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.ledger.insert(identifier.clone()) {
            return Err(StoreError::Duplicate(identifier.to_string()));
        }

        let counter = u64::from(identifier.counter().get());
        let last = state
            .sequences
            .entry(identifier.partition().prefix())
            .or_insert(0);
        *last = (*last).max(counter);
        Ok(())
    }
}
