//! Persistence collaborators for the allocator.
//!
//! The allocator talks to storage through two traits:
//!
//! - [`SequenceStore`] hands out counters with a single atomic
//!   increment-and-return per reservation.
//! - [`IdentifierLedger`] records issued identifiers under a uniqueness
//!   constraint and answers "what was the last identifier issued in this
//!   partition?".
//!
//! [`SqliteStore`] implements both durably. [`MemoryStore`] implements both
//! inside a single process and reports itself as non-authoritative.
//!
//! A store that implements both keeps them in step: reserving a partition
//! counter records the identifier in the ledger, and recording an identifier
//! advances the partition's sequence past it. Each happens in one atomic
//! step, so [`Allocator::allocate`](crate::Allocator::allocate) and
//! [`Allocator::issue`](crate::Allocator::issue) never hand out the same
//! identifier from one store.

use std::fmt;

use crate::domain::{Counter, Identifier, ModuleCode, Partition};

/// Process-local stores.
pub mod memory;
/// `SQLite` backed stores.
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SqliteStoreConfig};

/// Names an independent counter sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SequenceKey {
    /// The counters of one identifier partition.
    Partition(Partition),

    /// The company numbers handed out within one module.
    Companies(ModuleCode),
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition(partition) => f.write_str(&partition.prefix()),
            Self::Companies(module) => write!(f, "{module}-companies"),
        }
    }
}

impl SequenceKey {
    /// The identifier a reserved value stands for, if this key numbers a
    /// partition and the value fits a counter.
    fn identifier(&self, value: u64) -> Option<Identifier> {
        let Self::Partition(partition) = self else {
            return None;
        };
        let counter = u32::try_from(value).ok().and_then(|v| Counter::new(v).ok())?;
        Some(partition.clone().identifier(counter))
    }
}

/// Errors reported by a store.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum StoreError {
    /// The identifier has already been recorded.
    #[error("identifier {0} has already been recorded")]
    Duplicate(String),

    /// The store is temporarily unavailable (locked or busy); the operation
    /// may succeed if retried.
    #[error("store busy: {0}")]
    Busy(String),

    /// Any other storage failure.
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// A source of atomically incremented counters.
pub trait SequenceStore: Send + Sync {
    /// Atomically increments the sequence and returns the new value.
    ///
    /// The first reservation in a sequence returns 1. No two calls ever
    /// return the same value for the same key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the store is also a ledger and
    /// already holds the identifier for the reserved value (the value stays
    /// consumed), or another [`StoreError`] if the store cannot be reached or
    /// updated.
    fn reserve(&self, key: &SequenceKey) -> Result<u64, StoreError>;

    /// Returns every sequence with the last value it handed out, ordered by
    /// key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    fn sequences(&self) -> Result<Vec<(String, u64)>, StoreError>;

    /// Whether counters from this store are unique across every process that
    /// allocates identifiers.
    fn is_authoritative(&self) -> bool {
        true
    }
}

/// A record of issued identifiers with a uniqueness constraint.
pub trait IdentifierLedger: Send + Sync {
    /// Returns the highest identifier recorded in the partition.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the lookup fails. Implementations must not
    /// report "nothing recorded" when the lookup could not be performed.
    fn latest(&self, partition: &Partition) -> Result<Option<Identifier>, StoreError>;

    /// Records an identifier.
    ///
    /// Stores that also implement [`SequenceStore`] advance the identifier's
    /// partition sequence to at least its counter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the identifier is already recorded,
    /// or another [`StoreError`] if the write fails.
    fn record(&self, identifier: &Identifier) -> Result<(), StoreError>;
}

impl<T: SequenceStore + ?Sized> SequenceStore for &T {
    fn reserve(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        (**self).reserve(key)
    }

    fn sequences(&self) -> Result<Vec<(String, u64)>, StoreError> {
        (**self).sequences()
    }

    fn is_authoritative(&self) -> bool {
        (**self).is_authoritative()
    }
}

impl<T: SequenceStore + ?Sized> SequenceStore for std::sync::Arc<T> {
    fn reserve(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        (**self).reserve(key)
    }

    fn sequences(&self) -> Result<Vec<(String, u64)>, StoreError> {
        (**self).sequences()
    }

    fn is_authoritative(&self) -> bool {
        (**self).is_authoritative()
    }
}
