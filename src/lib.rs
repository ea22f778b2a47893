//! Human-readable identifiers for companies and their entities
//!
//! Identifiers look like `MD-0001-CU-25-00007`: a module code, the company's
//! slot in the module, an entity code, the year, and a counter that is unique
//! within that combination.

pub mod domain;
pub use domain::{
    CompanyCode, CompanyCodePolicy, Config, Counter, EntityCode, EntityType, Identifier,
    ModuleCode, ModuleResolver, Partition, Year,
};

/// Identifier allocation on top of a persistence collaborator.
pub mod allocator;
pub use allocator::{Allocator, Error};

/// Sequence stores and identifier ledgers.
pub mod storage;
pub use storage::{IdentifierLedger, MemoryStore, SequenceStore, SqliteStore, StoreError};
