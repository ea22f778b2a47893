//! Domain models for identifier allocation.
//!
//! This module contains the identifier grammar and its segments, the module
//! name resolver, and configuration.

/// Validated identifier segments: module, company, entity, year and counter.
pub mod code;
pub use code::{CompanyCode, Counter, EntityCode, EntityType, ModuleCode, SegmentError, Year};

mod config;
pub use config::{CompanyCodePolicy, Config, ModuleEntry};

/// Identifier parsing and formatting.
pub mod identifier;
pub use identifier::{Identifier, InvalidFormat, Partition};

/// Module name resolution.
pub mod resolver;
pub use resolver::{InvalidModuleName, ModulePattern, ModuleResolver};
