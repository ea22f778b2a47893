//! Allocation of new identifiers.
//!
//! The [`Allocator`] turns a request ("a new customer for company
//! `MD-0001-CO-25-00001`") into a fresh [`Identifier`]. Counters come from a
//! [`SequenceStore`], which increments atomically, so the allocator itself
//! holds no mutable state and can be shared freely between threads.
//!
//! For callers whose only persistence contract is "find the last identifier
//! with this prefix" and "insert under a unique key", [`Allocator::issue`]
//! runs the lookup-then-insert cycle against an [`IdentifierLedger`] and
//! retries when it loses a race.

use std::{thread, time::Duration};

use tracing::instrument;

use crate::{
    domain::{
        CompanyCode, CompanyCodePolicy, Config, Counter, EntityType, Identifier, InvalidFormat,
        InvalidModuleName, ModuleCode, ModuleResolver, Partition, Year,
    },
    storage::{IdentifierLedger, SequenceKey, SequenceStore, StoreError},
};

/// Upper bound on the pause between retries of a busy store.
const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Errors that can occur while allocating an identifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// No module code could be derived from the module name.
    #[error(transparent)]
    InvalidModuleName(#[from] InvalidModuleName),

    /// A string did not match the identifier grammar.
    #[error(transparent)]
    InvalidIdentifierFormat(#[from] InvalidFormat),

    /// Entities can only be allocated under a company (`CO`) identifier.
    #[error("{0} is not a company identifier")]
    NotACompany(Identifier),

    /// Companies with their own company numbers are created with
    /// [`Allocator::register_company`], not as entities of another company.
    #[error("companies cannot be allocated as entities of {0}; register them instead")]
    CompanyAsEntity(Identifier),

    /// The store could not produce the last issued counter.
    #[error("failed to look up the last counter for {key}")]
    CounterLookupFailed {
        /// The sequence or partition prefix being looked up.
        key: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// The ledger kept reporting the candidate identifier as taken.
    #[error("identifier {identifier} was still taken after {attempts} attempts")]
    DuplicateIdentifier {
        /// The last candidate that collided.
        identifier: String,
        /// How many candidates were tried.
        attempts: u32,
    },

    /// The ledger failed to record an identifier for a reason other than a
    /// collision.
    #[error("failed to record identifier {identifier}")]
    RecordFailed {
        /// The identifier that was being recorded.
        identifier: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// The sequence has used up every value that fits its fixed width.
    #[error("sequence {key} is exhausted (limit {limit})")]
    CounterExhausted {
        /// The exhausted sequence.
        key: String,
        /// The largest value the sequence may hold.
        limit: u32,
    },
}

impl Error {
    /// Returns `true` if the caller may retry the whole creation request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::CounterLookupFailed { source, .. } | Self::RecordFailed { source, .. } => {
                source.is_transient()
            }
            Self::DuplicateIdentifier { .. } => true,
            Self::InvalidModuleName(_)
            | Self::InvalidIdentifierFormat(_)
            | Self::NotACompany(_)
            | Self::CompanyAsEntity(_)
            | Self::CounterExhausted { .. } => false,
        }
    }
}

/// Allocates identifiers for companies and their entities.
#[derive(Debug)]
pub struct Allocator<S> {
    store: S,
    resolver: ModuleResolver,
    company_codes: CompanyCodePolicy,
    fixed_company_code: CompanyCode,
    strict_module_names: bool,
    max_retries: u32,
}

impl<S: SequenceStore> Allocator<S> {
    /// Creates an allocator with the default configuration.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_config(store, &Config::default())
    }

    /// Creates an allocator configured by `config`.
    #[must_use]
    pub fn with_config(store: S, config: &Config) -> Self {
        if !store.is_authoritative() {
            tracing::warn!(
                "identifier store is process-local; identifiers are only unique within this process"
            );
        }
        Self {
            store,
            resolver: config.resolver(),
            company_codes: config.company_codes,
            fixed_company_code: config.fixed_company_code(),
            strict_module_names: config.strict_module_names,
            max_retries: config.max_retries,
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Allocates the next identifier in `partition`.
    ///
    /// # Errors
    ///
    /// - [`Error::CounterLookupFailed`] if the store fails (transient failures
    ///   are retried first)
    /// - [`Error::DuplicateIdentifier`] if the store kept reporting reserved
    ///   identifiers as already taken
    /// - [`Error::CounterExhausted`] once the partition has issued `99999`
    ///   identifiers
    #[instrument(level = "debug", skip_all, fields(partition = %partition.prefix()))]
    pub fn allocate(&self, partition: Partition) -> Result<Identifier, Error> {
        let key = SequenceKey::Partition(partition.clone());
        let value = self.reserve(&key)?;
        let counter = u32::try_from(value)
            .ok()
            .and_then(|v| Counter::new(v).ok())
            .ok_or_else(|| Error::CounterExhausted {
                key: key.to_string(),
                limit: Counter::MAX,
            })?;

        let identifier = partition.identifier(counter);
        tracing::debug!(%identifier, "allocated identifier");
        Ok(identifier)
    }

    /// Registers a new company in the module named `module` and returns the
    /// company's identifier.
    ///
    /// `module` may be a module name (`"Mobile Detailing"`) or a module code
    /// (`"MD"`). Under [`CompanyCodePolicy::Sequential`] the company receives
    /// the next free company number in the module; under
    /// [`CompanyCodePolicy::Fixed`] it shares the configured code.
    ///
    /// ```
    /// use idgen::{Allocator, MemoryStore, Year};
    ///
    /// let allocator = Allocator::new(MemoryStore::new());
    /// let year = Year::from_calendar(2025);
    ///
    /// let first = allocator.register_company("Mobile Detailing", year).unwrap();
    /// let second = allocator.register_company("MD", year).unwrap();
    /// assert_eq!(first.to_string(), "MD-0001-CO-25-00001");
    /// assert_eq!(second.to_string(), "MD-0002-CO-25-00001");
    /// ```
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidModuleName`] if strict module names are configured and
    ///   no code can be derived from `module`
    /// - any error from [`Allocator::allocate`], or
    ///   [`Error::CounterExhausted`] once a module has 9999 companies
    #[instrument(level = "debug", skip(self))]
    pub fn register_company(&self, module: &str, year: Year) -> Result<Identifier, Error> {
        let module_code = if self.strict_module_names {
            self.resolver.resolve_name_or_code_strict(module)?
        } else {
            self.resolver.resolve_name_or_code(module)
        };

        let company_code = match self.company_codes {
            CompanyCodePolicy::Fixed => self.fixed_company_code,
            CompanyCodePolicy::Sequential => self.next_company_code(&module_code)?,
        };

        self.allocate(Partition::new(
            module_code,
            company_code,
            EntityType::Company.code(),
            year,
        ))
    }

    /// Registers a company, using the current UTC year.
    ///
    /// # Errors
    ///
    /// See [`Allocator::register_company`].
    pub fn register_company_now(&self, module: &str) -> Result<Identifier, Error> {
        self.register_company(module, Year::current())
    }

    /// Allocates an identifier for an entity owned by the company `company_id`.
    ///
    /// The new identifier shares the company's module and company codes.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIdentifierFormat`] if `company_id` does not parse
    /// - [`Error::NotACompany`] if `company_id` is not a `CO` identifier
    /// - [`Error::CompanyAsEntity`] if `entity_type` is
    ///   [`EntityType::Company`] while companies are numbered sequentially
    /// - any error from [`Allocator::allocate`]
    #[instrument(level = "debug", skip(self))]
    pub fn allocate_entity(
        &self,
        company_id: &str,
        entity_type: EntityType,
        year: Year,
    ) -> Result<Identifier, Error> {
        let company: Identifier = company_id.parse()?;
        if company.entity_type() != EntityType::Company {
            return Err(Error::NotACompany(company));
        }
        if entity_type == EntityType::Company
            && self.company_codes == CompanyCodePolicy::Sequential
        {
            return Err(Error::CompanyAsEntity(company));
        }

        self.allocate(Partition::new(
            company.module_code().clone(),
            company.company_code(),
            entity_type.code(),
            year,
        ))
    }

    /// Allocates an entity identifier, using the current UTC year.
    ///
    /// # Errors
    ///
    /// See [`Allocator::allocate_entity`].
    pub fn allocate_entity_now(
        &self,
        company_id: &str,
        entity_type: EntityType,
    ) -> Result<Identifier, Error> {
        self.allocate_entity(company_id, entity_type, Year::current())
    }

    fn next_company_code(&self, module: &ModuleCode) -> Result<CompanyCode, Error> {
        let key = SequenceKey::Companies(module.clone());
        let value = self.reserve(&key)?;
        u32::try_from(value)
            .ok()
            .and_then(|v| CompanyCode::new(v).ok())
            .ok_or_else(|| Error::CounterExhausted {
                key: key.to_string(),
                limit: u32::from(CompanyCode::MAX),
            })
    }

    /// Reserves the next value of `key`, retrying while the store is busy or
    /// the reserved identifier is already taken.
    fn reserve(&self, key: &SequenceKey) -> Result<u64, Error> {
        let mut attempt = 0;
        loop {
            match self.store.reserve(key) {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(%key, %error, attempt, "store busy, retrying reservation");
                    backoff(attempt);
                }
                Err(StoreError::Duplicate(identifier)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(%key, %identifier, attempt, "identifier taken, reserving again");
                }
                Err(StoreError::Duplicate(identifier)) => {
                    return Err(Error::DuplicateIdentifier {
                        identifier,
                        attempts: attempt + 1,
                    });
                }
                Err(source) => {
                    return Err(Error::CounterLookupFailed {
                        key: key.to_string(),
                        source,
                    });
                }
            }
        }
    }
}

impl<S> Allocator<S> {
    /// Returns the module resolver.
    #[must_use]
    pub const fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    /// Issues the next identifier in `partition` by reading the ledger's last
    /// identifier and recording its successor.
    ///
    /// If another writer records the same candidate first, the ledger reports
    /// a duplicate and the cycle starts again with a fresh lookup, up to
    /// `max_retries` times. Counters handed out this way follow the commit
    /// order of the ledger; a failed write leaves no gap because nothing was
    /// recorded.
    ///
    /// # Errors
    ///
    /// - [`Error::CounterLookupFailed`] if the ledger lookup fails
    /// - [`Error::DuplicateIdentifier`] if every attempt collided
    /// - [`Error::RecordFailed`] if the ledger write fails for another reason
    /// - [`Error::CounterExhausted`] once the partition is full
    #[instrument(level = "debug", skip_all, fields(partition = %partition.prefix()))]
    pub fn issue<L>(&self, ledger: &L, partition: &Partition) -> Result<Identifier, Error>
    where
        L: IdentifierLedger + ?Sized,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let retries_left = attempts <= self.max_retries;

            let latest = match ledger.latest(partition) {
                Ok(latest) => latest,
                Err(error) if error.is_transient() && retries_left => {
                    tracing::warn!(%error, attempts, "ledger busy, retrying lookup");
                    backoff(attempts);
                    continue;
                }
                Err(source) => {
                    return Err(Error::CounterLookupFailed {
                        key: partition.prefix(),
                        source,
                    });
                }
            };

            let counter = match latest {
                None => Counter::FIRST,
                Some(latest) => latest
                    .counter()
                    .next()
                    .ok_or_else(|| Error::CounterExhausted {
                        key: partition.prefix(),
                        limit: Counter::MAX,
                    })?,
            };
            let candidate = partition.clone().identifier(counter);

            match ledger.record(&candidate) {
                Ok(()) => {
                    tracing::debug!(identifier = %candidate, attempts, "issued identifier");
                    return Ok(candidate);
                }
                Err(StoreError::Duplicate(_)) if retries_left => {
                    tracing::warn!(identifier = %candidate, attempts, "identifier taken, retrying");
                }
                Err(StoreError::Duplicate(_)) => {
                    return Err(Error::DuplicateIdentifier {
                        identifier: candidate.to_string(),
                        attempts,
                    });
                }
                Err(error) if error.is_transient() && retries_left => {
                    tracing::warn!(%error, attempts, "ledger busy, retrying write");
                    backoff(attempts);
                }
                Err(source) => {
                    return Err(Error::RecordFailed {
                        identifier: candidate.to_string(),
                        source,
                    });
                }
            }
        }
    }
}

/// Sleeps for an exponentially growing, capped interval.
fn backoff(attempt: u32) {
    let delay = Duration::from_millis(1) * 2u32.saturating_pow(attempt.min(16));
    thread::sleep(delay.min(MAX_BACKOFF));
}
