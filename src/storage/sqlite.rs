//! A durable store backed by `SQLite`.
//!
//! Sequences live in a `sequences` table with one row per key. A reservation
//! is a single upsert statement
//!
//! ```sql
//! INSERT INTO sequences (key, last) VALUES (?1, 1)
//! ON CONFLICT(key) DO UPDATE SET last = last + 1
//! RETURNING last
//! ```
//!
//! which `SQLite` executes atomically, so concurrent callers (threads sharing a
//! store, or separate processes opening the same file) never observe the same
//! value. Issued identifiers are kept in an `identifiers` table whose primary
//! key is the identifier itself. A partition reservation inserts its
//! identifier, and recording an identifier raises its partition's sequence,
//! each inside the same `IMMEDIATE` transaction as the counter update.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use rusqlite::{
    Connection, ErrorCode, OpenFlags, OptionalExtension, TransactionBehavior, params,
};
use serde::Deserialize;
use tracing::instrument;

use crate::{
    domain::{Identifier, Partition},
    storage::{IdentifierLedger, SequenceKey, SequenceStore, StoreError},
};

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl JournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// Configuration for [`SqliteStore`].
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// How long a writer waits for a lock before reporting
    /// [`StoreError::Busy`], in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: JournalMode,
}

impl SqliteStoreConfig {
    /// Returns the default configuration for a database at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: JournalMode::default(),
        }
    }
}

/// A durable [`SequenceStore`] and [`IdentifierLedger`].
#[derive(Debug)]
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if necessary) the database described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the database cannot be opened, or if it was
    /// created by an incompatible version of this crate.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let mut connection = Connection::open_with_flags(&config.path, flags).map_err(map_error)?;
        connection
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(map_error)?;
        connection
            .execute_batch(&format!(
                "PRAGMA journal_mode = {};",
                config.journal_mode.pragma_value()
            ))
            .map_err(map_error)?;
        initialize_schema(&mut connection)?;
        tracing::debug!(path = %config.path.display(), "opened sqlite store");
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Opens the database at `path` with default settings.
    ///
    /// # Errors
    ///
    /// See [`SqliteStore::open`].
    pub fn open_path(path: &Path) -> Result<Self, StoreError> {
        Self::open(&SqliteStoreConfig::new(path))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut connection = Connection::open_in_memory().map_err(map_error)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection mutex poisoned".to_string()))
    }
}

impl SequenceStore for SqliteStore {
    #[instrument(level = "trace", skip_all, fields(key = %key))]
    fn reserve(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_error)?;

        let last: i64 = tx
            .prepare_cached(
                "INSERT INTO sequences (key, last) VALUES (?1, 1)
                 ON CONFLICT(key) DO UPDATE SET last = last + 1
                 RETURNING last",
            )
            .and_then(|mut stmt| stmt.query_row(params![key.to_string()], |row| row.get(0)))
            .map_err(map_error)?;
        let value = u64::try_from(last)
            .map_err(|_| StoreError::Backend(format!("negative sequence {last}")))?;

        let recorded = match key.identifier(value) {
            Some(identifier) => insert_identifier(&tx, &identifier),
            None => Ok(()),
        };
        // The value stays consumed even if its identifier is already taken.
        if matches!(recorded, Ok(()) | Err(StoreError::Duplicate(_))) {
            tx.commit().map_err(map_error)?;
        }
        recorded.map(|()| value)
    }

    fn sequences(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let connection = self.lock()?;
        let mut stmt = connection
            .prepare_cached("SELECT key, last FROM sequences ORDER BY key")
            .map_err(map_error)?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(map_error)?;

        rows.map(|row| {
            let (key, last) = row.map_err(map_error)?;
            let last = u64::try_from(last)
                .map_err(|_| StoreError::Backend(format!("negative sequence {last} for {key}")))?;
            Ok((key, last))
        })
        .collect()
    }
}

impl IdentifierLedger for SqliteStore {
    #[instrument(level = "trace", skip_all, fields(prefix = %partition.prefix()))]
    fn latest(&self, partition: &Partition) -> Result<Option<Identifier>, StoreError> {
        let connection = self.lock()?;
        let latest: Option<String> = connection
            .query_row(
                "SELECT identifier FROM identifiers
                 WHERE partition_prefix = ?1
                 ORDER BY identifier DESC
                 LIMIT 1",
                params![partition.prefix()],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_error)?;

        latest
            .map(|raw| {
                Identifier::from_str(&raw).map_err(|e| {
                    StoreError::Backend(format!("corrupt identifier row: {e}"))
                })
            })
            .transpose()
    }

    #[instrument(level = "trace", skip_all, fields(identifier = %identifier))]
    fn record(&self, identifier: &Identifier) -> Result<(), StoreError> {
        let mut connection = self.lock()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_error)?;

        insert_identifier(&tx, identifier)?;
        tx.execute(
            "INSERT INTO sequences (key, last) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET last = max(last, excluded.last)",
            params![identifier.partition().prefix(), identifier.counter().get()],
        )
        .map_err(map_error)?;

        tx.commit().map_err(map_error)
    }
}

/// Inserts an issued identifier, reporting a taken identifier as
/// [`StoreError::Duplicate`].
fn insert_identifier(connection: &Connection, identifier: &Identifier) -> Result<(), StoreError> {
    let result = connection.execute(
        "INSERT INTO identifiers (identifier, partition_prefix, counter, issued_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            identifier.to_string(),
            identifier.partition().prefix(),
            identifier.counter().get(),
            chrono::Utc::now().to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::Duplicate(identifier.to_string()))
        }
        Err(err) => Err(map_error(err)),
    }
}

/// Classifies a `SQLite` error as transient or permanent.
fn map_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            StoreError::Busy(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(map_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(map_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| {
            row.get(0)
        })
        .optional()
        .map_err(map_error)?;

    match version {
        None => {
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(map_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS sequences (
                    key TEXT PRIMARY KEY NOT NULL,
                    last INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS identifiers (
                    identifier TEXT PRIMARY KEY NOT NULL,
                    partition_prefix TEXT NOT NULL,
                    counter INTEGER NOT NULL,
                    issued_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_identifiers_partition
                    ON identifiers (partition_prefix, identifier);",
            )
            .map_err(map_error)?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(StoreError::Backend(format!(
                "unsupported store schema version {other} (expected {SCHEMA_VERSION})"
            )));
        }
    }

    tx.commit().map_err(map_error)
}
