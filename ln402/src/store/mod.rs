//! Record storage for issued invoices.
//!
//! The gate keeps one [`InvoiceMetadata`] per issued invoice, keyed by
//! payment hash. Backends:
//!
//! - [`MemoryStore`]: a concurrent map, lost on restart.
//! - [`SqliteStore`] (feature `sqlite`): an embedded database file that
//!   survives restarts and can be shared by several processes.
//!
//! [`AnyStore`] selects one of them at runtime.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::sync::Arc;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{DEFAULT_DB_PATH, SqliteStore};

use crate::BoxFuture;
use crate::metadata::InvoiceMetadata;
use crate::preimage::PaymentHash;

/// Errors raised by a [`RecordStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A stored record could not be encoded or decoded.
    #[error("invalid invoice metadata record: {0}")]
    Codec(#[from] serde_json::Error),
    /// The embedded database reported an error.
    #[cfg(feature = "sqlite")]
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Key/value storage for invoice metadata.
///
/// Backends must provide read-your-writes consistency per key, and
/// [`mark_used`](RecordStore::mark_used) must be an atomic compare-and-set.
pub trait RecordStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous record.
    fn put<'a>(
        &'a self,
        key: &'a PaymentHash,
        value: &'a InvoiceMetadata,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Loads the record stored under `key`.
    fn get<'a>(
        &'a self,
        key: &'a PaymentHash,
    ) -> BoxFuture<'a, Result<Option<InvoiceMetadata>, StoreError>>;

    /// Atomically flips `used` from `false` to `true`.
    ///
    /// Returns `false` if the record is missing or was already used, in which
    /// case nothing is written.
    fn mark_used<'a>(&'a self, key: &'a PaymentHash) -> BoxFuture<'a, Result<bool, StoreError>>;
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn put<'a>(
        &'a self,
        key: &'a PaymentHash,
        value: &'a InvoiceMetadata,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).put(key, value)
    }

    fn get<'a>(
        &'a self,
        key: &'a PaymentHash,
    ) -> BoxFuture<'a, Result<Option<InvoiceMetadata>, StoreError>> {
        (**self).get(key)
    }

    fn mark_used<'a>(&'a self, key: &'a PaymentHash) -> BoxFuture<'a, Result<bool, StoreError>> {
        (**self).mark_used(key)
    }
}

/// A store chosen at runtime, e.g. from configuration.
#[derive(Debug, Clone)]
pub enum AnyStore {
    /// In-process map.
    Memory(MemoryStore),
    /// Embedded SQLite database.
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteStore),
}

impl From<MemoryStore> for AnyStore {
    fn from(store: MemoryStore) -> Self {
        Self::Memory(store)
    }
}

#[cfg(feature = "sqlite")]
impl From<SqliteStore> for AnyStore {
    fn from(store: SqliteStore) -> Self {
        Self::Sqlite(store)
    }
}

impl RecordStore for AnyStore {
    fn put<'a>(
        &'a self,
        key: &'a PaymentHash,
        value: &'a InvoiceMetadata,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        match self {
            Self::Memory(store) => store.put(key, value),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(store) => store.put(key, value),
        }
    }

    fn get<'a>(
        &'a self,
        key: &'a PaymentHash,
    ) -> BoxFuture<'a, Result<Option<InvoiceMetadata>, StoreError>> {
        match self {
            Self::Memory(store) => store.get(key),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(store) => store.get(key),
        }
    }

    fn mark_used<'a>(&'a self, key: &'a PaymentHash) -> BoxFuture<'a, Result<bool, StoreError>> {
        match self {
            Self::Memory(store) => store.mark_used(key),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(store) => store.mark_used(key),
        }
    }
}
