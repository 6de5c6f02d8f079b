use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::{RecordStore, StoreError};
use crate::BoxFuture;
use crate::metadata::InvoiceMetadata;
use crate::preimage::PaymentHash;

/// Database file used when no path is configured.
pub const DEFAULT_DB_PATH: &str = "ln402.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent record store backed by SQLite. Survives restarts.
///
/// Records live in `invoice_metadata(key TEXT PRIMARY KEY, value BLOB)`, keyed
/// by hex payment hash, with the JSON encoding of [`InvoiceMetadata`] as value.
/// Every call runs on Tokio's blocking pool. `mark_used` takes an immediate
/// write transaction, so the check-and-set also holds between processes
/// sharing one file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`.
    ///
    /// On Unix the file permissions are restricted to 0600.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::init(&conn)?;

        #[cfg(unix)]
        restrict_permissions(path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS invoice_metadata (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );",
        )?;
        Ok(())
    }

    fn with_conn<T, F>(&self, f: F) -> BoxFuture<'static, Result<T, StoreError>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let mut conn = conn.lock().unwrap_or_else(|poisoned| {
                    tracing::error!("invoice store mutex poisoned, recovering");
                    poisoned.into_inner()
                });
                f(&mut conn)
            })
            .await?
        })
    }
}

/// Sets mode 0600 on the database file and its WAL sidecars.
#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let file = std::path::PathBuf::from(file);
        if suffix.is_empty() || file.exists() {
            if let Err(e) = std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o600)) {
                tracing::warn!(
                    path = %file.display(),
                    error = %e,
                    "failed to set invoice database file permissions to 0600"
                );
            }
        }
    }
}

impl RecordStore for SqliteStore {
    fn put<'a>(
        &'a self,
        key: &'a PaymentHash,
        value: &'a InvoiceMetadata,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let key = key.to_hex();
        let bytes = match value.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return Box::pin(std::future::ready(Err(e.into()))),
        };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO invoice_metadata (key, value) VALUES (?1, ?2)",
                params![key, bytes],
            )?;
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a PaymentHash,
    ) -> BoxFuture<'a, Result<Option<InvoiceMetadata>, StoreError>> {
        let key = key.to_hex();
        self.with_conn(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT value FROM invoice_metadata WHERE key = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(bytes.map(|b| InvoiceMetadata::from_bytes(&b)).transpose()?)
        })
    }

    fn mark_used<'a>(&'a self, key: &'a PaymentHash) -> BoxFuture<'a, Result<bool, StoreError>> {
        let key = key.to_hex();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let bytes: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT value FROM invoice_metadata WHERE key = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(bytes) = bytes else {
                return Ok(false);
            };
            let mut record = InvoiceMetadata::from_bytes(&bytes)?;
            if record.used {
                return Ok(false);
            }
            record.used = true;
            tx.execute(
                "UPDATE invoice_metadata SET value = ?2 WHERE key = ?1",
                params![key, record.to_bytes()?],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> InvoiceMetadata {
        InvoiceMetadata {
            implementation_id: "impl".into(),
            method: "GET".into(),
            path: "/ping".into(),
            used: false,
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_basic() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("test.db")).unwrap();
        let key = PaymentHash::from_bytes([0x42; 32]);

        assert!(store.get(&key).await.unwrap().is_none());
        store.put(&key, &record()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(record()));
    }

    #[tokio::test]
    async fn test_sqlite_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let key = PaymentHash::from_bytes([0xaa; 32]);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(&key, &record()).await.unwrap();
            assert!(store.mark_used(&key).await.unwrap());
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.get(&key).await.unwrap().unwrap();
        assert!(loaded.used);
        assert!(!store.mark_used(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_mark_used_missing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = PaymentHash::from_bytes([0x01; 32]);
        assert!(!store.mark_used(&key).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sqlite_two_handles_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();
        let key = PaymentHash::from_bytes([0x5a; 32]);
        first.put(&key, &record()).await.unwrap();

        let a = tokio::spawn({
            let store = first.clone();
            async move { store.mark_used(&key).await.unwrap() }
        });
        let b = tokio::spawn(async move { second.mark_used(&key).await.unwrap() });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b, "exactly one handle must win, got {a} and {b}");
    }

    #[tokio::test]
    async fn test_sqlite_rejects_corrupt_record() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = PaymentHash::from_bytes([0x0f; 32]);
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO invoice_metadata (key, value) VALUES (?1, ?2)",
                params![key.to_hex(), b"garbage".to_vec()],
            )
            .unwrap();
        }
        assert!(matches!(store.get(&key).await, Err(StoreError::Codec(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_sqlite_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mode.db");
        let _store = SqliteStore::open(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sqlite_wal_files_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.db");
        let store = SqliteStore::open(&path).unwrap();
        store
            .put(&PaymentHash::from_bytes([0x33; 32]), &record())
            .await
            .unwrap();

        for sidecar in ["wal.db-wal", "wal.db-shm"] {
            let file = dir.path().join(sidecar);
            assert!(file.exists(), "{sidecar} missing");
            let mode = std::fs::metadata(&file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{sidecar}");
        }
    }
}
