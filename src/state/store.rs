use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::data::PhotoRecord;
use crate::error::StoreError;

/// A durable string-to-string store
///
/// The workflow only ever calls `set` with one fixed key; `get` and `remove`
/// exist for read-back and maintenance.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Serialize a record and write it under `key`, replacing any previous one
pub async fn persist(
    store: &dyn KeyValueStore,
    key: &str,
    record: &PhotoRecord,
) -> Result<(), StoreError> {
    let json = record.to_json()?;
    store.set(key, &json).await
}

/// Read back the record stored under `key`, if any
pub async fn load_record(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<PhotoRecord>, StoreError> {
    match store.get(key).await? {
        Some(json) => Ok(Some(PhotoRecord::from_json(&json)?)),
        None => Ok(None),
    }
}

/// Key-value store backed by a single SQLite table.
///
/// The database file is created in the user's data directory by default:
/// - Linux: ~/.local/share/photo-capture/photo_capture.db
/// - macOS: ~/Library/Application Support/photo-capture/photo_capture.db
/// - Windows: %APPDATA%\photo-capture\photo_capture.db
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the store at `db_path` and initialize the schema
    pub fn open(db_path: PathBuf) -> Result<Self, StoreError> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        init_schema(&conn)?;

        info!("📁 Record store initialized at: {}", db_path.display());

        Ok(SqliteStore { db_path })
    }

    /// Get the default path where the database should be stored
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::data_dir().or_else(dirs::home_dir)?;
        path.push("photo-capture");
        path.push("photo_capture.db");
        Some(path)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run a statement on a fresh connection in a blocking task
    ///
    /// rusqlite::Connection is not Sync, so every operation opens its own.
    async fn with_connection<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let conn = Connection::open(&db_path)?;
            Ok(op(&conn)?)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

/// Create the key-value table if it doesn't exist
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key             TEXT PRIMARY KEY,
            value           TEXT NOT NULL,
            updated_at      INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        debug!(key = %key, bytes = value.len(), "Writing record");

        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", [&key], |row| row.get(0))
                .optional()
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [&key])?;
            Ok(())
        })
        .await
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::Coordinate;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("nested").join("store.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let (dir, store) = test_store();
        assert!(store.path().exists());
        assert!(dir.path().join("nested").is_dir());
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (_dir, store) = test_store();
        assert_eq!(store.get("photoData").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let (_dir, store) = test_store();

        store.set("photoData", "one").await.unwrap();
        store.set("photoData", "two").await.unwrap();

        assert_eq!(store.get("photoData").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_dir, store) = test_store();

        store.set("photoData", "value").await.unwrap();
        store.remove("photoData").await.unwrap();
        store.remove("photoData").await.unwrap();

        assert_eq!(store.get("photoData").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let record = PhotoRecord {
            image: "file:///tmp/a.jpg".to_string(),
            location: Some(Coordinate::new(-33.8568, 151.2153)),
            date_taken: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        };

        {
            let store = SqliteStore::open(path.clone()).unwrap();
            persist(&store, "photoData", &record).await.unwrap();
        }

        let reopened = SqliteStore::open(path).unwrap();
        let loaded = load_record(&reopened, "photoData").await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_a_json_error() {
        let (_dir, store) = test_store();
        store.set("photoData", "not json").await.unwrap();

        let err = load_record(&store, "photoData").await.unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
    }
}
