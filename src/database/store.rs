use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::database::digests::DigestStore;
use crate::database::paths::PathIndex;
use crate::database::schema::{SCHEMA, SCHEMA_VERSION};
use crate::database::tags::TagGraph;
use crate::error::{CacheError, Result};

/// Handle on the cache database.
///
/// Created once per process and passed by reference to whatever needs the
/// store. Component views (`digests`, `paths`, `tags`) borrow its connection;
/// batched writers take a [`Transaction`] and build the same views over it.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    location: Option<PathBuf>,
}

impl Store {
    /// Open the cache at `path`, creating and initializing it if the file does
    /// not exist yet.
    ///
    /// An existing file without the cache schema is reported as
    /// [`CacheError::StoreUninitialized`] rather than silently initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Self::init(path);
        }
        let store = Self::connect(path)?;
        if !store.is_initialized()? {
            return Err(CacheError::StoreUninitialized(path.to_path_buf()));
        }
        debug!("Opened cache {:?}", path);
        Ok(store)
    }

    /// Create the cache schema at `path`. Safe on an already initialized cache.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing cache {:?}", path);
        let store = Self::connect(path)?;
        store.initialize()?;
        Ok(store)
    }

    /// A private, initialized cache that lives as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self { conn, location: None };
        store.initialize()?;
        Ok(store)
    }

    fn connect(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Cache journal mode {}", mode);
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn, location: Some(path.to_path_buf()) })
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
            params!["schema_version", SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn is_initialized(&self) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'digest'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| row.get(0))
            .optional()?)
    }

    /// Where the cache lives on disk, `None` for in-memory stores.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    pub fn digests(&self) -> DigestStore<'_> {
        DigestStore::new(&self.conn)
    }

    pub fn paths(&self) -> PathIndex<'_> {
        PathIndex::new(&self.conn)
    }

    pub fn tags(&self) -> TagGraph<'_> {
        TagGraph::new(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn open_creates_missing_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.location(), Some(path.as_path()));
        assert_eq!(store.schema_version().unwrap().as_deref(), Some(SCHEMA_VERSION));
        drop(store);

        // and reopens it without complaint
        let store = Store::open(&path).unwrap();
        assert_eq!(store.digests().count().unwrap(), 0);
    }

    #[test]
    fn empty_file_is_uninitialized_until_init() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        fs::write(&path, b"").unwrap();

        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, CacheError::StoreUninitialized(ref p) if p == &path));

        Store::init(&path).unwrap();
        assert!(Store::open(&path).is_ok());
    }

    #[test]
    fn garbage_file_is_unavailable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        fs::write(&path, vec![0xAB; 4096]).unwrap();
        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, CacheError::StoreUnavailable(_)), "{err:?}");
    }

    #[test]
    fn in_memory_store_enforces_foreign_keys() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.location(), None);
        let err = store
            .connection()
            .execute(
                "INSERT INTO path (id, real, digest_id) VALUES ('/a', '/a', 'nope')",
                [],
            )
            .unwrap_err();
        assert!(matches!(CacheError::from(err), CacheError::ConstraintViolation(_)));
    }
}
