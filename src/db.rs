// SQLite store setup: connection handle and schema migrations
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::storage::{default_database_path, StorageError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Record {0} not found")]
    NotFound(i64),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Schema version the migrations below produce.
pub const SCHEMA_VERSION: i64 = 2;

// Thread-safe store handle; clone it freely across threads
pub struct TripStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) path: Option<PathBuf>,
}

impl TripStore {
    /// Open (or create) the store at `path` and bring it to the latest
    /// schema. Any failure to open or migrate surfaces as `Unavailable`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let store = open_file(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;

        log::info!(
            "trip store open at {} (schema v{})",
            path.display(),
            SCHEMA_VERSION
        );
        Ok(store)
    }

    /// Open the store at its default location in the platform data directory.
    pub fn open_default() -> StoreResult<Self> {
        Self::open(default_database_path()?)
    }

    /// Ephemeral in-memory store.
    pub fn in_memory() -> StoreResult<Self> {
        open_memory().map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Database file path; `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Clone for TripStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            path: self.path.clone(),
        }
    }
}

fn open_file(path: &Path) -> StoreResult<TripStore> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;

    // WAL so a background export can read while the main handle writes
    conn.pragma_update(None, "journal_mode", "WAL")?;

    from_connection(conn, Some(path.to_path_buf()))
}

fn open_memory() -> StoreResult<TripStore> {
    let conn = Connection::open_in_memory()?;
    from_connection(conn, None)
}

fn from_connection(conn: Connection, path: Option<PathBuf>) -> StoreResult<TripStore> {
    conn.busy_timeout(Duration::from_secs(5))?;
    run_migrations(&conn)?;

    Ok(TripStore {
        conn: Arc::new(Mutex::new(conn)),
        path,
    })
}

struct Migration {
    version: i64,
    apply: fn(&Connection) -> StoreResult<()>,
}

// Ordered migration steps; each is idempotent and recorded once applied
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        apply: migration_v1,
    },
    Migration {
        version: 2,
        apply: migration_v2,
    },
];

fn run_migrations(conn: &Connection) -> StoreResult<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Get current version
    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply whatever is newer than the recorded version
    for migration in MIGRATIONS {
        if current_version < migration.version {
            (migration.apply)(conn)?;
            conn.execute(
                "INSERT INTO schema_migrations (version) VALUES (?1)",
                [migration.version],
            )?;
            log::info!("applied schema migration v{}", migration.version);
        }
    }

    Ok(())
}

fn migration_v1(conn: &Connection) -> StoreResult<()> {
    // Waypoints table; AUTOINCREMENT so deleted ids are never reused
    conn.execute(
        "CREATE TABLE IF NOT EXISTS waypoints (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            altitude REAL,
            notes TEXT,
            image_data_url TEXT,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Create index on created_at for newest-first scans
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_waypoints_created_at ON waypoints(created_at DESC)",
        [],
    )?;

    Ok(())
}

fn migration_v2(conn: &Connection) -> StoreResult<()> {
    // Routes table; geometry is a JSON array of [lon, lat(, alt)] positions
    conn.execute(
        "CREATE TABLE IF NOT EXISTS routes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            geometry TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Create index on created_at for newest-first scans
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_routes_created_at ON routes(created_at DESC)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_init() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        // Verify tables exist
        let table_count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('waypoints', 'routes', 'schema_migrations')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table_count, 3);

        // Both created_at indexes exist
        let index_count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name IN ('idx_waypoints_created_at', 'idx_routes_created_at')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index_count, 2);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(recorded, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_migration_list_ends_at_schema_version() {
        assert_eq!(
            MIGRATIONS.last().map(|m| m.version),
            Some(SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_legacy_v1_store_gains_routes() {
        // Build a database as it looked before routes existed
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .unwrap();
        migration_v1(&conn).unwrap();
        conn.execute("INSERT INTO schema_migrations (version) VALUES (1)", [])
            .unwrap();
        conn.execute(
            "INSERT INTO waypoints (name, latitude, longitude, created_at)
             VALUES ('Old cabin', 61.1, 8.5, 1600000000000)",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let routes_table: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='routes'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(routes_table, 1);

        let route_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM routes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(route_count, 0);

        // Existing data untouched
        let name: String = conn
            .query_row("SELECT name FROM waypoints WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(name, "Old cabin");

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_in_memory_store_opens() {
        let store = TripStore::in_memory().unwrap();
        assert!(store.path().is_none());

        let count: i64 = store
            .lock()
            .query_row("SELECT COUNT(*) FROM waypoints", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
