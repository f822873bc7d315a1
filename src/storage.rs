// Database location, whole-store deletion and storage accounting
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::db::{StoreResult, TripStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Get the app data directory for the trip store.
pub fn app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    let waymark_dir = data_dir.join("waymark");
    fs::create_dir_all(&waymark_dir)?;
    Ok(waymark_dir)
}

/// Default database file location inside the app data directory.
pub fn default_database_path() -> StorageResult<PathBuf> {
    Ok(app_data_dir()?.join("waymark.db"))
}

/// Delete the whole database: close the handle and remove its files.
///
/// Consumes the store. Remaining clones of the handle keep the engine
/// open until they drop; deletion of the files still proceeds. No-op
/// for in-memory stores.
pub fn delete_database(store: TripStore) -> StoreResult<()> {
    let TripStore { conn, path } = store;

    match Arc::try_unwrap(conn) {
        Ok(mutex) => {
            let conn = mutex
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err((_, e)) = conn.close() {
                log::warn!("closing database before deletion failed: {e}");
            }
        }
        Err(_) => log::warn!("database handle still shared; deleting files without closing"),
    }

    let path = match path {
        Some(path) => path,
        None => return Ok(()),
    };

    remove_file_if_exists(&path)?;
    // Journal side files, depending on journaling mode
    remove_file_if_exists(&sibling(&path, "-wal"))?;
    remove_file_if_exists(&sibling(&path, "-shm"))?;
    remove_file_if_exists(&sibling(&path, "-journal"))?;

    log::info!("deleted database at {}", path.display());
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Storage usage snapshot, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageEstimate {
    pub usage: u64,
    pub quota: u64,
}

/// Estimate current usage and the engine's configured ceiling.
pub fn get_storage_estimate(store: &TripStore) -> StoreResult<StorageEstimate> {
    let conn = store.lock();

    let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
    let max_page_count: i64 = conn.query_row("PRAGMA max_page_count", [], |row| row.get(0))?;

    Ok(StorageEstimate {
        usage: (page_count * page_size) as u64,
        quota: (max_page_count * page_size) as u64,
    })
}
