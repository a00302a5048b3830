//! Read-only access to a downloaded game database snapshot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

/// Busy timeout for snapshot connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
#[error("failed to open snapshot {}: {source}", path.display())]
pub struct SnapshotOpenError {
    pub path: PathBuf,
    #[source]
    pub source: rusqlite::Error,
}

/// Open the snapshot at `path` read-only.
///
/// # Errors
///
/// Returns an error if the file is missing or is not a SQLite database.
pub fn open_snapshot(path: &Path) -> Result<Connection, SnapshotOpenError> {
    let open_error = |source| SnapshotOpenError {
        path: path.to_path_buf(),
        source,
    };

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(open_error)?;

    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT).map_err(open_error)?;
    // Opening is lazy; touch the schema so a non-database file fails here.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(open_error)?;

    Ok(conn)
}
