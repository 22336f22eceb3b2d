//! Opening and configuring SQLite connections.
//!
//! Every repository operation opens its own short-lived connection; the
//! helpers here make each one durable (WAL, `synchronous=NORMAL`),
//! enforce foreign keys, restrict the file to its owner and bring the
//! schema up to date before use.

use super::migrations;
use crate::task::ports::{TaskRepositoryError, TaskRepositoryResult};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use std::io;
use std::path::Path;
use tracing::debug;

/// Owner read/write only.
#[cfg(unix)]
const DATABASE_FILE_MODE: u32 = 0o600;

/// Milliseconds a writer waits for a competing process to release the lock.
const BUSY_TIMEOUT_MS: u32 = 5_000;

#[derive(QueryableByName)]
struct JournalModeRow {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}

/// Opens a fully configured and migrated connection to the database file.
///
/// The file and its parent directory are created when missing.
///
/// # Errors
///
/// Returns [`TaskRepositoryError::Connection`] when the file cannot be
/// opened or configured, and [`TaskRepositoryError::Migration`] when the
/// schema cannot be brought up to date.
pub fn open_connection(path: &Path) -> TaskRepositoryResult<SqliteConnection> {
    let mut connection = establish(path)?;
    migrations::migrate_schema(&mut connection)?;
    Ok(connection)
}

/// Opens and configures a connection without migrating the schema.
///
/// # Errors
///
/// Returns [`TaskRepositoryError::Connection`] when the file cannot be
/// opened, WAL mode cannot be enabled, or permissions cannot be set.
pub fn establish(path: &Path) -> TaskRepositoryResult<SqliteConnection> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(TaskRepositoryError::connection)?;
    }

    let url = path.to_str().ok_or_else(|| {
        TaskRepositoryError::connection(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("database path is not valid UTF-8: {}", path.display()),
        ))
    })?;

    create_database_file(path)?;
    let mut connection =
        SqliteConnection::establish(url).map_err(TaskRepositoryError::connection)?;
    configure(&mut connection)?;
    restrict_permissions(path)?;
    debug!(path = %path.display(), "opened task database");
    Ok(connection)
}

fn configure(connection: &mut SqliteConnection) -> TaskRepositoryResult<()> {
    connection
        .batch_execute(&format!(
            "PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;"
        ))
        .map_err(TaskRepositoryError::connection)?;

    let mode = diesel::sql_query("PRAGMA journal_mode")
        .get_result::<JournalModeRow>(connection)
        .map_err(TaskRepositoryError::connection)?;
    if !mode.journal_mode.eq_ignore_ascii_case("wal") {
        return Err(TaskRepositoryError::connection(io::Error::other(format!(
            "failed to enable WAL mode, journal mode is {}",
            mode.journal_mode
        ))));
    }
    Ok(())
}

/// Creates the file owner-only so SQLite never creates it with the umask.
#[cfg(unix)]
fn create_database_file(path: &Path) -> TaskRepositoryResult<()> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(DATABASE_FILE_MODE)
        .open(path)
        .map(drop)
        .map_err(TaskRepositoryError::connection)
}

#[cfg(not(unix))]
const fn create_database_file(_path: &Path) -> TaskRepositoryResult<()> {
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> TaskRepositoryResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(DATABASE_FILE_MODE))
        .map_err(TaskRepositoryError::connection)?;

    // WAL side files inherit the umask; tighten them when present.
    for suffix in ["-wal", "-shm"] {
        let mut side_file = path.as_os_str().to_owned();
        side_file.push(suffix);
        let side_path = Path::new(&side_file);
        if side_path.exists() {
            std::fs::set_permissions(
                side_path,
                std::fs::Permissions::from_mode(DATABASE_FILE_MODE),
            )
            .map_err(TaskRepositoryError::connection)?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
const fn restrict_permissions(_path: &Path) -> TaskRepositoryResult<()> {
    Ok(())
}
