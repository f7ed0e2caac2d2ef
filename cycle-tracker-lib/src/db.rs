//src/db.rs
use rusqlite::{Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DB_FILE_NAME: &str = "history.sqlite";
const APP_DATA_DIR: &str = "cycle-tracker";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// Custom Error type for storage operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database connection failed: {0}")]
    Connection(#[source] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Database query failed: {0}")]
    QueryFailed(#[source] rusqlite::Error),
    #[error("Database update failed: {0}")]
    UpdateFailed(#[source] rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(#[source] rusqlite::Error),
    #[error("Database is busy: {0}")]
    Busy(#[source] rusqlite::Error),
    #[error("An active history entry already exists for user '{user_id}' and workout '{workout_id}'")]
    DuplicateActiveEntry { user_id: String, workout_id: String },
    #[error("Workout '{0}' already exists")]
    WorkoutExists(String),
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

impl Error {
    /// Conflicts are expected under concurrent writers and safe to retry.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::DuplicateActiveEntry { .. })
    }

    /// Sorts a raw rusqlite error into busy or the given failure kind.
    pub(crate) fn classify(e: rusqlite::Error, otherwise: fn(rusqlite::Error) -> Self) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::Busy(e),
            _ => otherwise(e),
        }
    }
}

/// Gets the path to the SQLite database file within the app's data directory.
pub fn get_db_path() -> Result<PathBuf, Error> {
    let data_dir = dirs::data_dir().ok_or(Error::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to a database file, tuned for several concurrent writers.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path).map_err(Error::Connection)?;
    // WAL lets readers proceed while one connection holds the write lock
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(Error::Connection)?;
    debug!(journal_mode = %mode, "opened database");
    configure(&conn)?;
    Ok(conn)
}

/// Opens a private in-memory database, mostly for tests.
pub fn open_in_memory() -> Result<Connection, Error> {
    let conn = Connection::open_in_memory().map_err(Error::Connection)?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<(), Error> {
    conn.busy_timeout(BUSY_TIMEOUT).map_err(Error::Connection)?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(Error::Connection)?;
    Ok(())
}

/// Initializes the database tables if they don't exist.
pub fn init_db(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS workouts (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS plan_sets (
            workout_id TEXT NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
            set_id TEXT NOT NULL,
            name TEXT,
            exercise_id TEXT NOT NULL,
            exercise_name TEXT,
            target_kind TEXT NOT NULL CHECK(target_kind IN ('reps', 'duration')),
            target_value INTEGER NOT NULL CHECK(target_value > 0),
            target_weight REAL,
            PRIMARY KEY (workout_id, set_id)
        );

        CREATE TABLE IF NOT EXISTS plan_days (
            workout_id TEXT NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
            day_index INTEGER NOT NULL,
            day_name TEXT NOT NULL,
            is_rest_day INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (workout_id, day_index)
        );

        CREATE TABLE IF NOT EXISTS plan_day_sets (
            workout_id TEXT NOT NULL,
            day_index INTEGER NOT NULL,
            position INTEGER NOT NULL,
            set_id TEXT NOT NULL,
            PRIMARY KEY (workout_id, day_index, position),
            FOREIGN KEY (workout_id, day_index) REFERENCES plan_days(workout_id, day_index) ON DELETE CASCADE,
            FOREIGN KEY (workout_id, set_id) REFERENCES plan_sets(workout_id, set_id)
        );

        CREATE TABLE IF NOT EXISTS user_workouts (
            user_id TEXT NOT NULL,
            workout_id TEXT NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            assigned_at TEXT NOT NULL,
            PRIMARY KEY (user_id, workout_id)
        );

        CREATE TABLE IF NOT EXISTS history_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            workout_id TEXT NOT NULL,
            current_day_index INTEGER NOT NULL CHECK(current_day_index >= 0),
            day_name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            finished_at TEXT
        );

        CREATE TABLE IF NOT EXISTS exercise_sets (
            history_id INTEGER NOT NULL REFERENCES history_entries(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            set_id TEXT NOT NULL,
            set_name TEXT,
            exercise_id TEXT NOT NULL,
            exercise_name TEXT,
            target_kind TEXT NOT NULL CHECK(target_kind IN ('reps', 'duration')),
            target_value INTEGER NOT NULL,
            target_weight REAL,
            completed_reps INTEGER NOT NULL DEFAULT 0,
            completed_duration_sec INTEGER NOT NULL DEFAULT 0,
            is_complete INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            PRIMARY KEY (history_id, position),
            UNIQUE (history_id, set_id)
        );

        -- One active sheet per user and plan
        CREATE UNIQUE INDEX IF NOT EXISTS idx_history_one_active
            ON history_entries(user_id, workout_id) WHERE is_active = 1;
        CREATE INDEX IF NOT EXISTS idx_history_user_workout
            ON history_entries(user_id, workout_id, id);
        CREATE INDEX IF NOT EXISTS idx_user_workouts_position
            ON user_workouts(user_id, position);",
    )
    .map_err(Error::Connection)?;
    debug!("database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'history_entries'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn only_busy_and_duplicates_are_conflicts() {
        let dup = Error::DuplicateActiveEntry {
            user_id: "u".into(),
            workout_id: "w".into(),
        };
        assert!(dup.is_conflict());
        assert!(!Error::DataDir.is_conflict());
    }
}
