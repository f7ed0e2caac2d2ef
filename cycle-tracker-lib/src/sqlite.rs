//src/sqlite.rs
//! SQLite implementation of the plan and history stores.
//!
//! Each store instance owns one connection. Several instances may point at the
//! same database file; the conditional writes run in IMMEDIATE transactions so
//! SQLite's write lock is taken before anything is read.
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{
    named_params, params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::path::Path;
use tracing::debug;

use crate::db::{self, Error};
use crate::model::{
    Day, ExerciseSet, HistoryEntry, NewHistoryEntry, PlanSet, Target, TargetKind, Workout,
};
use crate::store::{HistoryStore, PlanStore, Replace, SetUpdate, SetWrite};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (and if needed creates) the database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conn = db::open_db(path)?;
        db::init_db(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self, Error> {
        let conn = db::open_in_memory()?;
        db::init_db(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Wraps a connection whose schema is already initialized.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Stores a complete plan. Plans are never modified afterwards.
    /// # Errors
    /// `Error::WorkoutExists` if the id is taken.
    pub fn import_workout(&self, workout: &Workout) -> Result<(), Error> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::classify(e, Error::Connection))?;
        insert_workout_rows(&tx, workout)?;
        tx.commit()
            .map_err(|e| Error::classify(e, Error::Connection))?;
        debug!(workout_id = %workout.workout_id, days = workout.weekly_plan.len(), "imported workout");
        Ok(())
    }

    /// Stores a plan and assigns it to the user in one transaction, so a
    /// failed assignment leaves no orphaned plan behind.
    /// # Errors
    /// `Error::WorkoutExists` if the id is taken.
    pub fn import_and_assign(&self, workout: &Workout, user_id: &str) -> Result<(), Error> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::classify(e, Error::Connection))?;
        insert_workout_rows(&tx, workout)?;
        insert_assignment(&tx, user_id, &workout.workout_id)?;
        tx.commit()
            .map_err(|e| Error::classify(e, Error::Connection))?;
        debug!(user_id, workout_id = %workout.workout_id, "imported and assigned workout");
        Ok(())
    }

    /// Appends a workout to the user's assignment list. Re-assigning is a no-op.
    pub fn assign_workout(&self, user_id: &str, workout_id: &str) -> Result<(), Error> {
        let conn = self.conn.lock();
        insert_assignment(&conn, user_id, workout_id)
    }

    /// Workout ids assigned to the user, earliest first.
    pub fn assigned_workouts(&self, user_id: &str) -> Result<Vec<String>, Error> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT workout_id FROM user_workouts WHERE user_id = ?1 ORDER BY position, assigned_at")
            .map_err(Error::QueryFailed)?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))
            .map_err(Error::QueryFailed)?;
        ids.collect::<Result<Vec<String>, _>>()
            .map_err(Error::QueryFailed)
    }
}

impl PlanStore for SqliteStore {
    fn get_workout(&self, workout_id: &str) -> Result<Option<Workout>, Error> {
        let conn = self.conn.lock();
        load_workout(&conn, workout_id)
    }

    fn earliest_workout_for_user(&self, user_id: &str) -> Result<Option<Workout>, Error> {
        let conn = self.conn.lock();
        let workout_id: Option<String> = conn
            .query_row(
                "SELECT workout_id FROM user_workouts WHERE user_id = ?1 ORDER BY position, assigned_at LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::classify(e, Error::QueryFailed))?;
        match workout_id {
            Some(id) => load_workout(&conn, &id),
            None => Ok(None),
        }
    }
}

impl HistoryStore for SqliteStore {
    fn get_active_entry(
        &self,
        user_id: &str,
        workout_id: &str,
    ) -> Result<Option<HistoryEntry>, Error> {
        let mut conn = self.conn.lock();
        let tx = read_snapshot(&mut conn)?;
        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM history_entries WHERE user_id = ?1 AND workout_id = ?2 AND is_active = 1",
                params![user_id, workout_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::classify(e, Error::QueryFailed))?;
        match id {
            Some(id) => load_entry(&tx, id),
            None => Ok(None),
        }
    }

    fn get_entry(&self, history_id: i64) -> Result<Option<HistoryEntry>, Error> {
        let mut conn = self.conn.lock();
        let tx = read_snapshot(&mut conn)?;
        load_entry(&tx, history_id)
    }

    fn list_entries(&self, user_id: &str, workout_id: &str) -> Result<Vec<HistoryEntry>, Error> {
        let mut conn = self.conn.lock();
        let tx = read_snapshot(&mut conn)?;
        let ids = {
            let mut stmt = tx
                .prepare("SELECT id FROM history_entries WHERE user_id = ?1 AND workout_id = ?2 ORDER BY id ASC")
                .map_err(Error::QueryFailed)?;
            let rows = stmt
                .query_map(params![user_id, workout_id], |row| row.get::<_, i64>(0))
                .map_err(|e| Error::classify(e, Error::QueryFailed))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(Error::QueryFailed)?
        };
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            entries.push(load_entry(&tx, id)?.ok_or_else(|| vanished(id))?);
        }
        Ok(entries)
    }

    fn latest_terminal_entry(
        &self,
        user_id: &str,
        workout_id: &str,
    ) -> Result<Option<HistoryEntry>, Error> {
        let mut conn = self.conn.lock();
        let tx = read_snapshot(&mut conn)?;
        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM history_entries WHERE user_id = ?1 AND workout_id = ?2 AND is_active = 0
                 ORDER BY id DESC LIMIT 1",
                params![user_id, workout_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::classify(e, Error::QueryFailed))?;
        match id {
            Some(id) => load_entry(&tx, id),
            None => Ok(None),
        }
    }

    fn insert_entry(&self, entry: &NewHistoryEntry) -> Result<HistoryEntry, Error> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::classify(e, Error::Connection))?;
        let id = insert_entry_rows(&tx, entry, Utc::now())?;
        let stored = load_entry(&tx, id)?.ok_or_else(|| vanished(id))?;
        tx.commit()
            .map_err(|e| Error::classify(e, Error::Connection))?;
        Ok(stored)
    }

    fn conditional_update_set(
        &self,
        history_id: i64,
        set_id: &str,
        update: &SetUpdate,
        expected_is_complete: bool,
    ) -> Result<SetWrite, Error> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::classify(e, Error::Connection))?;

        let changed = match update {
            SetUpdate::Progress {
                completed_reps,
                completed_duration_sec,
            } => tx.execute(
                "UPDATE exercise_sets
                 SET completed_reps = COALESCE(:reps, completed_reps),
                     completed_duration_sec = COALESCE(:duration, completed_duration_sec)
                 WHERE history_id = :hid AND set_id = :set_id AND is_complete = :expected
                   AND EXISTS (SELECT 1 FROM history_entries WHERE id = :hid AND is_active = 1)",
                named_params! {
                    ":reps": completed_reps,
                    ":duration": completed_duration_sec,
                    ":hid": history_id,
                    ":set_id": set_id,
                    ":expected": expected_is_complete,
                },
            ),
            SetUpdate::Complete {
                at,
                floor_reps,
                floor_duration_sec,
            } => tx.execute(
                "UPDATE exercise_sets
                 SET is_complete = 1,
                     completed_at = :at,
                     completed_reps = MAX(completed_reps, COALESCE(:floor_reps, completed_reps)),
                     completed_duration_sec = MAX(completed_duration_sec, COALESCE(:floor_duration, completed_duration_sec))
                 WHERE history_id = :hid AND set_id = :set_id AND is_complete = :expected
                   AND EXISTS (SELECT 1 FROM history_entries WHERE id = :hid AND is_active = 1)",
                named_params! {
                    ":at": at,
                    ":floor_reps": floor_reps,
                    ":floor_duration": floor_duration_sec,
                    ":hid": history_id,
                    ":set_id": set_id,
                    ":expected": expected_is_complete,
                },
            ),
        }
        .map_err(|e| Error::classify(e, Error::UpdateFailed))?;

        if changed == 0 {
            // Nothing written; the transaction rolls back on drop
            let outcome = match entry_is_active(&tx, history_id)? {
                None => SetWrite::Missing,
                Some(false) => SetWrite::EntryTerminal,
                Some(true) => {
                    let exists: Option<bool> = tx
                        .query_row(
                            "SELECT is_complete FROM exercise_sets WHERE history_id = ?1 AND set_id = ?2",
                            params![history_id, set_id],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(|e| Error::classify(e, Error::QueryFailed))?;
                    if exists.is_some() {
                        SetWrite::StateMismatch
                    } else {
                        SetWrite::Missing
                    }
                }
            };
            return Ok(outcome);
        }

        tx.execute(
            "UPDATE history_entries SET version = version + 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now(), history_id],
        )
        .map_err(|e| Error::classify(e, Error::UpdateFailed))?;
        let entry = load_entry(&tx, history_id)?.ok_or_else(|| vanished(history_id))?;
        tx.commit()
            .map_err(|e| Error::classify(e, Error::Connection))?;
        Ok(SetWrite::Applied(entry))
    }

    fn conditional_replace_if_all_complete(
        &self,
        history_id: i64,
        next: &NewHistoryEntry,
    ) -> Result<Replace, Error> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::classify(e, Error::Connection))?;
        let now = Utc::now();

        let retired = tx
            .execute(
                "UPDATE history_entries
                 SET is_active = 0, finished_at = :now, updated_at = :now, version = version + 1
                 WHERE id = :hid AND is_active = 1
                   AND NOT EXISTS (SELECT 1 FROM exercise_sets WHERE history_id = :hid AND is_complete = 0)",
                named_params! { ":now": now, ":hid": history_id },
            )
            .map_err(|e| Error::classify(e, Error::UpdateFailed))?;

        if retired == 0 {
            return Ok(match entry_is_active(&tx, history_id)? {
                None => Replace::Missing,
                Some(false) => Replace::AlreadyTerminal,
                Some(true) => Replace::NotAllComplete,
            });
        }

        let next_id = insert_entry_rows(&tx, next, now)?;
        let stored = load_entry(&tx, next_id)?.ok_or_else(|| vanished(next_id))?;
        tx.commit()
            .map_err(|e| Error::classify(e, Error::Connection))?;
        Ok(Replace::Replaced(stored))
    }
}

fn insert_workout_rows(tx: &Connection, workout: &Workout) -> Result<(), Error> {
    if let Err(e) = tx.execute(
        "INSERT INTO workouts (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![workout.workout_id, workout.name, Utc::now()],
    ) {
        if let rusqlite::Error::SqliteFailure(ref err, _) = e {
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                return Err(Error::WorkoutExists(workout.workout_id.clone()));
            }
        }
        return Err(Error::classify(e, Error::InsertFailed));
    }

    for set in &workout.sets {
        tx.execute(
            "INSERT INTO plan_sets (workout_id, set_id, name, exercise_id, exercise_name, target_kind, target_value, target_weight)
             VALUES (:workout, :set_id, :name, :exercise_id, :exercise_name, :kind, :value, :weight)",
            named_params! {
                ":workout": workout.workout_id,
                ":set_id": set.set_id,
                ":name": set.name,
                ":exercise_id": set.exercise_id,
                ":exercise_name": set.exercise_name,
                ":kind": set.target.kind().to_string(),
                ":value": set.target.value(),
                ":weight": set.target_weight,
            },
        )
        .map_err(|e| Error::classify(e, Error::InsertFailed))?;
    }

    for (day_index, day) in workout.weekly_plan.iter().enumerate() {
        let day_index = to_sql_index(day_index)?;
        tx.execute(
            "INSERT INTO plan_days (workout_id, day_index, day_name, is_rest_day) VALUES (?1, ?2, ?3, ?4)",
            params![workout.workout_id, day_index, day.day_name, day.is_rest_day],
        )
        .map_err(|e| Error::classify(e, Error::InsertFailed))?;
        for (position, set_id) in day.set_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO plan_day_sets (workout_id, day_index, position, set_id) VALUES (?1, ?2, ?3, ?4)",
                params![workout.workout_id, day_index, to_sql_index(position)?, set_id],
            )
            .map_err(|e| Error::classify(e, Error::InsertFailed))?;
        }
    }
    Ok(())
}

fn insert_assignment(conn: &Connection, user_id: &str, workout_id: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO user_workouts (user_id, workout_id, position, assigned_at)
         VALUES (:user, :workout,
                 (SELECT COALESCE(MAX(position), -1) + 1 FROM user_workouts WHERE user_id = :user),
                 :now)",
        named_params! { ":user": user_id, ":workout": workout_id, ":now": Utc::now() },
    )
    .map_err(|e| Error::classify(e, Error::InsertFailed))?;
    Ok(())
}

// Multi-statement reads share one snapshot
fn read_snapshot(conn: &mut Connection) -> Result<Transaction<'_>, Error> {
    conn.transaction_with_behavior(TransactionBehavior::Deferred)
        .map_err(|e| Error::classify(e, Error::Connection))
}

fn vanished(history_id: i64) -> Error {
    Error::CorruptRow {
        table: "history_entries",
        reason: format!("entry {history_id} disappeared mid-transaction"),
    }
}

fn to_sql_index(index: usize) -> Result<i64, Error> {
    i64::try_from(index).map_err(|_| Error::CorruptRow {
        table: "plan_days",
        reason: format!("index {index} out of range"),
    })
}

fn entry_is_active(conn: &Connection, history_id: i64) -> Result<Option<bool>, Error> {
    conn.query_row(
        "SELECT is_active FROM history_entries WHERE id = ?1",
        params![history_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| Error::classify(e, Error::QueryFailed))
}

fn insert_entry_rows(
    conn: &Connection,
    entry: &NewHistoryEntry,
    now: DateTime<Utc>,
) -> Result<i64, Error> {
    let inserted = conn.execute(
        "INSERT INTO history_entries (user_id, workout_id, current_day_index, day_name, is_active, version, created_at, updated_at)
         VALUES (:user, :workout, :day_index, :day_name, 1, 0, :now, :now)",
        named_params! {
            ":user": entry.user_id,
            ":workout": entry.workout_id,
            ":day_index": to_sql_index(entry.current_day_index)?,
            ":day_name": entry.day_name,
            ":now": now,
        },
    );
    if let Err(e) = inserted {
        if let rusqlite::Error::SqliteFailure(ref err, _) = e {
            // The partial unique index on active entries is the only constraint here
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                return Err(Error::DuplicateActiveEntry {
                    user_id: entry.user_id.clone(),
                    workout_id: entry.workout_id.clone(),
                });
            }
        }
        return Err(Error::classify(e, Error::InsertFailed));
    }
    let history_id = conn.last_insert_rowid();

    for (position, set) in entry.sets.iter().enumerate() {
        conn.execute(
            "INSERT INTO exercise_sets (history_id, position, set_id, set_name, exercise_id, exercise_name,
                                        target_kind, target_value, target_weight,
                                        completed_reps, completed_duration_sec, is_complete, completed_at)
             VALUES (:hid, :position, :set_id, :set_name, :exercise_id, :exercise_name,
                     :kind, :value, :weight, :reps, :duration, :complete, :completed_at)",
            named_params! {
                ":hid": history_id,
                ":position": to_sql_index(position)?,
                ":set_id": set.set_id,
                ":set_name": set.set_name,
                ":exercise_id": set.exercise_id,
                ":exercise_name": set.exercise_name,
                ":kind": set.target.kind().to_string(),
                ":value": set.target.value(),
                ":weight": set.target_weight,
                ":reps": set.completed_reps,
                ":duration": set.completed_duration_sec,
                ":complete": set.is_complete,
                ":completed_at": set.completed_at,
            },
        )
        .map_err(|e| Error::classify(e, Error::InsertFailed))?;
    }
    Ok(history_id)
}

// Helper to turn the stored (kind, value) pair back into a Target
fn target_from_columns(row: &Row, kind_idx: usize, value_idx: usize) -> rusqlite::Result<Target> {
    let kind_str: String = row.get(kind_idx)?;
    let value: i64 = row.get(value_idx)?;
    let kind = kind_str.parse::<TargetKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(kind_idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(match kind {
        TargetKind::Reps => Target::Reps(value),
        TargetKind::Duration => Target::Duration(value),
    })
}

fn map_row_to_exercise_set(row: &Row) -> rusqlite::Result<ExerciseSet> {
    Ok(ExerciseSet {
        set_id: row.get(0)?,
        set_name: row.get(1)?,
        exercise_id: row.get(2)?,
        exercise_name: row.get(3)?,
        target: target_from_columns(row, 4, 5)?,
        target_weight: row.get(6)?,
        completed_reps: row.get(7)?,
        completed_duration_sec: row.get(8)?,
        is_complete: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn load_entry(conn: &Connection, history_id: i64) -> Result<Option<HistoryEntry>, Error> {
    let header = conn
        .query_row(
            "SELECT id, user_id, workout_id, current_day_index, day_name, is_active, version, created_at, updated_at, finished_at
             FROM history_entries WHERE id = ?1",
            params![history_id],
            |row| {
                Ok(HistoryEntry {
                    history_id: row.get(0)?,
                    user_id: row.get(1)?,
                    workout_id: row.get(2)?,
                    current_day_index: usize::try_from(row.get::<_, i64>(3)?).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Integer,
                            Box::new(e),
                        )
                    })?,
                    day_name: row.get(4)?,
                    sets: Vec::new(),
                    is_active: row.get(5)?,
                    version: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                    finished_at: row.get(9)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::classify(e, Error::QueryFailed))?;

    let Some(mut entry) = header else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT set_id, set_name, exercise_id, exercise_name, target_kind, target_value, target_weight,
                    completed_reps, completed_duration_sec, is_complete, completed_at
             FROM exercise_sets WHERE history_id = ?1 ORDER BY position ASC",
        )
        .map_err(Error::QueryFailed)?;
    let sets = stmt
        .query_map(params![history_id], map_row_to_exercise_set)
        .map_err(|e| Error::classify(e, Error::QueryFailed))?;
    entry.sets = sets
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)?;
    Ok(Some(entry))
}

fn load_workout(conn: &Connection, workout_id: &str) -> Result<Option<Workout>, Error> {
    let name: Option<Option<String>> = conn
        .query_row(
            "SELECT name FROM workouts WHERE id = ?1",
            params![workout_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::classify(e, Error::QueryFailed))?;
    let Some(name) = name else {
        return Ok(None);
    };

    let sets = {
        let mut stmt = conn
            .prepare(
                "SELECT set_id, name, exercise_id, exercise_name, target_kind, target_value, target_weight
                 FROM plan_sets WHERE workout_id = ?1 ORDER BY rowid",
            )
            .map_err(Error::QueryFailed)?;
        let rows = stmt
            .query_map(params![workout_id], |row| {
                Ok(PlanSet {
                    set_id: row.get(0)?,
                    name: row.get(1)?,
                    exercise_id: row.get(2)?,
                    exercise_name: row.get(3)?,
                    target: target_from_columns(row, 4, 5)?,
                    target_weight: row.get(6)?,
                })
            })
            .map_err(|e| Error::classify(e, Error::QueryFailed))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(Error::QueryFailed)?
    };

    let days: Vec<(i64, String, bool)> = {
        let mut stmt = conn
            .prepare("SELECT day_index, day_name, is_rest_day FROM plan_days WHERE workout_id = ?1 ORDER BY day_index")
            .map_err(Error::QueryFailed)?;
        let rows = stmt
            .query_map(params![workout_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(|e| Error::classify(e, Error::QueryFailed))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(Error::QueryFailed)?
    };

    let mut stmt = conn
        .prepare("SELECT set_id FROM plan_day_sets WHERE workout_id = ?1 AND day_index = ?2 ORDER BY position")
        .map_err(Error::QueryFailed)?;
    let mut weekly_plan = Vec::with_capacity(days.len());
    for (day_index, day_name, is_rest_day) in days {
        let set_ids = stmt
            .query_map(params![workout_id, day_index], |row| row.get(0))
            .map_err(|e| Error::classify(e, Error::QueryFailed))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(Error::QueryFailed)?;
        weekly_plan.push(Day {
            day_name,
            set_ids,
            is_rest_day,
        });
    }

    Ok(Some(Workout {
        workout_id: workout_id.to_string(),
        name,
        weekly_plan,
        sets,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_workout() -> Workout {
        Workout {
            workout_id: "w1".into(),
            name: Some("Push/Pull".into()),
            weekly_plan: vec![
                Day {
                    day_name: "Monday".into(),
                    set_ids: vec!["a".into(), "b".into()],
                    is_rest_day: false,
                },
                Day {
                    day_name: "Tuesday".into(),
                    set_ids: vec![],
                    is_rest_day: true,
                },
            ],
            sets: vec![
                PlanSet {
                    set_id: "a".into(),
                    name: Some("Push-ups".into()),
                    exercise_id: "push_up".into(),
                    exercise_name: None,
                    target: Target::Reps(10),
                    target_weight: None,
                },
                PlanSet {
                    set_id: "b".into(),
                    name: None,
                    exercise_id: "plank".into(),
                    exercise_name: Some("Plank".into()),
                    target: Target::Duration(45),
                    target_weight: Some(5.0),
                },
            ],
        }
    }

    fn new_entry(workout: &Workout) -> NewHistoryEntry {
        NewHistoryEntry {
            user_id: "alice".into(),
            workout_id: workout.workout_id.clone(),
            current_day_index: 0,
            day_name: "Monday".into(),
            sets: workout.sets.iter().map(ExerciseSet::seeded_from).collect(),
        }
    }

    #[test]
    fn workout_survives_storage() {
        let store = SqliteStore::in_memory().unwrap();
        let workout = sample_workout();
        store.import_workout(&workout).unwrap();
        assert_eq!(store.get_workout("w1").unwrap(), Some(workout));
        assert!(store.get_workout("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_workout_is_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        store.import_workout(&sample_workout()).unwrap();
        let err = store.import_workout(&sample_workout()).unwrap_err();
        assert!(matches!(err, Error::WorkoutExists(id) if id == "w1"));
    }

    #[test]
    fn earliest_assignment_wins() {
        let store = SqliteStore::in_memory().unwrap();
        let mut second = sample_workout();
        second.workout_id = "w2".into();
        store.import_workout(&sample_workout()).unwrap();
        store.import_workout(&second).unwrap();
        store.assign_workout("alice", "w2").unwrap();
        store.assign_workout("alice", "w1").unwrap();
        store.assign_workout("alice", "w2").unwrap();

        let earliest = store.earliest_workout_for_user("alice").unwrap().unwrap();
        assert_eq!(earliest.workout_id, "w2");
        assert_eq!(store.assigned_workouts("alice").unwrap(), vec!["w2", "w1"]);
        assert!(store.earliest_workout_for_user("bob").unwrap().is_none());
    }

    #[test]
    fn second_active_entry_is_a_conflict() {
        let store = SqliteStore::in_memory().unwrap();
        let workout = sample_workout();
        store.import_workout(&workout).unwrap();
        store.insert_entry(&new_entry(&workout)).unwrap();
        let err = store.insert_entry(&new_entry(&workout)).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn set_write_respects_expected_state() {
        let store = SqliteStore::in_memory().unwrap();
        let workout = sample_workout();
        store.import_workout(&workout).unwrap();
        let entry = store.insert_entry(&new_entry(&workout)).unwrap();

        let complete = SetUpdate::Complete {
            at: Utc::now(),
            floor_reps: Some(10),
            floor_duration_sec: None,
        };
        let SetWrite::Applied(after) = store
            .conditional_update_set(entry.history_id, "a", &complete, false)
            .unwrap()
        else {
            panic!("first completion should apply");
        };
        assert_eq!(after.version, entry.version + 1);
        let set = after.set("a").unwrap();
        assert!(set.is_complete);
        assert_eq!(set.completed_reps, 10);

        let again = store
            .conditional_update_set(entry.history_id, "a", &complete, false)
            .unwrap();
        assert_eq!(again, SetWrite::StateMismatch);
        let unknown = store
            .conditional_update_set(entry.history_id, "zzz", &complete, false)
            .unwrap();
        assert_eq!(unknown, SetWrite::Missing);
    }

    #[test]
    fn replace_requires_every_set_complete() {
        let store = SqliteStore::in_memory().unwrap();
        let workout = sample_workout();
        store.import_workout(&workout).unwrap();
        let entry = store.insert_entry(&new_entry(&workout)).unwrap();
        let next = new_entry(&workout);

        assert_eq!(
            store
                .conditional_replace_if_all_complete(entry.history_id, &next)
                .unwrap(),
            Replace::NotAllComplete
        );

        for set_id in ["a", "b"] {
            let update = SetUpdate::Complete {
                at: Utc::now(),
                floor_reps: None,
                floor_duration_sec: None,
            };
            store
                .conditional_update_set(entry.history_id, set_id, &update, false)
                .unwrap();
        }

        let Replace::Replaced(successor) = store
            .conditional_replace_if_all_complete(entry.history_id, &next)
            .unwrap()
        else {
            panic!("replacement should succeed once all sets are done");
        };
        assert!(successor.is_active);
        assert_eq!(
            store
                .conditional_replace_if_all_complete(entry.history_id, &next)
                .unwrap(),
            Replace::AlreadyTerminal
        );

        let retired = store.get_entry(entry.history_id).unwrap().unwrap();
        assert!(!retired.is_active);
        assert!(retired.finished_at.is_some());
        assert_eq!(store.list_entries("alice", "w1").unwrap().len(), 2);
    }

    #[test]
    fn failed_assignment_keeps_plan_out() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .conn
            .lock()
            .execute_batch(
                "CREATE TRIGGER no_assign BEFORE INSERT ON user_workouts
                 BEGIN SELECT RAISE(ABORT, 'assignment refused'); END;",
            )
            .unwrap();

        assert!(store.import_and_assign(&sample_workout(), "alice").is_err());
        assert!(store.get_workout("w1").unwrap().is_none());

        store.conn.lock().execute_batch("DROP TRIGGER no_assign;").unwrap();
        store.import_and_assign(&sample_workout(), "alice").unwrap();
        assert_eq!(store.assigned_workouts("alice").unwrap(), vec!["w1"]);
    }

    #[test]
    fn duplicate_import_assigns_nobody() {
        let store = SqliteStore::in_memory().unwrap();
        store.import_and_assign(&sample_workout(), "alice").unwrap();
        let err = store.import_and_assign(&sample_workout(), "bob").unwrap_err();
        assert!(matches!(err, Error::WorkoutExists(_)));
        assert!(store.assigned_workouts("bob").unwrap().is_empty());
    }

    #[test]
    fn readers_on_other_connections_see_whole_entries() {
        const SETS: usize = 12;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.sqlite");
        let ids: Vec<String> = (0..SETS).map(|i| format!("s{i}")).collect();
        let workout = Workout {
            workout_id: "many".into(),
            name: None,
            weekly_plan: vec![Day {
                day_name: "Monday".into(),
                set_ids: ids.clone(),
                is_rest_day: false,
            }],
            sets: ids
                .iter()
                .map(|id| PlanSet {
                    set_id: id.clone(),
                    name: None,
                    exercise_id: "squat".into(),
                    exercise_name: None,
                    target: Target::Reps(5),
                    target_weight: None,
                })
                .collect(),
        };

        let writer = SqliteStore::open(&path).unwrap();
        writer.import_and_assign(&workout, "alice").unwrap();
        let entry = writer
            .insert_entry(&NewHistoryEntry {
                user_id: "alice".into(),
                workout_id: "many".into(),
                current_day_index: 0,
                day_name: "Monday".into(),
                sets: workout.sets.iter().map(ExerciseSet::seeded_from).collect(),
            })
            .unwrap();
        let reader = SqliteStore::open(&path).unwrap();

        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                for id in &ids {
                    let update = SetUpdate::Complete {
                        at: Utc::now(),
                        floor_reps: Some(5),
                        floor_duration_sec: None,
                    };
                    writer
                        .conditional_update_set(entry.history_id, id, &update, false)
                        .unwrap();
                }
            });

            // Each completion bumps the version once, so the two must agree
            loop {
                let writer_done = handle.is_finished();
                let seen = reader.get_active_entry("alice", "many").unwrap().unwrap();
                let done = seen.sets.iter().filter(|s| s.is_complete).count();
                assert_eq!(seen.version, done as i64);
                if writer_done {
                    assert_eq!(done, SETS);
                    break;
                }
            }
        });
    }
}
