//src/store.rs
//! Narrow persistence interfaces the engine works against.
//!
//! Every write to an active history entry goes through one of the two
//! conditional operations on [`HistoryStore`]; implementations must apply
//! each of them atomically.
use chrono::{DateTime, Utc};

use crate::db::Error;
use crate::model::{HistoryEntry, NewHistoryEntry, Workout};

/// Read-only access to plans.
pub trait PlanStore {
    fn get_workout(&self, workout_id: &str) -> Result<Option<Workout>, Error>;

    /// The first workout assigned to the user, in assignment order.
    fn earliest_workout_for_user(&self, user_id: &str) -> Result<Option<Workout>, Error>;
}

/// Field changes for one exercise set.
#[derive(Debug, Clone, PartialEq)]
pub enum SetUpdate {
    /// Overwrite logged progress. `None` leaves a field as it is.
    Progress {
        completed_reps: Option<i64>,
        completed_duration_sec: Option<i64>,
    },
    /// Mark complete and raise the logged values to at least the floors.
    Complete {
        at: DateTime<Utc>,
        floor_reps: Option<i64>,
        floor_duration_sec: Option<i64>,
    },
}

/// Result of [`HistoryStore::conditional_update_set`].
#[derive(Debug, Clone, PartialEq)]
pub enum SetWrite {
    /// The write landed; carries the entry as it is now.
    Applied(HistoryEntry),
    /// The set's completion flag did not match the expectation.
    StateMismatch,
    /// The entry is no longer active.
    EntryTerminal,
    /// No such entry or no such set in it.
    Missing,
}

/// Result of [`HistoryStore::conditional_replace_if_all_complete`].
#[derive(Debug, Clone, PartialEq)]
pub enum Replace {
    /// The old entry is now terminal and this is its successor.
    Replaced(HistoryEntry),
    /// At least one set of the old entry is still open.
    NotAllComplete,
    /// Someone else already retired the old entry.
    AlreadyTerminal,
    Missing,
}

pub trait HistoryStore {
    fn get_active_entry(
        &self,
        user_id: &str,
        workout_id: &str,
    ) -> Result<Option<HistoryEntry>, Error>;

    fn get_entry(&self, history_id: i64) -> Result<Option<HistoryEntry>, Error>;

    /// All entries for the pair, oldest first.
    fn list_entries(&self, user_id: &str, workout_id: &str) -> Result<Vec<HistoryEntry>, Error>;

    /// The most recently retired entry for the pair.
    fn latest_terminal_entry(
        &self,
        user_id: &str,
        workout_id: &str,
    ) -> Result<Option<HistoryEntry>, Error>;

    /// Inserts a new active entry.
    /// # Errors
    /// `Error::DuplicateActiveEntry` if the pair already has an active entry.
    fn insert_entry(&self, entry: &NewHistoryEntry) -> Result<HistoryEntry, Error>;

    /// Applies `update` to one set only if the entry is active and the set's
    /// `is_complete` equals `expected_is_complete`.
    fn conditional_update_set(
        &self,
        history_id: i64,
        set_id: &str,
        update: &SetUpdate,
        expected_is_complete: bool,
    ) -> Result<SetWrite, Error>;

    /// Retires the entry and inserts `next` in one step, only if the entry is
    /// active and every one of its sets is complete.
    fn conditional_replace_if_all_complete(
        &self,
        history_id: i64,
        next: &NewHistoryEntry,
    ) -> Result<Replace, Error>;
}

impl<T: PlanStore + ?Sized> PlanStore for std::sync::Arc<T> {
    fn get_workout(&self, workout_id: &str) -> Result<Option<Workout>, Error> {
        (**self).get_workout(workout_id)
    }

    fn earliest_workout_for_user(&self, user_id: &str) -> Result<Option<Workout>, Error> {
        (**self).earliest_workout_for_user(user_id)
    }
}

impl<T: HistoryStore + ?Sized> HistoryStore for std::sync::Arc<T> {
    fn get_active_entry(
        &self,
        user_id: &str,
        workout_id: &str,
    ) -> Result<Option<HistoryEntry>, Error> {
        (**self).get_active_entry(user_id, workout_id)
    }

    fn get_entry(&self, history_id: i64) -> Result<Option<HistoryEntry>, Error> {
        (**self).get_entry(history_id)
    }

    fn list_entries(&self, user_id: &str, workout_id: &str) -> Result<Vec<HistoryEntry>, Error> {
        (**self).list_entries(user_id, workout_id)
    }

    fn latest_terminal_entry(
        &self,
        user_id: &str,
        workout_id: &str,
    ) -> Result<Option<HistoryEntry>, Error> {
        (**self).latest_terminal_entry(user_id, workout_id)
    }

    fn insert_entry(&self, entry: &NewHistoryEntry) -> Result<HistoryEntry, Error> {
        (**self).insert_entry(entry)
    }

    fn conditional_update_set(
        &self,
        history_id: i64,
        set_id: &str,
        update: &SetUpdate,
        expected_is_complete: bool,
    ) -> Result<SetWrite, Error> {
        (**self).conditional_update_set(history_id, set_id, update, expected_is_complete)
    }

    fn conditional_replace_if_all_complete(
        &self,
        history_id: i64,
        next: &NewHistoryEntry,
    ) -> Result<Replace, Error> {
        (**self).conditional_replace_if_all_complete(history_id, next)
    }
}
