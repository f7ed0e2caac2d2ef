//src/engine/mod.rs
//! The history progression engine.
//!
//! Operations are short, synchronous and hold no locks of their own between
//! store calls. Consistency of the active entry rests entirely on the store's
//! conditional writes; a detected write conflict re-runs the whole operation
//! from a fresh read, up to the configured number of attempts.
use std::thread;
use std::time::Duration;
use tracing::warn;

use crate::config::{CompletionPolicy, RetryPolicy};
use crate::error::Error;
use crate::model::{HistoryEntry, Workout};
use crate::store::{HistoryStore, PlanStore};

mod advance;
mod bootstrap;
mod completion;
mod progress;

pub use advance::{build_entry, first_training_day, next_training_day, Advancement};
pub use completion::Completion;

pub struct Engine<S> {
    store: S,
    retry: RetryPolicy,
    duplicate_window: Duration,
}

impl<S> Engine<S>
where
    S: PlanStore + HistoryStore,
{
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            duplicate_window: CompletionPolicy::default().duplicate_window(),
        }
    }

    /// Sets how long an id-less repeat completion of the previous day's set
    /// counts as a duplicate.
    pub fn with_duplicate_window(mut self, window: Duration) -> Self {
        self.duplicate_window = window;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every entry of the user's active workout, oldest first.
    /// # Errors
    /// `Error::NoWorkoutAssigned` if the user has no plan.
    pub fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>, Error> {
        let workout = self.active_workout(user_id)?;
        Ok(self.store.list_entries(user_id, &workout.workout_id)?)
    }

    /// Number of full passes through the plan, derived from past entries.
    pub fn completed_weeks(&self, user_id: &str) -> Result<usize, Error> {
        Ok(count_wraps(&self.history(user_id)?))
    }

    /// The plan the user is currently following: their earliest assignment.
    fn active_workout(&self, user_id: &str) -> Result<Workout, Error> {
        self.store
            .earliest_workout_for_user(user_id)?
            .ok_or_else(|| Error::NoWorkoutAssigned(user_id.to_string()))
    }

    fn active_entry(&self, user_id: &str, workout: &Workout) -> Result<HistoryEntry, Error> {
        self.store
            .get_active_entry(user_id, &workout.workout_id)?
            .ok_or_else(|| {
                Error::not_found(
                    "Active history entry",
                    format!("{user_id}/{}", workout.workout_id),
                )
            })
    }

    fn with_retry<T>(
        &self,
        operation: &'static str,
        mut attempt_once: impl FnMut() -> Result<T, Error>,
    ) -> Result<T, Error> {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match attempt_once() {
                Err(e) if e.is_conflict() => {
                    warn!(operation, attempt, error = %e, "write conflict");
                    if attempt < attempts {
                        thread::sleep(self.retry.backoff(attempt));
                    }
                }
                other => return other,
            }
        }
        Err(Error::Conflict { attempts })
    }
}

/// Counts advancements that went back to the start of the plan.
pub fn count_wraps(entries: &[HistoryEntry]) -> usize {
    entries
        .windows(2)
        .filter(|pair| pair[1].current_day_index <= pair[0].current_day_index)
        .count()
}
