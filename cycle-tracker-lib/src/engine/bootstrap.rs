//src/engine/bootstrap.rs
use tracing::info;

use super::advance::{build_entry, first_training_day};
use super::Engine;
use crate::error::Error;
use crate::model::{HistoryEntry, Workout};
use crate::store::{HistoryStore, PlanStore};

impl<S> Engine<S>
where
    S: PlanStore + HistoryStore,
{
    /// The user's active entry, created at the first training day of their
    /// earliest workout if they have none yet.
    /// # Errors
    /// `Error::NoWorkoutAssigned` if the user has no plan at all.
    pub fn get_or_create_active(&self, user_id: &str) -> Result<HistoryEntry, Error> {
        self.with_retry("bootstrap", || {
            let workout = self.active_workout(user_id)?;
            self.active_or_bootstrap(user_id, &workout)
        })
    }

    /// Same as [`Engine::get_or_create_active`].
    pub fn get_latest(&self, user_id: &str) -> Result<HistoryEntry, Error> {
        self.get_or_create_active(user_id)
    }

    /// Active entry for an explicitly chosen workout, bootstrapping it if needed.
    /// # Errors
    /// `Error::NotFound` if the workout does not exist.
    pub fn get_latest_for_workout(
        &self,
        user_id: &str,
        workout_id: &str,
    ) -> Result<HistoryEntry, Error> {
        self.with_retry("bootstrap", || {
            let workout = self
                .store
                .get_workout(workout_id)?
                .ok_or_else(|| Error::not_found("Workout", workout_id))?;
            self.active_or_bootstrap(user_id, &workout)
        })
    }

    fn active_or_bootstrap(
        &self,
        user_id: &str,
        workout: &Workout,
    ) -> Result<HistoryEntry, Error> {
        if let Some(entry) = self.store.get_active_entry(user_id, &workout.workout_id)? {
            return Ok(entry);
        }
        let day_index = first_training_day(workout)?;
        // A concurrent bootstrap makes this insert fail as a conflict; the
        // retry then finds the winner's entry above.
        let entry = self
            .store
            .insert_entry(&build_entry(user_id, workout, day_index)?)?;
        info!(
            user_id,
            workout_id = %workout.workout_id,
            day = %entry.day_name,
            history_id = entry.history_id,
            "started plan"
        );
        Ok(entry)
    }
}
