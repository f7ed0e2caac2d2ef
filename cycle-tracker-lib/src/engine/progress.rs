//src/engine/progress.rs
use tracing::debug;

use super::Engine;
use crate::error::Error;
use crate::model::{ExerciseSet, HistoryEntry, TargetKind};
use crate::store::{HistoryStore, PlanStore, SetUpdate, SetWrite};

impl<S> Engine<S>
where
    S: PlanStore + HistoryStore,
{
    /// Records partial progress on a set of the active entry. Values are
    /// absolute, not increments. Never completes the set.
    /// # Errors
    /// - `Error::NotFound` if there is no active entry or no such set in it.
    /// - `Error::InvalidState` if the set is already complete.
    /// - `Error::Validation` if the value does not fit the set's target kind.
    pub fn update_progress(
        &self,
        user_id: &str,
        set_id: &str,
        completed_reps: Option<i64>,
        completed_duration_sec: Option<i64>,
    ) -> Result<HistoryEntry, Error> {
        for (field, value) in [
            ("completed_reps", completed_reps),
            ("completed_duration_sec", completed_duration_sec),
        ] {
            if let Some(v) = value.filter(|v| *v < 0) {
                return Err(Error::Validation(format!("{field} cannot be negative ({v})")));
            }
        }

        self.with_retry("update_progress", || {
            let workout = self.active_workout(user_id)?;
            let entry = self.active_entry(user_id, &workout)?;
            let set = entry.set(set_id).ok_or_else(|| {
                Error::not_found("Set", format!("{set_id} (day '{}')", entry.day_name))
            })?;
            if set.is_complete {
                return Err(Error::InvalidState(format!(
                    "set '{set_id}' is already complete"
                )));
            }
            let update = progress_update(set, completed_reps, completed_duration_sec)?;

            match self
                .store
                .conditional_update_set(entry.history_id, set_id, &update, false)?
            {
                SetWrite::Applied(updated) => {
                    debug!(user_id, set_id, history_id = updated.history_id, "progress recorded");
                    Ok(updated)
                }
                SetWrite::StateMismatch | SetWrite::EntryTerminal => Err(Error::InvalidState(
                    format!("set '{set_id}' was completed in the meantime"),
                )),
                SetWrite::Missing => Err(Error::not_found("Set", set_id)),
            }
        })
    }
}

/// Checks the supplied values against the set's target kind.
fn progress_update(
    set: &ExerciseSet,
    completed_reps: Option<i64>,
    completed_duration_sec: Option<i64>,
) -> Result<SetUpdate, Error> {
    match (set.target.kind(), completed_reps, completed_duration_sec) {
        (TargetKind::Reps, Some(reps), None) => Ok(SetUpdate::Progress {
            completed_reps: Some(reps),
            completed_duration_sec: None,
        }),
        (TargetKind::Duration, None, Some(duration)) => Ok(SetUpdate::Progress {
            completed_reps: None,
            completed_duration_sec: Some(duration),
        }),
        (_, None, None) => Err(Error::Validation(format!(
            "no progress value given for set '{}'",
            set.set_id
        ))),
        (kind, _, _) => Err(Error::Validation(format!(
            "set '{}' is measured in {kind}",
            set.set_id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlanSet, Target};

    fn set(target: Target) -> ExerciseSet {
        ExerciseSet::seeded_from(&PlanSet {
            set_id: "s".into(),
            name: None,
            exercise_id: "e".into(),
            exercise_name: None,
            target,
            target_weight: None,
        })
    }

    #[test]
    fn value_must_match_target_kind() {
        let reps = set(Target::Reps(10));
        assert!(progress_update(&reps, Some(4), None).is_ok());
        assert!(matches!(
            progress_update(&reps, None, Some(30)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            progress_update(&reps, Some(4), Some(30)),
            Err(Error::Validation(_))
        ));

        let timed = set(Target::Duration(60));
        assert_eq!(
            progress_update(&timed, None, Some(30)).unwrap(),
            SetUpdate::Progress {
                completed_reps: None,
                completed_duration_sec: Some(30)
            }
        );
        assert!(matches!(
            progress_update(&timed, None, None),
            Err(Error::Validation(_))
        ));
    }
}
