//src/engine/advance.rs
use std::collections::HashSet;
use tracing::info;

use super::Engine;
use crate::error::Error;
use crate::model::{ExerciseSet, HistoryEntry, NewHistoryEntry, Workout};
use crate::store::{HistoryStore, PlanStore, Replace};

/// What became of an advancement attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Advancement {
    /// The active entry after the attempt.
    pub next_entry: HistoryEntry,
    /// False when a concurrent caller had already advanced.
    pub advanced: bool,
}

/// First day at or after index 0 that has work scheduled.
pub fn first_training_day(workout: &Workout) -> Result<usize, Error> {
    scan_from(workout, 0)
}

/// Next day after `current` that has work scheduled, wrapping around the week.
/// If `current` is the only training day, it is scheduled again.
pub fn next_training_day(workout: &Workout, current: usize) -> Result<usize, Error> {
    scan_from(workout, current + 1)
}

fn scan_from(workout: &Workout, start: usize) -> Result<usize, Error> {
    let len = workout.weekly_plan.len();
    if len == 0 {
        return Err(Error::Configuration(format!(
            "workout '{}' has no days",
            workout.workout_id
        )));
    }
    // At most one lap around the plan
    (0..len)
        .map(|offset| (start + offset) % len)
        .find(|&index| !workout.weekly_plan[index].is_rest())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "workout '{}' consists only of rest days",
                workout.workout_id
            ))
        })
}

/// Zero-progress sheet for one day of the plan.
pub fn build_entry(
    user_id: &str,
    workout: &Workout,
    day_index: usize,
) -> Result<NewHistoryEntry, Error> {
    let day = workout.day(day_index).ok_or_else(|| {
        Error::Configuration(format!("workout '{}' has no days", workout.workout_id))
    })?;
    let mut seen = HashSet::new();
    if let Some(dup) = day.set_ids.iter().find(|id| !seen.insert(*id)) {
        return Err(Error::Configuration(format!(
            "day '{}' lists set '{dup}' twice",
            day.day_name
        )));
    }
    let sets = day
        .set_ids
        .iter()
        .map(|set_id| {
            workout
                .set(set_id)
                .map(ExerciseSet::seeded_from)
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "day '{}' references unknown set '{set_id}'",
                        day.day_name
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(NewHistoryEntry {
        user_id: user_id.to_string(),
        workout_id: workout.workout_id.clone(),
        current_day_index: day_index % workout.weekly_plan.len(),
        day_name: day.day_name.clone(),
        sets,
    })
}

impl<S> Engine<S>
where
    S: PlanStore + HistoryStore,
{
    /// Retires a fully completed entry and opens the next training day.
    /// # Errors
    /// - `Error::InvalidState` if the entry still has open sets.
    /// - `Error::Configuration` if the plan has no training day.
    pub fn advance(&self, entry: &HistoryEntry) -> Result<Advancement, Error> {
        if !entry.is_all_complete() {
            return Err(Error::InvalidState(format!(
                "history entry {} still has open sets",
                entry.history_id
            )));
        }
        let workout = self
            .store
            .get_workout(&entry.workout_id)?
            .ok_or_else(|| Error::not_found("Workout", entry.workout_id.clone()))?;
        let current = entry.current_day_index % workout.weekly_plan.len().max(1);
        let next_index = next_training_day(&workout, current)?;
        let next = build_entry(&entry.user_id, &workout, next_index)?;

        match self
            .store
            .conditional_replace_if_all_complete(entry.history_id, &next)?
        {
            Replace::Replaced(next_entry) => {
                info!(
                    user_id = %entry.user_id,
                    workout_id = %entry.workout_id,
                    from = %entry.day_name,
                    to = %next_entry.day_name,
                    history_id = next_entry.history_id,
                    "day complete, advanced"
                );
                Ok(Advancement {
                    next_entry,
                    advanced: true,
                })
            }
            Replace::AlreadyTerminal => {
                let next_entry = self
                    .store
                    .get_active_entry(&entry.user_id, &entry.workout_id)?
                    .ok_or_else(|| {
                        Error::not_found(
                            "Active history entry",
                            format!("{}/{}", entry.user_id, entry.workout_id),
                        )
                    })?;
                Ok(Advancement {
                    next_entry,
                    advanced: false,
                })
            }
            Replace::NotAllComplete => Err(Error::InvalidState(format!(
                "history entry {} still has open sets",
                entry.history_id
            ))),
            Replace::Missing => Err(Error::not_found(
                "History entry",
                entry.history_id.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Day, PlanSet, Target};

    fn day(name: &str, sets: &[&str]) -> Day {
        Day {
            day_name: name.into(),
            set_ids: sets.iter().map(|s| s.to_string()).collect(),
            is_rest_day: false,
        }
    }

    fn plan(days: Vec<Day>) -> Workout {
        let sets = days
            .iter()
            .flat_map(|d| d.set_ids.clone())
            .map(|set_id| PlanSet {
                set_id,
                name: None,
                exercise_id: "squat".into(),
                exercise_name: None,
                target: Target::Reps(5),
                target_weight: Some(60.0),
            })
            .collect();
        Workout {
            workout_id: "w".into(),
            name: None,
            weekly_plan: days,
            sets,
        }
    }

    #[test]
    fn skips_rest_days_and_wraps() {
        let w = plan(vec![
            day("Monday", &["a"]),
            day("Tuesday", &[]),
            day("Wednesday", &["b"]),
        ]);
        assert_eq!(first_training_day(&w).unwrap(), 0);
        assert_eq!(next_training_day(&w, 0).unwrap(), 2);
        assert_eq!(next_training_day(&w, 2).unwrap(), 0);
    }

    #[test]
    fn flagged_rest_day_is_skipped_even_with_sets() {
        let mut rest = day("Tuesday", &["b"]);
        rest.is_rest_day = true;
        let w = plan(vec![day("Monday", &["a"]), rest, day("Wednesday", &["c"])]);
        assert_eq!(next_training_day(&w, 0).unwrap(), 2);
    }

    #[test]
    fn leading_rest_days_are_skipped_on_bootstrap() {
        let w = plan(vec![day("Sunday", &[]), day("Monday", &["a"])]);
        assert_eq!(first_training_day(&w).unwrap(), 1);
    }

    #[test]
    fn single_training_day_repeats() {
        let w = plan(vec![day("Monday", &["a"]), day("Tuesday", &[])]);
        assert_eq!(next_training_day(&w, 0).unwrap(), 0);
    }

    #[test]
    fn all_rest_plan_is_a_configuration_error() {
        let w = plan(vec![day("Monday", &[]), day("Tuesday", &[])]);
        assert!(matches!(
            next_training_day(&w, 0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            first_training_day(&plan(vec![])),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn built_entry_copies_targets_with_zero_progress() {
        let w = plan(vec![day("Monday", &["a", "b"])]);
        let entry = build_entry("alice", &w, 0).unwrap();
        assert_eq!(entry.day_name, "Monday");
        assert_eq!(entry.sets.len(), 2);
        assert!(entry
            .sets
            .iter()
            .all(|s| s.completed_reps == 0 && !s.is_complete && s.target_weight == Some(60.0)));
    }

    #[test]
    fn unknown_set_reference_is_reported() {
        let mut w = plan(vec![day("Monday", &["a"])]);
        w.weekly_plan[0].set_ids.push("ghost".into());
        assert!(matches!(
            build_entry("alice", &w, 0),
            Err(Error::Configuration(msg)) if msg.contains("ghost")
        ));
    }

    #[test]
    fn repeated_set_in_a_day_is_reported() {
        let w = plan(vec![day("Monday", &["a", "b", "a"])]);
        assert!(matches!(
            build_entry("alice", &w, 0),
            Err(Error::Configuration(msg)) if msg.contains("'a' twice")
        ));
    }
}
