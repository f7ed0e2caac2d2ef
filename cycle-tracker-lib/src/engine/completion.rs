//src/engine/completion.rs
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use super::Engine;
use crate::error::Error;
use crate::model::HistoryEntry;
use crate::store::{HistoryStore, PlanStore, SetUpdate, SetWrite};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    /// The entry holding the set, as it stands after this call.
    pub entry: HistoryEntry,
    /// True only for the one call that performed the day advancement.
    pub advanced: bool,
    /// The successor of `entry` once its day is over, whoever advanced it.
    pub next_entry: Option<HistoryEntry>,
}

impl<S> Engine<S>
where
    S: PlanStore + HistoryStore,
{
    /// Marks a set of the active entry complete and advances the day once
    /// every set is done. Completing a finished set is a no-op, including a
    /// repeat that arrives after its day already advanced.
    /// # Errors
    /// - `Error::NotFound` if there is no active entry or no such set in it.
    /// - `Error::Conflict` if the write kept colliding with other writers.
    pub fn complete_set(&self, user_id: &str, set_id: &str) -> Result<Completion, Error> {
        self.complete_set_in(user_id, set_id, None)
    }

    /// Like [`Engine::complete_set`], pinned to the entry the caller last
    /// saw. If that entry has been retired in the meantime nothing is
    /// written and the active entry comes back as `next_entry`.
    /// # Errors
    /// `Error::NotFound` if the entry does not belong to the user's active
    /// workout or does not hold the set.
    pub fn complete_set_in(
        &self,
        user_id: &str,
        set_id: &str,
        expected_history_id: Option<i64>,
    ) -> Result<Completion, Error> {
        self.with_retry("complete_set", || {
            let workout = self.active_workout(user_id)?;
            let active = self.active_entry(user_id, &workout)?;

            let entry = match expected_history_id {
                Some(id) if id != active.history_id => {
                    let seen = self.reload(id)?;
                    if seen.user_id != user_id || seen.workout_id != workout.workout_id {
                        return Err(Error::not_found("History entry", id.to_string()));
                    }
                    if seen.set(set_id).is_none() {
                        return Err(Error::not_found(
                            "Set",
                            format!("{set_id} (day '{}')", seen.day_name),
                        ));
                    }
                    debug!(user_id, set_id, history_id = id, "entry already retired");
                    return self.settle_completed(seen);
                }
                Some(_) => active,
                None => match self.repeat_of_previous_day(&active, set_id)? {
                    Some(previous) => {
                        debug!(
                            user_id,
                            set_id,
                            history_id = previous.history_id,
                            "repeat completion of a finished day"
                        );
                        return Ok(Completion {
                            entry: previous,
                            advanced: false,
                            next_entry: Some(active),
                        });
                    }
                    None => active,
                },
            };

            let set = entry.set(set_id).ok_or_else(|| {
                Error::not_found("Set", format!("{set_id} (day '{}')", entry.day_name))
            })?;
            if set.is_complete {
                debug!(user_id, set_id, "set already complete");
                return self.settle_completed(entry);
            }

            let update = SetUpdate::Complete {
                at: Utc::now(),
                floor_reps: set.target_reps(),
                floor_duration_sec: set.target_duration_sec(),
            };
            match self
                .store
                .conditional_update_set(entry.history_id, set_id, &update, false)?
            {
                SetWrite::Applied(updated) => {
                    debug!(user_id, set_id, history_id = updated.history_id, "set complete");
                    if updated.is_all_complete() {
                        self.finish_day(updated)
                    } else {
                        Ok(Completion {
                            entry: updated,
                            advanced: false,
                            next_entry: None,
                        })
                    }
                }
                // Someone else completed it, or the whole day, first
                SetWrite::StateMismatch | SetWrite::EntryTerminal => {
                    let current = self.reload(entry.history_id)?;
                    self.settle_completed(current)
                }
                SetWrite::Missing => Err(Error::not_found("Set", set_id)),
            }
        })
    }

    /// The entry retired just before `active`, if an id-less completion of
    /// `set_id` is really a late repeat aimed at it.
    ///
    /// A set missing from today always counts as such a repeat. A set that
    /// today shares with yesterday only counts while it is untouched today
    /// and today is younger than the duplicate window.
    fn repeat_of_previous_day(
        &self,
        active: &HistoryEntry,
        set_id: &str,
    ) -> Result<Option<HistoryEntry>, Error> {
        if let Some(today) = active.set(set_id) {
            let untouched = !today.is_complete
                && today.completed_reps == 0
                && today.completed_duration_sec == 0;
            let age = Utc::now().signed_duration_since(active.created_at);
            // A negative age (clock skew) falls inside the window
            let recent = age.to_std().map_or(true, |age| age <= self.duplicate_window);
            if !(untouched && recent) {
                return Ok(None);
            }
        }
        let previous = self
            .store
            .latest_terminal_entry(&active.user_id, &active.workout_id)?
            .filter(|prev| prev.history_id < active.history_id)
            .filter(|prev| prev.set(set_id).is_some_and(|s| s.is_complete));
        Ok(previous)
    }

    /// Outcome for a set that was already complete before this call.
    fn settle_completed(&self, entry: HistoryEntry) -> Result<Completion, Error> {
        if entry.is_active && entry.is_all_complete() {
            // The advancing call never got to replace the entry
            return self.finish_day(entry);
        }
        let next_entry = if entry.is_active {
            None
        } else {
            self.store
                .get_active_entry(&entry.user_id, &entry.workout_id)?
        };
        Ok(Completion {
            entry,
            advanced: false,
            next_entry,
        })
    }

    fn finish_day(&self, entry: HistoryEntry) -> Result<Completion, Error> {
        let advancement = self.advance(&entry)?;
        let entry = self.reload(entry.history_id)?;
        Ok(Completion {
            entry,
            advanced: advancement.advanced,
            next_entry: Some(advancement.next_entry),
        })
    }

    fn reload(&self, history_id: i64) -> Result<HistoryEntry, Error> {
        self.store
            .get_entry(history_id)?
            .ok_or_else(|| Error::not_found("History entry", history_id.to_string()))
    }
}
