//src/model.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::Error;

/// Whether a set is measured in repetitions or in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Reps,
    Duration,
}

/// The goal of a single set. Reps and duration are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Target {
    Reps(i64),
    Duration(i64),
}

impl Target {
    /// Builds a target from the optional raw fields a plan document carries.
    /// # Errors
    /// `Error::Validation` if both or neither are given, or the value is not positive.
    pub fn from_parts(reps: Option<i64>, duration_sec: Option<i64>) -> Result<Self, Error> {
        let target = match (reps, duration_sec) {
            (Some(r), None) => Self::Reps(r),
            (None, Some(d)) => Self::Duration(d),
            (Some(_), Some(_)) => {
                return Err(Error::Validation(
                    "a set targets either reps or duration, not both".into(),
                ))
            }
            (None, None) => {
                return Err(Error::Validation(
                    "a set needs a reps or duration target".into(),
                ))
            }
        };
        if target.value() <= 0 {
            return Err(Error::Validation(format!(
                "target {} must be positive, got {}",
                target.kind(),
                target.value()
            )));
        }
        Ok(target)
    }

    pub const fn kind(&self) -> TargetKind {
        match self {
            Self::Reps(_) => TargetKind::Reps,
            Self::Duration(_) => TargetKind::Duration,
        }
    }

    pub const fn value(&self) -> i64 {
        match self {
            Self::Reps(v) | Self::Duration(v) => *v,
        }
    }

    pub const fn reps(&self) -> Option<i64> {
        match self {
            Self::Reps(v) => Some(*v),
            Self::Duration(_) => None,
        }
    }

    pub const fn duration_sec(&self) -> Option<i64> {
        match self {
            Self::Duration(v) => Some(*v),
            Self::Reps(_) => None,
        }
    }
}

/// A set as defined by the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSet {
    pub set_id: String,
    pub name: Option<String>,
    pub exercise_id: String,
    pub exercise_name: Option<String>,
    pub target: Target,
    pub target_weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Day {
    pub day_name: String,
    pub set_ids: Vec<String>,
    #[serde(default)]
    pub is_rest_day: bool,
}

impl Day {
    /// Rest days are either flagged or simply have nothing scheduled.
    pub fn is_rest(&self) -> bool {
        self.is_rest_day || self.set_ids.is_empty()
    }
}

/// An immutable weekly plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub workout_id: String,
    pub name: Option<String>,
    pub weekly_plan: Vec<Day>,
    pub sets: Vec<PlanSet>,
}

impl Workout {
    pub fn set(&self, set_id: &str) -> Option<&PlanSet> {
        self.sets.iter().find(|s| s.set_id == set_id)
    }

    /// Day at `index`, taken modulo the plan length.
    pub fn day(&self, index: usize) -> Option<&Day> {
        if self.weekly_plan.is_empty() {
            return None;
        }
        self.weekly_plan.get(index % self.weekly_plan.len())
    }
}

/// Progress on one plan set inside a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub set_id: String,
    pub set_name: Option<String>,
    pub exercise_id: String,
    pub exercise_name: Option<String>,
    pub target: Target,
    pub target_weight: Option<f64>,
    pub completed_reps: i64,
    pub completed_duration_sec: i64,
    pub is_complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExerciseSet {
    /// Fresh, zero-progress copy of a plan set.
    pub fn seeded_from(plan_set: &PlanSet) -> Self {
        Self {
            set_id: plan_set.set_id.clone(),
            set_name: plan_set.name.clone(),
            exercise_id: plan_set.exercise_id.clone(),
            exercise_name: plan_set.exercise_name.clone(),
            target: plan_set.target,
            target_weight: plan_set.target_weight,
            completed_reps: 0,
            completed_duration_sec: 0,
            is_complete: false,
            completed_at: None,
        }
    }

    pub const fn target_reps(&self) -> Option<i64> {
        self.target.reps()
    }

    pub const fn target_duration_sec(&self) -> Option<i64> {
        self.target.duration_sec()
    }

    /// The logged value for this set's target kind.
    pub const fn completed_value(&self) -> i64 {
        match self.target {
            Target::Reps(_) => self.completed_reps,
            Target::Duration(_) => self.completed_duration_sec,
        }
    }

    pub const fn target_met(&self) -> bool {
        self.completed_value() >= self.target.value()
    }
}

/// One user's sheet for one day of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub history_id: i64,
    pub user_id: String,
    pub workout_id: String,
    pub current_day_index: usize,
    pub day_name: String,
    pub sets: Vec<ExerciseSet>,
    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn set(&self, set_id: &str) -> Option<&ExerciseSet> {
        self.sets.iter().find(|s| s.set_id == set_id)
    }

    pub fn is_all_complete(&self) -> bool {
        !self.sets.is_empty() && self.sets.iter().all(|s| s.is_complete)
    }

    pub fn progress(&self) -> Progress {
        let completed = self.sets.iter().filter(|s| s.is_complete).count();
        Progress::new(self.sets.len(), completed)
    }
}

/// An entry that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub user_id: String,
    pub workout_id: String,
    pub current_day_index: usize,
    pub day_name: String,
    pub sets: Vec<ExerciseSet>,
}

/// Aggregate completion of an entry, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub total_sets: usize,
    pub completed_sets: usize,
    pub remaining_sets: usize,
    pub completion_percentage: f64,
}

impl Progress {
    pub fn new(total_sets: usize, completed_sets: usize) -> Self {
        let completed_sets = completed_sets.min(total_sets);
        let completion_percentage = if total_sets == 0 {
            0.0
        } else {
            completed_sets as f64 / total_sets as f64 * 100.0
        };
        Self {
            total_sets,
            completed_sets,
            remaining_sets: total_sets - completed_sets,
            completion_percentage,
        }
    }
}
