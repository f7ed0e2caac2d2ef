//src/plan_file.rs
//! Reads plan documents produced elsewhere (by hand or by the plan generator)
//! into [`Workout`] values.
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::error::Error;
use crate::model::{Day, PlanSet, Target, Workout};

#[derive(Error, Debug)]
pub enum PlanFileError {
    #[error("I/O error reading plan file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse plan file (TOML): {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid plan: {0}")]
    Invalid(#[from] Error),
}

#[derive(Deserialize, Debug)]
struct PlanDocument {
    workout_id: String,
    name: Option<String>,
    #[serde(default)]
    sets: Vec<SetDocument>,
    #[serde(default)]
    days: Vec<DayDocument>,
}

#[derive(Deserialize, Debug)]
struct SetDocument {
    set_id: String,
    name: Option<String>,
    exercise_id: String,
    exercise_name: Option<String>,
    reps: Option<i64>,
    duration_sec: Option<i64>,
    weight: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct DayDocument {
    day: String,
    #[serde(default)]
    sets: Vec<String>,
    #[serde(default)]
    rest: bool,
}

pub fn load_plan(path: &Path) -> Result<Workout, PlanFileError> {
    let content = fs::read_to_string(path)?;
    parse_plan(&content)
}

pub fn parse_plan(content: &str) -> Result<Workout, PlanFileError> {
    let doc: PlanDocument = toml::from_str(content)?;
    if doc.workout_id.trim().is_empty() {
        return Err(Error::Validation("workout_id cannot be empty".into()).into());
    }

    let mut seen = HashSet::new();
    let mut sets = Vec::with_capacity(doc.sets.len());
    for set in doc.sets {
        if !seen.insert(set.set_id.clone()) {
            return Err(Error::Validation(format!("set '{}' is defined twice", set.set_id)).into());
        }
        let target = Target::from_parts(set.reps, set.duration_sec).map_err(|e| match e {
            Error::Validation(msg) => Error::Validation(format!("set '{}': {msg}", set.set_id)),
            other => other,
        })?;
        if let Some(w) = set.weight.filter(|w| *w < 0.0) {
            return Err(Error::Validation(format!(
                "set '{}' has a negative weight ({w})",
                set.set_id
            ))
            .into());
        }
        sets.push(PlanSet {
            set_id: set.set_id,
            name: set.name,
            exercise_id: set.exercise_id,
            exercise_name: set.exercise_name,
            target,
            target_weight: set.weight,
        });
    }

    let mut weekly_plan = Vec::with_capacity(doc.days.len());
    for day in doc.days {
        let mut in_day = HashSet::new();
        for set_id in &day.sets {
            if !seen.contains(set_id) {
                return Err(Error::Validation(format!(
                    "day '{}' references unknown set '{set_id}'",
                    day.day
                ))
                .into());
            }
            if !in_day.insert(set_id) {
                return Err(Error::Validation(format!(
                    "day '{}' lists set '{set_id}' twice",
                    day.day
                ))
                .into());
            }
        }
        weekly_plan.push(Day {
            day_name: day.day,
            set_ids: day.sets,
            is_rest_day: day.rest,
        });
    }

    Ok(Workout {
        workout_id: doc.workout_id,
        name: doc.name,
        weekly_plan,
        sets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
workout_id = "starter"
name = "Starter week"

[[sets]]
set_id = "set_1"
name = "Push-ups"
exercise_id = "push_up"
reps = 15

[[sets]]
set_id = "set_2"
exercise_id = "plank"
duration_sec = 60
weight = 0.0

[[days]]
day = "Monday"
sets = ["set_1", "set_2"]

[[days]]
day = "Tuesday"
rest = true

[[days]]
day = "Wednesday"
sets = ["set_2"]
"#;

    #[test]
    fn parses_days_and_targets() {
        let workout = parse_plan(PLAN).unwrap();
        assert_eq!(workout.workout_id, "starter");
        assert_eq!(workout.weekly_plan.len(), 3);
        assert!(workout.weekly_plan[1].is_rest());
        assert_eq!(workout.set("set_1").unwrap().target, Target::Reps(15));
        assert_eq!(workout.set("set_2").unwrap().target, Target::Duration(60));
        assert_eq!(workout.weekly_plan[2].set_ids, vec!["set_2"]);
    }

    #[test]
    fn rejects_unknown_set_reference() {
        let bad = PLAN.replace("sets = [\"set_2\"]", "sets = [\"set_9\"]");
        let err = parse_plan(&bad).unwrap_err();
        assert!(err.to_string().contains("set_9"));
    }

    #[test]
    fn rejects_set_with_both_targets() {
        let bad = PLAN.replace("reps = 15", "reps = 15\nduration_sec = 30");
        assert!(matches!(
            parse_plan(&bad),
            Err(PlanFileError::Invalid(Error::Validation(_)))
        ));
    }

    #[test]
    fn rejects_duplicate_set_ids() {
        let bad = PLAN.replace("set_id = \"set_2\"", "set_id = \"set_1\"");
        assert!(parse_plan(&bad).is_err());
    }
}
