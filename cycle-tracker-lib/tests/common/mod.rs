#![allow(dead_code)]

use anyhow::Result;
use cycle_tracker_lib::{Day, Engine, PlanSet, RetryPolicy, SqliteStore, Target, Workout};

pub const USER: &str = "alice";

pub fn reps(set_id: &str, target: i64) -> PlanSet {
    PlanSet {
        set_id: set_id.into(),
        name: Some(format!("{set_id} name")),
        exercise_id: format!("{set_id}_exercise"),
        exercise_name: None,
        target: Target::Reps(target),
        target_weight: Some(20.0),
    }
}

pub fn timed(set_id: &str, seconds: i64) -> PlanSet {
    PlanSet {
        set_id: set_id.into(),
        name: None,
        exercise_id: format!("{set_id}_exercise"),
        exercise_name: Some("Plank".into()),
        target: Target::Duration(seconds),
        target_weight: None,
    }
}

pub fn day(name: &str, set_ids: &[&str]) -> Day {
    Day {
        day_name: name.into(),
        set_ids: set_ids.iter().map(|s| s.to_string()).collect(),
        is_rest_day: false,
    }
}

/// Monday: 3 sets, Tuesday: rest, Wednesday: 2 sets.
pub fn three_day_plan() -> Workout {
    Workout {
        workout_id: "starter".into(),
        name: Some("Starter".into()),
        weekly_plan: vec![
            day("Monday", &["set_1", "set_2", "set_3"]),
            day("Tuesday", &[]),
            day("Wednesday", &["set_4", "set_5"]),
        ],
        sets: vec![
            reps("set_1", 15),
            reps("set_2", 10),
            timed("set_3", 60),
            reps("set_4", 8),
            timed("set_5", 30),
        ],
    }
}

/// A single training day with `n` rep sets.
pub fn wide_day_plan(n: usize) -> Workout {
    let ids: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
    Workout {
        workout_id: "wide".into(),
        name: None,
        weekly_plan: vec![
            Day {
                day_name: "Monday".into(),
                set_ids: ids.clone(),
                is_rest_day: false,
            },
            day("Tuesday", &[]),
            Day {
                day_name: "Thursday".into(),
                set_ids: ids.clone(),
                is_rest_day: false,
            },
        ],
        sets: ids.iter().map(|id| reps(id, 5)).collect(),
    }
}

pub fn seeded_store(workout: &Workout) -> Result<SqliteStore> {
    let store = SqliteStore::in_memory()?;
    store.import_workout(workout)?;
    store.assign_workout(USER, &workout.workout_id)?;
    Ok(store)
}

// Helper function to create a test engine with an in-memory database
pub fn create_test_engine(workout: &Workout) -> Result<Engine<SqliteStore>> {
    Ok(Engine::new(seeded_store(workout)?, RetryPolicy::default()))
}
