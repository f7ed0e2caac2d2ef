use anyhow::Result;
use cycle_tracker_lib::{Config, ConfigError, Error, SqliteStore, TrackerService};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEMO_PLAN: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../demos/starter.toml");

// Helper function to create a test service with an in-memory database
fn create_test_service(dir: &Path) -> Result<TrackerService> {
    let store = Arc::new(SqliteStore::in_memory()?);
    Ok(TrackerService::with_store(
        Config::default(),
        store,
        PathBuf::from(":memory:"),
        dir.join("config.toml"),
    ))
}

#[test]
fn test_import_demo_plan_and_train() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = create_test_service(dir.path())?;

    let workout = service.import_plan(Path::new(DEMO_PLAN), "alice")?;
    assert_eq!(workout.workout_id, "starter");
    assert!(workout.weekly_plan[1].is_rest_day);

    let monday = service.get_latest("alice")?;
    assert_eq!(monday.day_name, "Monday");

    service.update_progress("alice", "set_1", Some(10), None)?;
    for set_id in ["set_1", "set_2", "set_3"] {
        service.complete_set("alice", set_id)?;
    }
    assert_eq!(service.get_latest("alice")?.day_name, "Wednesday");
    assert_eq!(service.history("alice")?.len(), 2);
    assert_eq!(service.completed_weeks("alice")?, 0);
    Ok(())
}

#[test]
fn test_import_same_plan_twice_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = create_test_service(dir.path())?;
    service.import_plan(Path::new(DEMO_PLAN), "alice")?;

    let err = service.import_plan(Path::new(DEMO_PLAN), "bob").unwrap_err();
    assert!(format!("{err:#}").contains("already exists"));

    // The stored plan can still be shared
    service.assign_plan("bob", "starter")?;
    assert_eq!(service.get_latest("bob")?.day_name, "Monday");
    assert!(service.assign_plan("bob", "missing").is_err());
    Ok(())
}

#[test]
fn test_resolve_user_and_default() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut service = create_test_service(dir.path())?;

    assert!(matches!(
        service.resolve_user(None),
        Err(ConfigError::DefaultUserNotSet(_))
    ));
    assert_eq!(service.resolve_user(Some("carol"))?, "carol");

    service.set_default_user("dave")?;
    assert_eq!(service.resolve_user(None)?, "dave");
    assert!(service.get_config_path().exists());

    let reloaded = cycle_tracker_lib::load_config_util(service.get_config_path())?;
    assert_eq!(reloaded.default_user.as_deref(), Some("dave"));
    Ok(())
}

#[test]
fn test_user_without_plan() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let service = create_test_service(dir.path())?;
    assert!(matches!(
        service.get_latest("eve"),
        Err(Error::NoWorkoutAssigned(_))
    ));
    assert!(matches!(
        service.history("eve"),
        Err(Error::NoWorkoutAssigned(_))
    ));
    Ok(())
}
