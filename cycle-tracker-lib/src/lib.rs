// src/lib.rs
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::store::PlanStore;

// --- Declare modules ---
mod config;
pub mod db;
pub mod engine;
mod error;
pub mod model;
pub mod plan_file;
pub mod sqlite;
pub mod store;

// --- Expose public types ---
pub use config::{
    get_config_path as get_config_path_util, load as load_config_util, parse_color,
    save as save_config_util, CompletionPolicy, Config, ConfigError, RetryPolicy, StandardColor,
    Theme,
};
pub use db::Error as DbError;
pub use engine::{Advancement, Completion, Engine};
pub use error::Error;
pub use model::{
    Day, ExerciseSet, HistoryEntry, NewHistoryEntry, PlanSet, Progress, Target, TargetKind,
    Workout,
};
pub use plan_file::PlanFileError;
pub use sqlite::SqliteStore;

/// Application facade: configuration plus an engine over the SQLite store.
pub struct TrackerService {
    pub config: Config,
    pub engine: Engine<Arc<SqliteStore>>,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl TrackerService {
    /// Loads the config file and opens the database it points at.
    /// # Errors
    /// Returns `anyhow::Error` if path determination, loading, or schema setup fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let db_path = match &config.database_path {
            Some(path) => path.clone(),
            None => db::get_db_path().context("Failed to determine database path")?,
        };
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        Ok(Self::with_store(config, Arc::new(store), db_path, config_path))
    }

    pub fn with_store(
        config: Config,
        store: Arc<SqliteStore>,
        db_path: PathBuf,
        config_path: PathBuf,
    ) -> Self {
        let engine = Engine::new(store, config.retry)
            .with_duplicate_window(config.completion.duplicate_window());
        Self {
            config,
            engine,
            db_path,
            config_path,
        }
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save(&self.config_path, &self.config)
    }

    /// Picks the explicit user, falling back to the configured default.
    /// # Errors
    /// `ConfigError::DefaultUserNotSet` if neither is available.
    pub fn resolve_user(&self, explicit: Option<&str>) -> Result<String, ConfigError> {
        explicit
            .map(str::to_string)
            .or_else(|| self.config.default_user.clone())
            .ok_or_else(|| ConfigError::DefaultUserNotSet(self.config_path.clone()))
    }

    pub fn set_default_user(&mut self, user_id: &str) -> Result<(), ConfigError> {
        self.config.default_user = Some(user_id.to_string());
        self.save_config()
    }

    /// Reads a plan document, stores it and assigns it to the user.
    /// # Errors
    /// Fails if the file is invalid or the workout id is already taken.
    pub fn import_plan(&self, path: &Path, user_id: &str) -> Result<Workout> {
        let workout = plan_file::load_plan(path)
            .with_context(|| format!("Failed to read plan from {path:?}"))?;
        self.engine
            .store()
            .import_and_assign(&workout, user_id)
            .with_context(|| {
                format!(
                    "Failed to store workout '{}' for '{user_id}'",
                    workout.workout_id
                )
            })?;
        info!(user_id, workout_id = %workout.workout_id, "plan imported");
        Ok(workout)
    }

    /// Assigns an already stored workout to another user.
    pub fn assign_plan(&self, user_id: &str, workout_id: &str) -> Result<()> {
        let store = self.engine.store();
        if store.get_workout(workout_id)?.is_none() {
            anyhow::bail!(Error::not_found("Workout", workout_id));
        }
        store.assign_workout(user_id, workout_id)?;
        Ok(())
    }

    pub fn get_latest(&self, user_id: &str) -> Result<HistoryEntry, Error> {
        self.engine.get_latest(user_id)
    }

    pub fn update_progress(
        &self,
        user_id: &str,
        set_id: &str,
        completed_reps: Option<i64>,
        completed_duration_sec: Option<i64>,
    ) -> Result<HistoryEntry, Error> {
        self.engine
            .update_progress(user_id, set_id, completed_reps, completed_duration_sec)
    }

    pub fn complete_set(&self, user_id: &str, set_id: &str) -> Result<Completion, Error> {
        self.engine.complete_set(user_id, set_id)
    }

    /// Completes a set of the entry the caller last saw.
    pub fn complete_set_in(
        &self,
        user_id: &str,
        set_id: &str,
        history_id: i64,
    ) -> Result<Completion, Error> {
        self.engine.complete_set_in(user_id, set_id, Some(history_id))
    }

    pub fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>, Error> {
        self.engine.history(user_id)
    }

    pub fn completed_weeks(&self, user_id: &str) -> Result<usize, Error> {
        self.engine.completed_weeks(user_id)
    }
}
