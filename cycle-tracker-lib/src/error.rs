//src/error.rs
use thiserror::Error;

use crate::db;

/// Failures reported by the progression engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("User '{0}' has no associated workout")]
    NoWorkoutAssigned(String),
    #[error("Workout plan misconfigured: {0}")]
    Configuration(String),
    #[error("Gave up after {attempts} conflicting attempts, retry the request")]
    Conflict { attempts: u32 },
    #[error(transparent)]
    Storage(#[from] db::Error),
}

impl Error {
    pub(crate) fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Whether re-running the whole operation may succeed.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_conflict(),
            _ => false,
        }
    }
}
