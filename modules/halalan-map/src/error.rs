use halalan_common::RaceCategory;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapError>;

#[derive(Debug, Error)]
pub enum MapError {
    /// The base locality list could not be read. Aborts the run.
    #[error("Failed to load locality list from {location}: {reason}")]
    LoadFailed { location: String, reason: String },

    #[error("No {category} results for {name}")]
    EmptyTally { name: String, category: RaceCategory },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("batch size must be a positive integer")]
    InvalidBatchSize,
}
