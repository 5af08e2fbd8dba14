//! Crate-level error types.
//!
//! Only [`EngineError::Config`] ever escapes a reminder run; every other failure
//! is absorbed into the run summary by the orchestrator.

use thiserror::Error;

use crate::directory::DirectoryError;
use crate::license::TransitionError;
use crate::notify::NotifyError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] StorageError),

    #[error("tenant directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("invalid license transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl EngineError {
    /// Whether this error must abort a run before any tenant is processed.
    pub fn is_config(&self) -> bool {
        matches!(self, EngineError::Config(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
