use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the registry, the selector and its storage backends.
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("routine index {index} out of range (registry has {size} routines)")]
    OutOfRange { index: i64, size: usize },

    #[error("no routine selected")]
    NoSelection,

    #[error("storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("stale selection record: {0}")]
    StaleState(String),

    /// Failure raised by the routine action itself, passed through untouched.
    #[error(transparent)]
    Action(anyhow::Error),
}

impl SelectorError {
    pub fn out_of_range(index: impl TryInto<i64>, size: usize) -> Self {
        SelectorError::OutOfRange {
            index: index.try_into().unwrap_or(i64::MAX),
            size,
        }
    }

    pub fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SelectorError::StorageUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Storage problems degrade to in-memory operation instead of failing the caller.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            SelectorError::StorageUnavailable { .. } | SelectorError::StaleState(_)
        )
    }
}
