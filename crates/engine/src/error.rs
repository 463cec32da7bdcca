use std::fmt;

use gridstage_core::{CoreError, RecordId};
use gridstage_storage::{GatewayError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("not editable: {0}")]
    NotEditable(String),

    #[error("invalid value for field {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("edit mode already active")]
    AlreadyEditing,

    #[error("a commit is already in flight")]
    CommitInFlight,

    #[error("no commit in flight")]
    NoCommitInFlight,

    #[error("batch of {size} records exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("{0}")]
    PartialCommit(BatchFailure),

    #[error("preset already exists: {0}")]
    DuplicateName(String),

    #[error("preset not found: {0}")]
    NotFound(String),

    #[error("invalid preset: {0}")]
    InvalidPreset(String),

    #[error("no preset is being edited")]
    NoEditBuffer,

    #[error("field not in layout: {0}")]
    UnknownField(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Lift a coercion failure into the engine's own variant.
    pub(crate) fn from_coercion(err: CoreError) -> Self {
        match err {
            CoreError::InvalidFieldValue { field, reason } => {
                EngineError::InvalidFieldValue { field, reason }
            }
            other => EngineError::Core(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Update,
    Delete,
}

impl BatchAction {
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Update => "updated",
            Self::Delete => "deleted",
        }
    }
}

/// Aggregate outcome of a batch that did not fully succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub action: BatchAction,
    pub total: usize,
    pub succeeded: Vec<RecordId>,
    pub failed: Vec<(RecordId, GatewayError)>,
    /// Records never attempted because the batch stopped early.
    pub skipped: Vec<RecordId>,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} {}",
            self.succeeded.len(),
            self.total,
            self.action.past_tense()
        )?;
        match self.failed.as_slice() {
            [] if self.skipped.is_empty() => Ok(()),
            [] => write!(f, ", {} not sent", self.skipped.len()),
            [(id, reason)] => write!(f, ", failed at record {id}: {reason}"),
            many => {
                f.write_str(", failed at records ")?;
                for (i, (id, _)) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{id}")?;
                }
                write!(f, "; first error: {}", many[0].1)
            }
        }
    }
}
