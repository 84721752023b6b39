//! The single error surface shared by every QubicDB crate.

/// All error kinds the system can surface to a caller.
#[derive(Debug, thiserror::Error)]
pub enum QubicError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("content too large: {size} bytes exceeds limit of {limit}")]
    ContentTooLarge { size: usize, limit: usize },

    #[error("matrix full: capacity {capacity} neurons reached")]
    MatrixFull { capacity: usize },

    #[error("duplicate content: already stored as neuron {existing_id}")]
    DuplicateContent { existing_id: String },

    #[error("self link rejected for neuron {neuron_id}")]
    SelfLink { neuron_id: String },

    #[error("persist failed: {reason}")]
    PersistFailed { reason: String },

    #[error("load failed: {reason}")]
    LoadFailed { reason: String },

    #[error("brain {index_id} is sleeping")]
    BrainSleeping { index_id: String },

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("uuid not registered: {uuid}")]
    UuidNotRegistered { uuid: String },

    #[error("operation canceled")]
    Canceled,
}

impl QubicError {
    /// A `NotFound` for the given entity description.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// An `InvalidInput` with the given reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// A `PersistFailed` wrapping any displayable cause.
    pub fn persist(cause: impl std::fmt::Display) -> Self {
        Self::PersistFailed {
            reason: cause.to_string(),
        }
    }

    /// A `LoadFailed` wrapping any displayable cause.
    pub fn load(cause: impl std::fmt::Display) -> Self {
        Self::LoadFailed {
            reason: cause.to_string(),
        }
    }

    /// A `Conflict` with the given reason.
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }
}

pub type QubicResult<T> = Result<T, QubicError>;
